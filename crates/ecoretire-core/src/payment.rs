//! Payment authorization abstraction. Two implementations live in the
//! adapters crate: a native-token provider (balance check only, no hold) and
//! a fiat provider (manual-capture payment intents on an external gateway).

use crate::error::CoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Authorization {
    pub id: String,
    pub status: AuthorizationStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub authorization_id: String,
    pub captured_amount_micro: u128,
    pub denom: String,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authorize(
        &self,
        amount_micro: u128,
        denom: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Authorization, CoreError>;

    async fn capture(&self, authorization_id: &str) -> Result<Receipt, CoreError>;

    /// Releases a hold. Idempotent against "already released" on the underlying rail.
    async fn refund(&self, authorization_id: &str) -> Result<(), CoreError>;
}
