//! Read/write surface against the public ecological-credit ledger.

use crate::error::CoreError;
use crate::types::{Retirement, SellOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CreditClass {
    pub id: String,
    pub class_type: String,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub jurisdiction: String,
}

#[derive(Debug, Clone)]
pub struct BuyOrderLine {
    pub sell_order_id: String,
    /// 6-decimal quantity string.
    pub quantity: String,
    pub bid_denom: String,
    pub bid_amount: u128,
    pub disable_auto_retire: bool,
    pub retirement_jurisdiction: String,
    pub retirement_reason: String,
}

#[derive(Debug, Clone)]
pub struct BroadcastResult {
    pub code: u32,
    pub tx_hash: String,
    pub height: Option<u64>,
    pub raw_log: String,
}

/// Read and write operations against the ledger. Object-safe so it can be
/// registered behind `Arc<dyn LedgerClient>`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn list_sell_orders(&self) -> Result<Vec<SellOrder>, CoreError>;

    async fn list_credit_classes(&self) -> Result<Vec<CreditClass>, CoreError>;

    async fn list_projects(&self) -> Result<Vec<Project>, CoreError>;

    async fn allowed_denoms(&self) -> Result<Vec<String>, CoreError>;

    fn native_denom(&self) -> &str;

    async fn get_retirement(&self, id_or_tx_hash: &str) -> Result<Option<Retirement>, CoreError>;

    /// Polls the indexer until a matching retirement appears or `timeout` elapses.
    /// A `None` result on timeout is indexer lag, not a failure.
    async fn wait_for_retirement(
        &self,
        tx_hash: &str,
        timeout: Duration,
    ) -> Result<Option<Retirement>, CoreError>;

    async fn sign_and_broadcast(&self, orders: &[BuyOrderLine]) -> Result<BroadcastResult, CoreError>;

    async fn balance_micro(&self, denom: &str) -> Result<u128, CoreError>;

    fn buyer_address(&self) -> &str;

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
