//! Native-token payment provider: the buyer pays from the same wallet that
//! signs the ledger transaction, so "authorize" is a balance check and
//! capture/refund are no-ops — no hold ever exists on-chain.

use async_trait::async_trait;
use ecoretire_core::error::CoreError;
use ecoretire_core::ledger::LedgerClient;
use ecoretire_core::payment::{Authorization, AuthorizationStatus, PaymentProvider, Receipt};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct NativeTokenProvider {
    ledger: Arc<dyn LedgerClient>,
}

impl NativeTokenProvider {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl PaymentProvider for NativeTokenProvider {
    fn name(&self) -> &'static str {
        "crypto"
    }

    async fn authorize(
        &self,
        amount_micro: u128,
        denom: &str,
        _metadata: &BTreeMap<String, String>,
    ) -> Result<Authorization, CoreError> {
        let balance = self.ledger.balance_micro(denom).await?;
        if balance >= amount_micro {
            Ok(Authorization {
                id: format!("native:{denom}:{amount_micro}"),
                status: AuthorizationStatus::Authorized,
                message: None,
            })
        } else {
            Ok(Authorization {
                id: String::new(),
                status: AuthorizationStatus::Failed,
                message: Some(format!(
                    "insufficient on-chain balance: have {balance}, need {amount_micro}"
                )),
            })
        }
    }

    async fn capture(&self, authorization_id: &str) -> Result<Receipt, CoreError> {
        Ok(Receipt {
            authorization_id: authorization_id.to_string(),
            captured_amount_micro: 0,
            denom: String::new(),
            metadata: BTreeMap::new(),
        })
    }

    async fn refund(&self, _authorization_id: &str) -> Result<(), CoreError> {
        Ok(())
    }
}
