//! Fixture ledger client for tests and for local runs without a configured chain RPC.

use async_trait::async_trait;
use ecoretire_core::error::CoreError;
use ecoretire_core::ledger::{BroadcastResult, BuyOrderLine, CreditClass, LedgerClient, Project};
use ecoretire_core::types::{Retirement, SellOrder};
use std::sync::Mutex;
use std::time::Duration;

pub struct MockLedgerClient {
    orders: Vec<SellOrder>,
    allowed_denoms: Vec<String>,
    native_denom: String,
    buyer_address: String,
    next_tx_hash: Mutex<u64>,
}

impl MockLedgerClient {
    pub fn new(orders: Vec<SellOrder>, allowed_denoms: Vec<String>, native_denom: &str) -> Self {
        Self {
            orders,
            allowed_denoms,
            native_denom: native_denom.to_string(),
            buyer_address: "buyer1mockaddress".to_string(),
            next_tx_hash: Mutex::new(1),
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn list_sell_orders(&self) -> Result<Vec<SellOrder>, CoreError> {
        Ok(self.orders.clone())
    }

    async fn list_credit_classes(&self) -> Result<Vec<CreditClass>, CoreError> {
        Ok(vec![])
    }

    async fn list_projects(&self) -> Result<Vec<Project>, CoreError> {
        Ok(vec![])
    }

    async fn allowed_denoms(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.allowed_denoms.clone())
    }

    fn native_denom(&self) -> &str {
        &self.native_denom
    }

    async fn get_retirement(&self, _id_or_tx_hash: &str) -> Result<Option<Retirement>, CoreError> {
        Ok(None)
    }

    async fn wait_for_retirement(
        &self,
        _tx_hash: &str,
        _timeout: Duration,
    ) -> Result<Option<Retirement>, CoreError> {
        Ok(None)
    }

    async fn sign_and_broadcast(&self, _orders: &[BuyOrderLine]) -> Result<BroadcastResult, CoreError> {
        let mut counter = self.next_tx_hash.lock().unwrap();
        let tx_hash = format!("MOCKTX{counter:08}");
        *counter += 1;
        Ok(BroadcastResult {
            code: 0,
            tx_hash,
            height: Some(1),
            raw_log: String::new(),
        })
    }

    async fn balance_micro(&self, _denom: &str) -> Result<u128, CoreError> {
        Ok(1_000_000_000_000)
    }

    fn buyer_address(&self) -> &str {
        &self.buyer_address
    }
}
