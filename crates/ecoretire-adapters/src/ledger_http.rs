//! HTTP-backed ledger client: REST reads against the chain node plus a
//! GraphQL indexer for retirement lookups, and signed-transaction broadcast.

use async_trait::async_trait;
use chrono::Utc;
use ecoretire_core::error::CoreError;
use ecoretire_core::ledger::{BroadcastResult, BuyOrderLine, CreditClass, LedgerClient, Project};
use ecoretire_core::types::{Retirement, SellOrder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpLedgerClient {
    client: reqwest::Client,
    rest_base_url: String,
    indexer_base_url: String,
    buyer_address: String,
    native_denom: String,
}

impl HttpLedgerClient {
    pub fn new(
        rest_base_url: impl Into<String>,
        indexer_base_url: impl Into<String>,
        buyer_address: impl Into<String>,
        native_denom: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_base_url: rest_base_url.into(),
            indexer_base_url: indexer_base_url.into(),
            buyer_address: buyer_address.into(),
            native_denom: native_denom.into(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, CoreError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| CoreError::LedgerUnavailable(err.to_string()))?;
        if response.status().is_server_error() {
            return Err(CoreError::LedgerUnavailable(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(CoreError::LedgerFatal(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| CoreError::LedgerFatal(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SellOrderWire {
    id: String,
    batch_denom: String,
    quantity: String,
    ask_amount: String,
    ask_denom: String,
    disable_auto_retire: bool,
    expiration: Option<chrono::DateTime<Utc>>,
    credit_class_type: String,
}

#[derive(Debug, Deserialize)]
struct RetirementWire {
    node_id: String,
    amount: String,
    batch_denom: String,
    owner: String,
    jurisdiction: String,
    reason: String,
    timestamp: chrono::DateTime<Utc>,
    tx_hash: String,
    block_height: u64,
}

impl From<RetirementWire> for Retirement {
    fn from(w: RetirementWire) -> Self {
        Retirement {
            node_id: w.node_id,
            amount: w.amount,
            batch_denom: w.batch_denom,
            owner: w.owner,
            jurisdiction: w.jurisdiction,
            reason: w.reason,
            timestamp: w.timestamp,
            tx_hash: w.tx_hash,
            block_height: w.block_height,
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn list_sell_orders(&self) -> Result<Vec<SellOrder>, CoreError> {
        let url = format!("{}/ecocredit/v1/sell-orders", self.rest_base_url);
        let wire: Vec<SellOrderWire> = self.get_json(&url).await?;
        Ok(wire
            .into_iter()
            .map(|w| SellOrder {
                id: w.id,
                batch_denom: w.batch_denom,
                quantity: w.quantity,
                ask_amount: w.ask_amount.parse().unwrap_or(0),
                ask_denom: w.ask_denom,
                disable_auto_retire: w.disable_auto_retire,
                expiration: w.expiration,
                credit_class_type: w.credit_class_type,
            })
            .collect())
    }

    async fn list_credit_classes(&self) -> Result<Vec<CreditClass>, CoreError> {
        #[derive(Deserialize)]
        struct Wire {
            id: String,
            class_type: String,
        }
        let url = format!("{}/ecocredit/v1/classes", self.rest_base_url);
        let wire: Vec<Wire> = self.get_json(&url).await?;
        Ok(wire
            .into_iter()
            .map(|w| CreditClass {
                id: w.id,
                class_type: w.class_type,
            })
            .collect())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, CoreError> {
        #[derive(Deserialize)]
        struct Wire {
            id: String,
            name: String,
            jurisdiction: String,
        }
        let url = format!("{}/ecocredit/v1/projects", self.rest_base_url);
        let wire: Vec<Wire> = self.get_json(&url).await?;
        Ok(wire
            .into_iter()
            .map(|w| Project {
                id: w.id,
                name: w.name,
                jurisdiction: w.jurisdiction,
            })
            .collect())
    }

    async fn allowed_denoms(&self) -> Result<Vec<String>, CoreError> {
        let url = format!("{}/ecocredit/v1/allowed-denoms", self.rest_base_url);
        self.get_json(&url).await
    }

    fn native_denom(&self) -> &str {
        &self.native_denom
    }

    async fn get_retirement(&self, id_or_tx_hash: &str) -> Result<Option<Retirement>, CoreError> {
        let url = format!("{}/retirements/{id_or_tx_hash}", self.indexer_base_url);
        match self.get_json::<RetirementWire>(&url).await {
            Ok(wire) => Ok(Some(wire.into())),
            Err(CoreError::LedgerFatal(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn wait_for_retirement(
        &self,
        tx_hash: &str,
        timeout: Duration,
    ) -> Result<Option<Retirement>, CoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut backoff = Duration::from_millis(250);
        loop {
            if let Some(retirement) = self.get_retirement(tx_hash).await? {
                return Ok(Some(retirement));
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(tx_hash, "retirement not indexed yet within deadline");
                return Ok(None);
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(5));
        }
    }

    async fn sign_and_broadcast(&self, orders: &[BuyOrderLine]) -> Result<BroadcastResult, CoreError> {
        #[derive(serde::Serialize)]
        struct Line<'a> {
            sell_order_id: &'a str,
            quantity: &'a str,
            bid_price: BidPrice<'a>,
            disable_auto_retire: bool,
            retirement_jurisdiction: &'a str,
            retirement_reason: &'a str,
        }
        #[derive(serde::Serialize)]
        struct BidPrice<'a> {
            denom: &'a str,
            amount: String,
        }
        #[derive(serde::Serialize)]
        struct Body<'a> {
            buyer: &'a str,
            orders: Vec<Line<'a>>,
        }
        #[derive(Deserialize)]
        struct BroadcastWire {
            code: u32,
            tx_hash: String,
            height: Option<u64>,
            raw_log: String,
        }

        let body = Body {
            buyer: &self.buyer_address,
            orders: orders
                .iter()
                .map(|o| Line {
                    sell_order_id: &o.sell_order_id,
                    quantity: &o.quantity,
                    bid_price: BidPrice {
                        denom: &o.bid_denom,
                        amount: o.bid_amount.to_string(),
                    },
                    disable_auto_retire: o.disable_auto_retire,
                    retirement_jurisdiction: &o.retirement_jurisdiction,
                    retirement_reason: &o.retirement_reason,
                })
                .collect(),
        };

        let url = format!("{}/ecocredit/v1/tx/buy-direct", self.rest_base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| CoreError::LedgerUnavailable(err.to_string()))?;
        if response.status().is_server_error() {
            return Err(CoreError::LedgerUnavailable(format!(
                "broadcast endpoint returned {}",
                response.status()
            )));
        }
        let wire: BroadcastWire = response
            .json()
            .await
            .map_err(|err| CoreError::LedgerFatal(err.to_string()))?;
        if wire.code != 0 {
            warn!(code = wire.code, raw_log = %wire.raw_log, "broadcast returned non-zero code");
        }
        Ok(BroadcastResult {
            code: wire.code,
            tx_hash: wire.tx_hash,
            height: wire.height,
            raw_log: wire.raw_log,
        })
    }

    async fn balance_micro(&self, denom: &str) -> Result<u128, CoreError> {
        #[derive(Deserialize)]
        struct BalanceWire {
            amount: String,
        }
        let url = format!(
            "{}/cosmos/bank/v1beta1/balances/{}/by_denom?denom={denom}",
            self.rest_base_url, self.buyer_address
        );
        let wire: BalanceWire = self.get_json(&url).await?;
        Ok(wire.amount.parse().unwrap_or(0))
    }

    fn buyer_address(&self) -> &str {
        &self.buyer_address
    }
}
