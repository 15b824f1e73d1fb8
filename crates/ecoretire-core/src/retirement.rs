//! Orchestrates a single on-chain retirement: authorize, broadcast, capture, poll.
//!
//! No error path escapes `execute`: every failure downstream of "do we even
//! have a wallet configured" is translated into a marketplace fallback.

use crate::error::CoreError;
use crate::identity::append_identity_to_reason;
use crate::ledger::{BuyOrderLine, LedgerClient};
use crate::orders::{select_best_orders, SelectionResult};
use crate::payment::{AuthorizationStatus, PaymentProvider};
use crate::types::IdentityAttribution;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait PrepaidLedger: Send + Sync {
    async fn balance_cents(&self, user_id: &str) -> Result<i64, CoreError>;
    async fn debit(&self, user_id: &str, amount_cents: i64, tx_hash: &str) -> Result<(), CoreError>;
}

#[derive(Debug, Clone)]
pub struct RetirementRequest {
    pub credit_type: Option<String>,
    /// 6-decimal quantity string of credits to retire.
    pub quantity: String,
    pub jurisdiction: String,
    pub base_reason: String,
    pub identity: IdentityAttribution,
    pub preferred_denom: Option<String>,
    pub prepaid_user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetirementSuccess {
    pub tx_hash: String,
    pub credits_retired: String,
    pub cost_micro: u128,
    pub denom: String,
    pub block_height: Option<u64>,
    pub certificate_id: Option<String>,
    pub remaining_balance_cents: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MarketplaceFallback {
    pub marketplace_url: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum RetirementOutcome {
    Success(RetirementSuccess),
    MarketplaceFallback(MarketplaceFallback),
}

pub struct RetirementService {
    ledger: Arc<dyn LedgerClient>,
    payment: Arc<dyn PaymentProvider>,
    prepaid: Option<Arc<dyn PrepaidLedger>>,
    marketplace_url: String,
    wallet_configured: bool,
    wait_timeout: Duration,
}

impl RetirementService {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        payment: Arc<dyn PaymentProvider>,
        prepaid: Option<Arc<dyn PrepaidLedger>>,
        marketplace_url: impl Into<String>,
        wallet_configured: bool,
    ) -> Self {
        Self {
            ledger,
            payment,
            prepaid,
            marketplace_url: marketplace_url.into(),
            wallet_configured,
            wait_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    fn fallback(&self, message: impl Into<String>) -> RetirementOutcome {
        let message = message.into();
        warn!(message = %message, "retirement falling back to marketplace");
        RetirementOutcome::MarketplaceFallback(MarketplaceFallback {
            marketplace_url: self.marketplace_url.clone(),
            message,
        })
    }

    pub async fn execute(&self, request: RetirementRequest) -> RetirementOutcome {
        if !self.wallet_configured {
            return self.fallback("no wallet configured for on-chain retirement");
        }

        let target_quantity_micro =
            match crate::money::decimal_string_to_micro(&request.quantity) {
                Some(q) if q > 0 => q,
                _ => return self.fallback("invalid retirement quantity"),
            };

        let allowed_denoms = match self.ledger.allowed_denoms().await {
            Ok(denoms) => denoms,
            Err(err) => return self.fallback(format!("ledger unavailable: {err}")),
        };
        let sell_orders = match self.ledger.list_sell_orders().await {
            Ok(orders) => orders,
            Err(err) => return self.fallback(format!("ledger unavailable: {err}")),
        };

        let selection: SelectionResult = select_best_orders(
            &sell_orders,
            request.credit_type.as_deref(),
            target_quantity_micro,
            request.preferred_denom.as_deref(),
            &allowed_denoms,
            self.ledger.native_denom(),
            self.ledger.now(),
        );

        if selection.orders.is_empty() || selection.insufficient_supply {
            return self.fallback("insufficient on-chain supply for requested quantity");
        }

        if let (Some(prepaid), Some(user_id)) = (&self.prepaid, &request.prepaid_user_id) {
            let cost_cents = crate::money::micro_to_cents_ceil(selection.total_cost_micro);
            match prepaid.balance_cents(user_id).await {
                Ok(balance) if balance >= cost_cents => {}
                Ok(_) => return self.fallback("insufficient prepaid balance"),
                Err(err) => return self.fallback(format!("prepaid balance check failed: {err}")),
            }
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("quantity".to_string(), request.quantity.clone());
        metadata.insert("jurisdiction".to_string(), request.jurisdiction.clone());

        let authorization = match self
            .payment
            .authorize(selection.total_cost_micro, &selection.payment_denom, &metadata)
            .await
        {
            Ok(auth) if auth.status == AuthorizationStatus::Authorized => auth,
            Ok(auth) => {
                return self.fallback(
                    auth.message
                        .unwrap_or_else(|| "payment authorization failed".to_string()),
                )
            }
            Err(err) => return self.fallback(format!("payment authorization error: {err}")),
        };

        let reason = append_identity_to_reason(&request.base_reason, &request.identity);
        let lines: Vec<BuyOrderLine> = selection
            .orders
            .iter()
            .map(|o| BuyOrderLine {
                sell_order_id: o.order_id.clone(),
                quantity: o.quantity.clone(),
                bid_denom: selection.payment_denom.clone(),
                bid_amount: o.cost_micro,
                disable_auto_retire: false,
                retirement_jurisdiction: request.jurisdiction.clone(),
                retirement_reason: reason.clone(),
            })
            .collect();

        info!(orders = lines.len(), "broadcasting retirement transaction");
        let broadcast = match self.ledger.sign_and_broadcast(&lines).await {
            Ok(result) if result.code == 0 => result,
            Ok(result) => {
                self.release_hold(&authorization.id).await;
                return self.fallback(format!("broadcast rejected: {}", result.raw_log));
            }
            Err(err) => {
                self.release_hold(&authorization.id).await;
                return self.fallback(format!("broadcast failed: {err}"));
            }
        };

        // The transaction already landed on-chain; a capture failure here cannot
        // be resolved by releasing the hold. Log it for manual reconciliation.
        if let Err(err) = self.payment.capture(&authorization.id).await {
            warn!(error = %err, tx_hash = %broadcast.tx_hash, "capture failed after successful broadcast");
        }

        let remaining_balance_cents =
            if let (Some(prepaid), Some(user_id)) = (&self.prepaid, &request.prepaid_user_id) {
                let cost_cents = crate::money::micro_to_cents_ceil(selection.total_cost_micro);
                match prepaid.debit(user_id, cost_cents, &broadcast.tx_hash).await {
                    Ok(()) => prepaid.balance_cents(user_id).await.ok(),
                    Err(err) => {
                        warn!(error = %err, "prepaid debit failed after on-chain capture");
                        None
                    }
                }
            } else {
                None
            };

        let retirement = self
            .ledger
            .wait_for_retirement(&broadcast.tx_hash, self.wait_timeout)
            .await
            .ok()
            .flatten();

        RetirementOutcome::Success(RetirementSuccess {
            tx_hash: broadcast.tx_hash,
            credits_retired: crate::money::micro_to_decimal_string(selection.total_quantity_micro),
            cost_micro: selection.total_cost_micro,
            denom: selection.payment_denom,
            block_height: broadcast.height,
            certificate_id: retirement.map(|r| r.node_id),
            remaining_balance_cents,
        })
    }

    async fn release_hold(&self, authorization_id: &str) {
        if let Err(err) = self.payment.refund(authorization_id).await {
            warn!(error = %err, authorization_id, "refund after failed retirement also failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{BroadcastResult, CreditClass, Project};
    use crate::payment::{Authorization, Receipt};
    use crate::types::{Retirement, SellOrder};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FakeLedger {
        orders: Vec<SellOrder>,
        broadcast_result: Mutex<Option<Result<BroadcastResult, String>>>,
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
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
            Ok(vec!["uusd".to_string()])
        }
        fn native_denom(&self) -> &str {
            "uusd"
        }
        async fn get_retirement(&self, _id: &str) -> Result<Option<Retirement>, CoreError> {
            Ok(None)
        }
        async fn wait_for_retirement(
            &self,
            _tx_hash: &str,
            _timeout: Duration,
        ) -> Result<Option<Retirement>, CoreError> {
            Ok(None)
        }
        async fn sign_and_broadcast(
            &self,
            _orders: &[BuyOrderLine],
        ) -> Result<BroadcastResult, CoreError> {
            match self.broadcast_result.lock().unwrap().take() {
                Some(Ok(result)) => Ok(result),
                Some(Err(msg)) => Err(CoreError::LedgerUnavailable(msg)),
                None => Ok(BroadcastResult {
                    code: 0,
                    tx_hash: "tx-default".to_string(),
                    height: Some(100),
                    raw_log: String::new(),
                }),
            }
        }
        async fn balance_micro(&self, _denom: &str) -> Result<u128, CoreError> {
            Ok(1_000_000_000)
        }
        fn buyer_address(&self) -> &str {
            "buyer1"
        }
    }

    struct FakePayment {
        refund_calls: AtomicU32,
        capture_calls: AtomicU32,
    }

    #[async_trait]
    impl PaymentProvider for FakePayment {
        fn name(&self) -> &'static str {
            "fake"
        }
        async fn authorize(
            &self,
            _amount_micro: u128,
            _denom: &str,
            _metadata: &BTreeMap<String, String>,
        ) -> Result<Authorization, CoreError> {
            Ok(Authorization {
                id: "auth-1".to_string(),
                status: AuthorizationStatus::Authorized,
                message: None,
            })
        }
        async fn capture(&self, authorization_id: &str) -> Result<Receipt, CoreError> {
            self.capture_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt {
                authorization_id: authorization_id.to_string(),
                captured_amount_micro: 0,
                denom: "uusd".to_string(),
                metadata: BTreeMap::new(),
            })
        }
        async fn refund(&self, _authorization_id: &str) -> Result<(), CoreError> {
            self.refund_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn order() -> SellOrder {
        SellOrder {
            id: "order-1".to_string(),
            batch_denom: "C01-001".to_string(),
            quantity: "5".to_string(),
            ask_amount: 1000,
            ask_denom: "uusd".to_string(),
            disable_auto_retire: false,
            expiration: None,
            credit_class_type: "C".to_string(),
        }
    }

    fn request() -> RetirementRequest {
        RetirementRequest {
            credit_type: None,
            quantity: "1".to_string(),
            jurisdiction: "US".to_string(),
            base_reason: "monthly retirement".to_string(),
            identity: IdentityAttribution::None,
            preferred_denom: None,
            prepaid_user_id: None,
        }
    }

    #[tokio::test]
    async fn no_wallet_configured_falls_back_immediately() {
        let ledger = Arc::new(FakeLedger {
            orders: vec![order()],
            broadcast_result: Mutex::new(None),
        });
        let payment = Arc::new(FakePayment {
            refund_calls: AtomicU32::new(0),
            capture_calls: AtomicU32::new(0),
        });
        let service = RetirementService::new(ledger, payment, None, "https://market", false);
        let outcome = service.execute(request()).await;
        assert!(matches!(outcome, RetirementOutcome::MarketplaceFallback(_)));
    }

    #[tokio::test]
    async fn broadcast_failure_refunds_the_hold_and_never_captures() {
        let ledger = Arc::new(FakeLedger {
            orders: vec![order()],
            broadcast_result: Mutex::new(Some(Err("rpc unavailable".to_string()))),
        });
        let payment = Arc::new(FakePayment {
            refund_calls: AtomicU32::new(0),
            capture_calls: AtomicU32::new(0),
        });
        let service = RetirementService::new(ledger, payment.clone(), None, "https://market", true);
        let outcome = service.execute(request()).await;
        match outcome {
            RetirementOutcome::MarketplaceFallback(fb) => {
                assert!(fb.message.contains("rpc unavailable"));
            }
            RetirementOutcome::Success(_) => panic!("expected fallback"),
        }
        assert_eq!(payment.refund_calls.load(Ordering::SeqCst), 1);
        assert_eq!(payment.capture_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_broadcast_captures_and_returns_success() {
        let ledger = Arc::new(FakeLedger {
            orders: vec![order()],
            broadcast_result: Mutex::new(Some(Ok(BroadcastResult {
                code: 0,
                tx_hash: "tx-abc".to_string(),
                height: Some(42),
                raw_log: String::new(),
            }))),
        });
        let payment = Arc::new(FakePayment {
            refund_calls: AtomicU32::new(0),
            capture_calls: AtomicU32::new(0),
        });
        let service = RetirementService::new(ledger, payment.clone(), None, "https://market", true);
        let outcome = service.execute(request()).await;
        match outcome {
            RetirementOutcome::Success(success) => {
                assert_eq!(success.tx_hash, "tx-abc");
                assert_eq!(success.block_height, Some(42));
            }
            RetirementOutcome::MarketplaceFallback(fb) => panic!("unexpected fallback: {}", fb.message),
        }
        assert_eq!(payment.capture_calls.load(Ordering::SeqCst), 1);
        assert_eq!(payment.refund_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insufficient_supply_falls_back_without_touching_payment() {
        let ledger = Arc::new(FakeLedger {
            orders: vec![],
            broadcast_result: Mutex::new(None),
        });
        let payment = Arc::new(FakePayment {
            refund_calls: AtomicU32::new(0),
            capture_calls: AtomicU32::new(0),
        });
        let service = RetirementService::new(ledger, payment.clone(), None, "https://market", true);
        let outcome = service.execute(request()).await;
        assert!(matches!(outcome, RetirementOutcome::MarketplaceFallback(_)));
        assert_eq!(payment.capture_calls.load(Ordering::SeqCst), 0);
        assert_eq!(payment.refund_calls.load(Ordering::SeqCst), 0);
    }
}
