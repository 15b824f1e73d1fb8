//! Monthly batch retirement driver: budget → budget-constrained selection →
//! retire → proportional attribution.

use crate::attribution::{allocate_proportional, share_ppm};
use crate::error::CoreError;
use crate::ledger::LedgerClient;
use crate::money::{ceil_div, micro_to_decimal_string};
use crate::orders::select_orders_for_budget;
use crate::pool::{ContributorTotal, PoolStore};
use crate::retirement::{RetirementOutcome, RetirementRequest, RetirementService};
use crate::store::{load_json, save_json, StorageConfig};
use crate::types::{BatchExecution, BatchStatus, ContributorAttribution, IdentityAttribution};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait BatchExecutionStore: Send + Sync {
    async fn latest_for(
        &self,
        month: &str,
        credit_type: Option<&str>,
    ) -> Result<Option<BatchExecution>, CoreError>;

    async fn latest_successful_dry_run(
        &self,
        month: &str,
        credit_type: Option<&str>,
    ) -> Result<Option<BatchExecution>, CoreError>;

    async fn has_active(&self, month: &str, credit_type: Option<&str>) -> Result<bool, CoreError>;

    async fn save(&self, execution: BatchExecution) -> Result<(), CoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BatchState {
    executions: Vec<BatchExecution>,
}

pub struct JsonFileBatchExecutionStore {
    path: PathBuf,
    state: Mutex<BatchState>,
}

impl JsonFileBatchExecutionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let state: BatchState = load_json(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Mutex::new(BatchState::default()),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, CoreError> {
        match config {
            StorageConfig::Memory => Ok(Self::memory()),
            StorageConfig::JsonFile { path } => Self::open(path.clone()),
        }
    }

    fn persist(&self, state: &BatchState) -> Result<(), CoreError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        save_json(&self.path, state)
    }

    fn matches(execution: &BatchExecution, month: &str, credit_type: Option<&str>) -> bool {
        execution.month == month && execution.credit_type.as_deref() == credit_type
    }
}

#[async_trait]
impl BatchExecutionStore for JsonFileBatchExecutionStore {
    async fn latest_for(
        &self,
        month: &str,
        credit_type: Option<&str>,
    ) -> Result<Option<BatchExecution>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .executions
            .iter()
            .rev()
            .find(|e| Self::matches(e, month, credit_type))
            .cloned())
    }

    async fn latest_successful_dry_run(
        &self,
        month: &str,
        credit_type: Option<&str>,
    ) -> Result<Option<BatchExecution>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .executions
            .iter()
            .rev()
            .find(|e| {
                Self::matches(e, month, credit_type)
                    && e.dry_run
                    && e.status == BatchStatus::Success
            })
            .cloned())
    }

    async fn has_active(&self, month: &str, credit_type: Option<&str>) -> Result<bool, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .executions
            .iter()
            .any(|e| Self::matches(e, month, credit_type) && e.status == BatchStatus::InProgress))
    }

    async fn save(&self, execution: BatchExecution) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.executions.iter_mut().find(|e| e.id == execution.id) {
            *existing = execution;
        } else {
            state.executions.push(execution);
        }
        self.persist(&state)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub month: String,
    pub credit_type: Option<String>,
    pub dry_run: bool,
    pub reason: String,
    pub preflight_only: bool,
    pub force: bool,
    /// Basis points (of cents) withheld for operations/fees before selecting orders.
    pub fee_bps: u32,
}

pub struct BatchDriver {
    pool: Arc<dyn PoolStore>,
    store: Arc<dyn BatchExecutionStore>,
    ledger: Arc<dyn LedgerClient>,
    retirement: Arc<RetirementService>,
}

impl BatchDriver {
    pub fn new(
        pool: Arc<dyn PoolStore>,
        store: Arc<dyn BatchExecutionStore>,
        ledger: Arc<dyn LedgerClient>,
        retirement: Arc<RetirementService>,
    ) -> Self {
        Self {
            pool,
            store,
            ledger,
            retirement,
        }
    }

    pub async fn run(&self, request: BatchRequest) -> Result<BatchExecution, CoreError> {
        if self
            .store
            .has_active(&request.month, request.credit_type.as_deref())
            .await?
        {
            return Err(CoreError::BatchBlocked(format!(
                "a batch execution is already in progress for {} / {:?}",
                request.month, request.credit_type
            )));
        }

        if !request.dry_run && !request.preflight_only && !request.force {
            let preflight = self
                .store
                .latest_successful_dry_run(&request.month, request.credit_type.as_deref())
                .await?;
            if preflight.is_none() {
                let blocked = BatchExecution {
                    id: Uuid::new_v4().to_string(),
                    month: request.month.clone(),
                    credit_type: request.credit_type.clone(),
                    dry_run: false,
                    status: BatchStatus::Blocked,
                    reason: Some(
                        "no successful dry run on record for this month/credit type; pass force=true to override"
                            .to_string(),
                    ),
                    budget_usd_cents: 0,
                    spent_micro: "0".to_string(),
                    spent_denom: None,
                    retired_quantity: "0.000000".to_string(),
                    attributions: vec![],
                    tx_hash: None,
                    block_height: None,
                    retirement_id: None,
                    executed_at: Utc::now(),
                };
                self.store.save(blocked.clone()).await?;
                return Ok(blocked);
            }
        }

        let month_summary = self.pool.monthly_summary(&request.month).await?;
        let fee_cents = ceil_div(
            (month_summary.total_usd_cents.max(0) as u128) * request.fee_bps as u128,
            10_000,
        ) as i64;
        let budget_usd_cents = (month_summary.total_usd_cents - fee_cents).max(0);

        let contributors = self
            .pool
            .month_contributors(&request.month)
            .await?;

        let allowed_denoms = self.ledger.allowed_denoms().await?;
        let sell_orders = self.ledger.list_sell_orders().await?;
        let budget_micro = crate::money::cents_to_micro(budget_usd_cents);
        let selection = select_orders_for_budget(
            &sell_orders,
            request.credit_type.as_deref(),
            budget_micro,
            None,
            &allowed_denoms,
            self.ledger.native_denom(),
            self.ledger.now(),
        );

        if selection.orders.is_empty() {
            let failed = BatchExecution {
                id: Uuid::new_v4().to_string(),
                month: request.month.clone(),
                credit_type: request.credit_type.clone(),
                dry_run: request.dry_run,
                status: BatchStatus::Failed,
                reason: Some("no eligible orders for budget".to_string()),
                budget_usd_cents,
                spent_micro: "0".to_string(),
                spent_denom: None,
                retired_quantity: "0.000000".to_string(),
                attributions: vec![],
                tx_hash: None,
                block_height: None,
                retirement_id: None,
                executed_at: Utc::now(),
            };
            self.store.save(failed.clone()).await?;
            return Ok(failed);
        }

        if request.dry_run || request.preflight_only {
            let planned = BatchExecution {
                id: Uuid::new_v4().to_string(),
                month: request.month.clone(),
                credit_type: request.credit_type.clone(),
                dry_run: true,
                status: BatchStatus::Success,
                reason: None,
                budget_usd_cents,
                spent_micro: selection.total_cost_micro.to_string(),
                spent_denom: Some(selection.payment_denom.clone()),
                retired_quantity: micro_to_decimal_string(selection.total_quantity_micro),
                attributions: compute_attributions(
                    budget_usd_cents,
                    selection.total_cost_micro,
                    selection.total_quantity_micro,
                    &selection.payment_denom,
                    &contributors,
                ),
                tx_hash: None,
                block_height: None,
                retirement_id: None,
                executed_at: Utc::now(),
            };
            self.store.save(planned.clone()).await?;
            return Ok(planned);
        }

        info!(month = %request.month, quantity = %micro_to_decimal_string(selection.total_quantity_micro), "executing live batch retirement");
        let outcome = self
            .retirement
            .execute(RetirementRequest {
                credit_type: request.credit_type.clone(),
                quantity: micro_to_decimal_string(selection.total_quantity_micro),
                jurisdiction: "US".to_string(),
                base_reason: request.reason.clone(),
                identity: IdentityAttribution::None,
                preferred_denom: Some(selection.payment_denom.clone()),
                prepaid_user_id: None,
            })
            .await;

        let execution = match outcome {
            RetirementOutcome::Success(success) => BatchExecution {
                id: Uuid::new_v4().to_string(),
                month: request.month.clone(),
                credit_type: request.credit_type.clone(),
                dry_run: false,
                status: BatchStatus::Success,
                reason: None,
                budget_usd_cents,
                spent_micro: success.cost_micro.to_string(),
                spent_denom: Some(success.denom.clone()),
                retired_quantity: success.credits_retired.clone(),
                attributions: compute_attributions(
                    budget_usd_cents,
                    success.cost_micro,
                    crate::money::decimal_string_to_micro(&success.credits_retired).unwrap_or(0),
                    &success.denom,
                    &contributors,
                ),
                tx_hash: Some(success.tx_hash),
                block_height: success.block_height,
                retirement_id: success.certificate_id,
                executed_at: Utc::now(),
            },
            RetirementOutcome::MarketplaceFallback(fallback) => BatchExecution {
                id: Uuid::new_v4().to_string(),
                month: request.month.clone(),
                credit_type: request.credit_type.clone(),
                dry_run: false,
                status: BatchStatus::Failed,
                reason: Some(fallback.message),
                budget_usd_cents,
                spent_micro: "0".to_string(),
                spent_denom: None,
                retired_quantity: "0.000000".to_string(),
                attributions: vec![],
                tx_hash: None,
                block_height: None,
                retirement_id: None,
                executed_at: Utc::now(),
            },
        };

        self.store.save(execution.clone()).await?;
        Ok(execution)
    }
}

fn compute_attributions(
    budget_usd_cents: i64,
    cost_micro: u128,
    quantity_micro: u128,
    denom: &str,
    contributors: &[ContributorTotal],
) -> Vec<ContributorAttribution> {
    if contributors.is_empty() {
        return vec![];
    }
    let weights: Vec<u128> = contributors
        .iter()
        .map(|c| c.total_usd_cents.max(0) as u128)
        .collect();
    let sum_w: u128 = weights.iter().sum();

    let budget_allocations = allocate_proportional(budget_usd_cents.max(0) as u128, &weights);
    let cost_allocations = allocate_proportional(cost_micro, &weights);
    let quantity_allocations = allocate_proportional(quantity_micro, &weights);

    contributors
        .iter()
        .enumerate()
        .map(|(i, c)| ContributorAttribution {
            user_id: c.user_id.clone(),
            share_ppm: share_ppm(weights[i], sum_w),
            contribution_usd_cents: c.total_usd_cents,
            attributed_budget_usd_cents: budget_allocations[i] as i64,
            attributed_cost_micro: cost_allocations[i].to_string(),
            attributed_quantity: micro_to_decimal_string(quantity_allocations[i]),
            payment_denom: denom.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_totals_match_batch_totals() {
        let contributors = vec![
            ContributorTotal {
                user_id: "a".to_string(),
                total_usd_cents: 100,
            },
            ContributorTotal {
                user_id: "b".to_string(),
                total_usd_cents: 200,
            },
        ];
        let attributions = compute_attributions(300, 9_999_999, 1_234_567, "uusd", &contributors);
        let budget_sum: i64 = attributions.iter().map(|a| a.attributed_budget_usd_cents).sum();
        assert_eq!(budget_sum, 300);
        let cost_sum: u128 = attributions
            .iter()
            .map(|a| a.attributed_cost_micro.parse::<u128>().unwrap())
            .sum();
        assert_eq!(cost_sum, 9_999_999);
    }
}
