use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionSource {
    Subscription,
    OneOff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub id: String,
    pub user_id: String,
    pub amount_usd_cents: i64,
    pub contributed_at: DateTime<Utc>,
    pub source: ContributionSource,
    pub external_event_id: Option<String>,
    pub tier_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Contribution {
    /// First seven characters of `contributed_at` in `YYYY-MM` form.
    pub fn month(&self) -> String {
        self.contributed_at.format("%Y-%m").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    InProgress,
    Success,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorAttribution {
    pub user_id: String,
    pub share_ppm: u32,
    pub contribution_usd_cents: i64,
    pub attributed_budget_usd_cents: i64,
    /// Decimal string, micro-units of `payment_denom`.
    pub attributed_cost_micro: String,
    /// 6-decimal quantity string.
    pub attributed_quantity: String,
    pub payment_denom: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchExecution {
    pub id: String,
    pub month: String,
    pub credit_type: Option<String>,
    pub dry_run: bool,
    pub status: BatchStatus,
    pub reason: Option<String>,
    pub budget_usd_cents: i64,
    pub spent_micro: String,
    pub spent_denom: Option<String>,
    pub retired_quantity: String,
    pub attributions: Vec<ContributorAttribution>,
    pub tx_hash: Option<String>,
    pub block_height: Option<u64>,
    pub retirement_id: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    None,
    Customer,
    AllCustomers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    DryRun,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    InProgress,
    Completed,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub synced: u32,
    pub duplicates: u32,
    pub skipped: u32,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: String,
    pub month: String,
    pub credit_type: Option<String>,
    pub sync_scope: SyncScope,
    pub execution_mode: ExecutionMode,
    pub preflight_only: bool,
    pub force: bool,
    pub status: ReconciliationStatus,
    pub batch_status: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sync: Option<SyncSummary>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Email,
    Oauth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Pending,
    Verified,
    Expired,
    Locked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub id: String,
    pub method: AuthMethod,
    pub status: AuthStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub beneficiary_name: Option<String>,
    pub beneficiary_email: Option<String>,
    pub auth_provider: Option<String>,
    pub auth_subject: Option<String>,
    pub email_code_hash: Option<String>,
    pub oauth_state_token: Option<String>,
    pub verification_attempts: u32,
    pub max_verification_attempts: u32,
    pub linked_user_id: Option<String>,
}

impl AuthSession {
    /// Materializes the pending-to-expired transition against wall clock time.
    /// Returns true if the status was changed.
    pub fn materialize_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == AuthStatus::Pending && self.expires_at <= now {
            self.status = AuthStatus::Expired;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryToken {
    pub id: String,
    pub token_hash: String,
    pub session_id: String,
    pub beneficiary_email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SellOrder {
    pub id: String,
    pub batch_denom: String,
    /// 6-decimal quantity string.
    pub quantity: String,
    pub ask_amount: u128,
    pub ask_denom: String,
    pub disable_auto_retire: bool,
    pub expiration: Option<DateTime<Utc>>,
    pub credit_class_type: String,
}

#[derive(Debug, Clone)]
pub struct Retirement {
    pub node_id: String,
    pub amount: String,
    pub batch_denom: String,
    pub owner: String,
    pub jurisdiction: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
    pub block_height: u64,
}

/// Identity bound to a retirement, encoded into the on-chain reason string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum IdentityAttribution {
    None,
    Manual {
        name: String,
    },
    Email {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        email: String,
    },
    Oauth {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        provider: String,
        subject: String,
    },
}

impl Default for IdentityAttribution {
    fn default() -> Self {
        Self::None
    }
}
