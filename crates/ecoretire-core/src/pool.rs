//! Append-only pool accounting: idempotent contribution recording and aggregation.

use crate::error::CoreError;
use crate::store::{load_json, save_json, StorageConfig};
use crate::types::{Contribution, ContributionSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RecordContributionInput {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub email: Option<String>,
    pub amount_usd_cents: i64,
    pub contributed_at: chrono::DateTime<chrono::Utc>,
    pub source: ContributionSource,
    pub external_event_id: Option<String>,
    pub tier_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

fn derive_user_id(input: &RecordContributionInput) -> Result<String, CoreError> {
    if let Some(id) = input.user_id.as_ref().filter(|s| !s.is_empty()) {
        return Ok(id.clone());
    }
    if let Some(customer) = input.customer_id.as_ref().filter(|s| !s.is_empty()) {
        return Ok(format!("customer:{customer}"));
    }
    if let Some(email) = input.email.as_ref().filter(|s| !s.is_empty()) {
        return Ok(format!("email:{}", email.to_lowercase()));
    }
    Err(CoreError::InvalidRequest(
        "one of user_id, customer_id, or email is required".to_string(),
    ))
}

#[derive(Debug, Clone)]
pub struct RecordContributionResult {
    pub record: Contribution,
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContributorTotal {
    pub user_id: String,
    pub total_usd_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlySummary {
    pub month: String,
    pub total_usd_cents: i64,
    pub contribution_count: u32,
    pub unique_contributors: u32,
    pub per_contributor: Vec<ContributorTotal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthBreakdown {
    pub month: String,
    pub total_usd_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub lifetime_total_usd_cents: i64,
    pub per_month: Vec<MonthBreakdown>,
    pub last_contribution_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn record_contribution(
        &self,
        input: RecordContributionInput,
    ) -> Result<RecordContributionResult, CoreError>;

    async fn monthly_summary(&self, month: &str) -> Result<MonthlySummary, CoreError>;

    async fn user_summary(&self, identifier: &str) -> Result<UserSummary, CoreError>;

    async fn month_contributors(&self, month: &str) -> Result<Vec<ContributorTotal>, CoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PoolState {
    version: u32,
    contributions: Vec<Contribution>,
}

pub struct JsonFilePoolStore {
    path: PathBuf,
    state: Mutex<PoolState>,
}

impl JsonFilePoolStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let mut state: PoolState = load_json(&path)?;
        if state.version == 0 {
            state.version = 1;
        }
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Mutex::new(PoolState {
                version: 1,
                contributions: Vec::new(),
            }),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, CoreError> {
        match config {
            StorageConfig::Memory => Ok(Self::memory()),
            StorageConfig::JsonFile { path } => Self::open(path.clone()),
        }
    }

    fn persist(&self, state: &PoolState) -> Result<(), CoreError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        save_json(&self.path, state)
    }
}

fn aggregate_monthly(contributions: &[Contribution], month: &str) -> MonthlySummary {
    let mut per_contributor: BTreeMap<String, i64> = BTreeMap::new();
    let mut total = 0i64;
    let mut count = 0u32;
    for c in contributions.iter().filter(|c| c.month() == month) {
        total += c.amount_usd_cents;
        count += 1;
        *per_contributor.entry(c.user_id.clone()).or_insert(0) += c.amount_usd_cents;
    }
    let mut per_contributor: Vec<ContributorTotal> = per_contributor
        .into_iter()
        .map(|(user_id, total_usd_cents)| ContributorTotal {
            user_id,
            total_usd_cents,
        })
        .collect();
    per_contributor.sort_by(|a, b| {
        b.total_usd_cents
            .cmp(&a.total_usd_cents)
            .then(a.user_id.cmp(&b.user_id))
    });
    MonthlySummary {
        month: month.to_string(),
        total_usd_cents: total,
        contribution_count: count,
        unique_contributors: per_contributor.len() as u32,
        per_contributor,
    }
}

#[async_trait]
impl PoolStore for JsonFilePoolStore {
    async fn record_contribution(
        &self,
        input: RecordContributionInput,
    ) -> Result<RecordContributionResult, CoreError> {
        let user_id = derive_user_id(&input)?;
        let mut state = self.state.lock().await;

        if let Some(event_id) = input.external_event_id.as_ref().filter(|s| !s.is_empty()) {
            if let Some(existing) = state
                .contributions
                .iter()
                .find(|c| c.external_event_id.as_deref() == Some(event_id.as_str()))
            {
                return Ok(RecordContributionResult {
                    record: existing.clone(),
                    duplicate: true,
                });
            }
        }

        let record = Contribution {
            id: Uuid::new_v4().to_string(),
            user_id,
            amount_usd_cents: input.amount_usd_cents,
            contributed_at: input.contributed_at,
            source: input.source,
            external_event_id: input.external_event_id,
            tier_id: input.tier_id,
            metadata: input.metadata,
        };
        state.contributions.push(record.clone());
        self.persist(&state)?;

        Ok(RecordContributionResult {
            record,
            duplicate: false,
        })
    }

    async fn monthly_summary(&self, month: &str) -> Result<MonthlySummary, CoreError> {
        let state = self.state.lock().await;
        Ok(aggregate_monthly(&state.contributions, month))
    }

    async fn user_summary(&self, identifier: &str) -> Result<UserSummary, CoreError> {
        let state = self.state.lock().await;
        let mut per_month: BTreeMap<String, i64> = BTreeMap::new();
        let mut lifetime = 0i64;
        let mut last: Option<chrono::DateTime<chrono::Utc>> = None;
        for c in state
            .contributions
            .iter()
            .filter(|c| c.user_id == identifier)
        {
            lifetime += c.amount_usd_cents;
            *per_month.entry(c.month()).or_insert(0) += c.amount_usd_cents;
            last = Some(last.map_or(c.contributed_at, |l| l.max(c.contributed_at)));
        }
        let mut per_month: Vec<MonthBreakdown> = per_month
            .into_iter()
            .map(|(month, total_usd_cents)| MonthBreakdown {
                month,
                total_usd_cents,
            })
            .collect();
        per_month.sort_by(|a, b| b.month.cmp(&a.month));
        Ok(UserSummary {
            user_id: identifier.to_string(),
            lifetime_total_usd_cents: lifetime,
            per_month,
            last_contribution_at: last,
        })
    }

    async fn month_contributors(&self, month: &str) -> Result<Vec<ContributorTotal>, CoreError> {
        let state = self.state.lock().await;
        Ok(aggregate_monthly(&state.contributions, month).per_contributor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_input(event_id: Option<&str>, cents: i64, day: &str) -> RecordContributionInput {
        RecordContributionInput {
            user_id: Some("user-1".to_string()),
            customer_id: None,
            email: None,
            amount_usd_cents: cents,
            contributed_at: chrono::DateTime::parse_from_rfc3339(day)
                .unwrap()
                .with_timezone(&chrono::Utc),
            source: ContributionSource::OneOff,
            external_event_id: event_id.map(|s| s.to_string()),
            tier_id: None,
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_external_event_id_is_idempotent() {
        let store = JsonFilePoolStore::memory();
        let first = store
            .record_contribution(make_input(Some("evt-1"), 300, "2026-03-15T00:00:00Z"))
            .await
            .unwrap();
        assert!(!first.duplicate);
        let second = store
            .record_contribution(make_input(Some("evt-1"), 300, "2026-03-15T00:00:00Z"))
            .await
            .unwrap();
        assert!(second.duplicate);
        assert_eq!(second.record.id, first.record.id);

        let summary = store.monthly_summary("2026-03").await.unwrap();
        assert_eq!(summary.total_usd_cents, 300);
        assert_eq!(summary.contribution_count, 1);
    }

    #[tokio::test]
    async fn monthly_aggregate_matches_sum_of_contributions() {
        let store = JsonFilePoolStore::memory();
        store
            .record_contribution(make_input(Some("evt-a"), 100, "2026-03-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .record_contribution(make_input(Some("evt-b"), 200, "2026-03-02T00:00:00Z"))
            .await
            .unwrap();
        let summary = store.monthly_summary("2026-03").await.unwrap();
        assert_eq!(summary.total_usd_cents, 300);
        let per_contributor_sum: i64 = summary.per_contributor.iter().map(|c| c.total_usd_cents).sum();
        assert_eq!(per_contributor_sum, summary.total_usd_cents);
    }

    #[test]
    fn user_id_derivation_falls_back_to_email() {
        let input = RecordContributionInput {
            user_id: None,
            customer_id: None,
            email: Some("Ada@Example.com".to_string()),
            amount_usd_cents: 100,
            contributed_at: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            source: ContributionSource::OneOff,
            external_event_id: None,
            tier_id: None,
            metadata: BTreeMap::new(),
        };
        assert_eq!(derive_user_id(&input).unwrap(), "email:ada@example.com");
    }
}
