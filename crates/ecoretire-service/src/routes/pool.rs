use crate::error::ApiError;
use crate::ServiceState;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use ecoretire_core::pool::RecordContributionInput;
use ecoretire_core::types::ContributionSource;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct RecordContributionRequest {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub email: Option<String>,
    pub amount_usd_cents: i64,
    pub source: ContributionSource,
    pub tier_id: Option<String>,
    pub external_event_id: Option<String>,
}

pub async fn record_contribution(
    State(state): State<ServiceState>,
    Json(body): Json<RecordContributionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .pool
        .record_contribution(RecordContributionInput {
            user_id: body.user_id,
            customer_id: body.customer_id,
            email: body.email,
            amount_usd_cents: body.amount_usd_cents,
            contributed_at: Utc::now(),
            source: body.source,
            external_event_id: body.external_event_id,
            tier_id: body.tier_id,
            metadata: BTreeMap::new(),
        })
        .await?;

    Ok(Json(serde_json::json!({
        "record": result.record,
        "duplicate": result.duplicate,
    })))
}

pub async fn monthly_summary(
    State(state): State<ServiceState>,
    Path(month): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state.pool.monthly_summary(&month).await?;
    Ok(Json(serde_json::to_value(summary).unwrap()))
}

pub async fn user_summary(
    State(state): State<ServiceState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state.pool.user_summary(&user_id).await?;
    Ok(Json(serde_json::to_value(summary).unwrap()))
}
