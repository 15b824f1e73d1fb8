use crate::error::ApiError;
use crate::ServiceState;
use axum::extract::State;
use axum::Json;
use ecoretire_core::sync::{SubscriptionSync, SyncRequest};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct RunSyncRequest {
    pub customer_identifier: Option<String>,
    #[serde(default)]
    pub all_customers: bool,
    pub month: Option<String>,
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub price_tier_table: BTreeMap<String, String>,
}

pub async fn run_sync(
    State(state): State<ServiceState>,
    Json(body): Json<RunSyncRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sync = SubscriptionSync::new(state.gateway.clone(), state.pool.clone());
    let result = sync
        .run(SyncRequest {
            customer_identifier: body.customer_identifier,
            all_customers: body.all_customers,
            month_filter: body.month,
            max_pages: body.max_pages,
            price_tier_table: body.price_tier_table,
        })
        .await?;

    Ok(Json(serde_json::json!({
        "synced": result.synced,
        "duplicates": result.duplicates,
        "skipped": result.skipped,
        "truncated": result.truncated,
    })))
}
