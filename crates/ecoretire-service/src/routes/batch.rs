use crate::error::ApiError;
use crate::ServiceState;
use axum::extract::State;
use axum::Json;
use ecoretire_core::batch::BatchRequest;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RunBatchRequest {
    pub month: String,
    pub credit_type: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub preflight_only: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "Monthly ecological credit retirement".to_string()
}

pub async fn run_batch(
    State(state): State<ServiceState>,
    Json(body): Json<RunBatchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let execution = state
        .batch_driver
        .run(BatchRequest {
            month: body.month,
            credit_type: body.credit_type,
            dry_run: body.dry_run,
            reason: body.reason,
            preflight_only: body.preflight_only,
            force: body.force,
            fee_bps: state.config.fee_bps,
        })
        .await?;

    Ok(Json(serde_json::to_value(execution).unwrap()))
}
