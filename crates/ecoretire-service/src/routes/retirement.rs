use crate::error::ApiError;
use crate::ServiceState;
use axum::extract::State;
use axum::Json;
use ecoretire_core::retirement::{RetirementOutcome, RetirementRequest};
use ecoretire_core::types::IdentityAttribution;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ExecuteRetirementRequest {
    pub credit_type: Option<String>,
    pub quantity: String,
    #[serde(default = "default_jurisdiction")]
    pub jurisdiction: String,
    #[serde(default = "default_reason")]
    pub reason: String,
    #[serde(default)]
    pub identity: IdentityAttribution,
    pub preferred_denom: Option<String>,
    pub prepaid_user_id: Option<String>,
}

fn default_jurisdiction() -> String {
    "US".to_string()
}

fn default_reason() -> String {
    "on-demand retirement".to_string()
}

pub async fn execute_retirement(
    State(state): State<ServiceState>,
    Json(body): Json<ExecuteRetirementRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .retirement
        .execute(RetirementRequest {
            credit_type: body.credit_type,
            quantity: body.quantity,
            jurisdiction: body.jurisdiction,
            base_reason: body.reason,
            identity: body.identity,
            preferred_denom: body.preferred_denom,
            prepaid_user_id: body.prepaid_user_id,
        })
        .await;

    match outcome {
        RetirementOutcome::Success(success) => Ok(Json(serde_json::json!({
            "status": "success",
            "tx_hash": success.tx_hash,
            "credits_retired": success.credits_retired,
            "cost_micro": success.cost_micro.to_string(),
            "denom": success.denom,
            "block_height": success.block_height,
            "certificate_id": success.certificate_id,
            "remaining_balance_cents": success.remaining_balance_cents,
        }))),
        RetirementOutcome::MarketplaceFallback(fallback) => Ok(Json(serde_json::json!({
            "status": "marketplace_fallback",
            "marketplace_url": fallback.marketplace_url,
            "message": fallback.message,
        }))),
    }
}
