pub mod auth;
pub mod batch;
pub mod openapi;
pub mod pool;
pub mod retirement;
pub mod sync;

use crate::auth_middleware::require_api_key;
use crate::webhook::receive_checkout_completed;
use crate::ServiceState;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

async fn health() -> &'static str {
    "ok"
}

pub fn build_router(state: ServiceState) -> Router {
    let protected = Router::new()
        .route("/contributions", post(pool::record_contribution))
        .route("/pool/monthly/:month", get(pool::monthly_summary))
        .route("/pool/users/:user_id", get(pool::user_summary))
        .route("/retirements", post(retirement::execute_retirement))
        .route("/batch/run", post(batch::run_batch))
        .route("/sync/run", post(sync::run_sync))
        .route("/auth/email/start", post(auth::start_email))
        .route("/auth/email/verify", post(auth::verify_email))
        .route("/auth/oauth/start", post(auth::start_oauth))
        .route("/auth/oauth/verify", post(auth::verify_oauth))
        .route("/auth/recovery/start", post(auth::start_recovery))
        .route("/auth/recovery/redeem", post(auth::recover))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/openapi.json", get(openapi::serve_openapi))
        .route("/webhooks/gateway", post(receive_checkout_completed))
        .nest("/api/v1", protected)
        .with_state(state)
}
