//! Bearer-token gate for everything under `/api/v1`.

use crate::error::ApiError;
use crate::ServiceState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

pub async fn require_api_key(
    State(state): State<ServiceState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?;

    let api_key = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Authorization header must use Bearer scheme"))?;

    if !state.config.api_keys.iter().any(|k| k == api_key) {
        return Err(ApiError::unauthorized("unknown API key"));
    }

    if let Err(retry_after) = state.rate_limiter.check(api_key) {
        return Err(ApiError::rate_limited(format!(
            "retry after {} seconds",
            retry_after.as_secs()
        )));
    }

    Ok(next.run(request).await)
}
