use crate::error::ApiError;
use crate::ServiceState;
use axum::extract::State;
use axum::Json;
use ecoretire_core::auth::StartEmailAuthInput;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StartEmailRequest {
    pub email: String,
    pub name: Option<String>,
}

pub async fn start_email(
    State(state): State<ServiceState>,
    Json(body): Json<StartEmailRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let started = state
        .auth
        .start_email_auth(StartEmailAuthInput {
            email: body.email,
            name: body.name,
        })
        .await?;

    // The verification code is returned here only because this deployment has
    // no outbound email collaborator wired in; a production caller delivers it
    // out of band and never forwards it over this response.
    Ok(Json(serde_json::json!({
        "session_id": started.session.id,
        "expires_at": started.session.expires_at,
        "code": started.code,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub session_id: String,
    pub code: String,
}

pub async fn verify_email(
    State(state): State<ServiceState>,
    Json(body): Json<VerifyEmailRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .auth
        .verify_email_auth(&body.session_id, &body.code)
        .await?;
    Ok(Json(serde_json::to_value(session).unwrap()))
}

#[derive(Debug, Deserialize)]
pub struct StartOauthRequest {
    pub provider: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

pub async fn start_oauth(
    State(state): State<ServiceState>,
    Json(body): Json<StartOauthRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let started = state
        .auth
        .start_oauth_auth(&body.provider, body.email, body.name)
        .await?;
    Ok(Json(serde_json::json!({
        "session_id": started.session.id,
        "state_token": started.state_token,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyOauthRequest {
    pub session_id: String,
    pub state_token: String,
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
}

pub async fn verify_oauth(
    State(state): State<ServiceState>,
    Json(body): Json<VerifyOauthRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .auth
        .verify_oauth_auth(
            &body.session_id,
            &body.state_token,
            &body.provider,
            &body.subject,
            body.email,
        )
        .await?;
    Ok(Json(serde_json::to_value(session).unwrap()))
}

#[derive(Debug, Deserialize)]
pub struct StartRecoveryRequest {
    pub email: String,
}

pub async fn start_recovery(
    State(state): State<ServiceState>,
    Json(body): Json<StartRecoveryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = state.auth.start_recovery(&body.email).await?;
    Ok(Json(serde_json::json!({ "recovery_token": token })))
}

#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    pub token: String,
}

pub async fn recover(
    State(state): State<ServiceState>,
    Json(body): Json<RecoverRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.auth.recover_with_token(&body.token).await?;
    Ok(Json(serde_json::to_value(session).unwrap()))
}
