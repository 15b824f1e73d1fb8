//! Receives "checkout completed" events from the payment gateway.
//!
//! Signature verification is mandatory whenever a webhook secret is
//! configured. Replays are no-ops: the recorded contribution's
//! `external_event_id` is keyed on the event id.

use crate::error::ApiError;
use crate::ServiceState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use ecoretire_core::pool::RecordContributionInput;
use ecoretire_core::types::ContributionSource;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
pub struct CheckoutCompletedEvent {
    pub id: String,
    pub amount_total: i64,
    pub customer_email: String,
    pub customer: Option<String>,
}

fn verify_signature(secret: &str, header: &str, body: &[u8]) -> bool {
    // Header shape: "t=<timestamp>,v1=<hex hmac of '<timestamp>.<body>'>"
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        if let Some(value) = part.strip_prefix("t=") {
            timestamp = Some(value);
        } else if let Some(value) = part.strip_prefix("v1=") {
            signature = Some(value);
        }
    }
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

pub async fn receive_checkout_completed(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(secret) = &state.config.gateway_webhook_secret {
        let signature_header = headers
            .get("Stripe-Signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing webhook signature"))?;
        if !verify_signature(secret, signature_header, &body) {
            return Err(ApiError::unauthorized("webhook signature verification failed"));
        }
    }

    let event: CheckoutCompletedEvent =
        serde_json::from_slice(&body).map_err(|err| ApiError::bad_request(err.to_string()))?;

    if let Some(prepaid) = &state.prepaid {
        prepaid
            .credit_topup(
                &event.customer_email,
                event.amount_total,
                &event.id,
                event.customer.as_deref(),
            )
            .await?;
    }

    let result = state
        .pool
        .record_contribution(RecordContributionInput {
            user_id: None,
            customer_id: event.customer.clone(),
            email: Some(event.customer_email.clone()),
            amount_usd_cents: event.amount_total,
            contributed_at: Utc::now(),
            source: ContributionSource::OneOff,
            external_event_id: Some(format!("stripe_checkout:{}", event.id)),
            tier_id: None,
            metadata: BTreeMap::new(),
        })
        .await?;

    Ok(Json(serde_json::json!({ "duplicate": result.duplicate })))
}
