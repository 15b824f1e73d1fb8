//! Fiat payment provider: manual-capture payment intents on a Stripe-shaped
//! gateway, with on-chain micro-units converted to USD cents at the
//! USDC-equivalent rate (1 cent = 10,000 micro-units).

use async_trait::async_trait;
use ecoretire_core::error::CoreError;
use ecoretire_core::money::micro_to_cents_ceil;
use ecoretire_core::payment::{Authorization, AuthorizationStatus, PaymentProvider, Receipt};
use serde::Deserialize;
use std::collections::BTreeMap;

const USDC_EQUIVALENT_DENOM: &str = "uusdc";

pub struct FiatProvider {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    payment_method_id: String,
}

impl FiatProvider {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        payment_method_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            secret_key: secret_key.into(),
            payment_method_id: payment_method_id.into(),
        }
    }
}

#[derive(Deserialize)]
struct IntentWire {
    id: String,
    status: String,
}

#[async_trait]
impl PaymentProvider for FiatProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn authorize(
        &self,
        amount_micro: u128,
        denom: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Authorization, CoreError> {
        if denom != USDC_EQUIVALENT_DENOM {
            return Ok(Authorization {
                id: String::new(),
                status: AuthorizationStatus::Failed,
                message: Some(format!(
                    "fiat provider only supports {USDC_EQUIVALENT_DENOM}, got {denom}"
                )),
            });
        }
        let amount_cents = micro_to_cents_ceil(amount_micro);

        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), "usd".to_string()),
            ("capture_method".to_string(), "manual".to_string()),
            ("confirm".to_string(), "true".to_string()),
            ("payment_method".to_string(), self.payment_method_id.clone()),
            (
                "metadata[on_chain_amount_micro]".to_string(),
                amount_micro.to_string(),
            ),
            ("metadata[on_chain_denom]".to_string(), denom.to_string()),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|err| CoreError::GatewayUnavailable(err.to_string()))?;

        if response.status().is_server_error() {
            return Err(CoreError::GatewayUnavailable(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        let wire: IntentWire = response
            .json()
            .await
            .map_err(|err| CoreError::GatewayFatal(err.to_string()))?;

        if wire.status == "requires_capture" || wire.status == "succeeded" {
            Ok(Authorization {
                id: wire.id,
                status: AuthorizationStatus::Authorized,
                message: None,
            })
        } else {
            Ok(Authorization {
                id: wire.id,
                status: AuthorizationStatus::Failed,
                message: Some(format!("unexpected intent status: {}", wire.status)),
            })
        }
    }

    async fn capture(&self, authorization_id: &str) -> Result<Receipt, CoreError> {
        let response = self
            .client
            .post(format!(
                "{}/payment_intents/{authorization_id}/capture",
                self.base_url
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|err| CoreError::GatewayUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::GatewayFatal(format!(
                "capture returned {}",
                response.status()
            )));
        }

        Ok(Receipt {
            authorization_id: authorization_id.to_string(),
            captured_amount_micro: 0,
            denom: USDC_EQUIVALENT_DENOM.to_string(),
            metadata: BTreeMap::new(),
        })
    }

    async fn refund(&self, authorization_id: &str) -> Result<(), CoreError> {
        let response = self
            .client
            .post(format!(
                "{}/payment_intents/{authorization_id}/cancel",
                self.base_url
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|err| CoreError::GatewayUnavailable(err.to_string()))?;

        // Canceling an already-canceled intent is treated as success: refund
        // must be idempotent against that gateway response.
        if response.status().is_success() || response.status().as_u16() == 400 {
            Ok(())
        } else {
            Err(CoreError::GatewayFatal(format!(
                "cancel returned {}",
                response.status()
            )))
        }
    }
}
