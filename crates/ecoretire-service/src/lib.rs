pub mod auth_middleware;
pub mod config;
pub mod error;
pub mod prepaid;
pub mod ratelimit;
pub mod routes;
pub mod webhook;

use ecoretire_adapters::{FiatProvider, HttpGatewayClient, HttpLedgerClient, NativeTokenProvider};
use ecoretire_core::auth::{AuthService, AuthStore, JsonFileAuthStore};
use ecoretire_core::batch::{BatchExecutionStore, BatchDriver, JsonFileBatchExecutionStore};
use ecoretire_core::gateway::GatewayClient;
use ecoretire_core::ledger::LedgerClient;
use ecoretire_core::payment::PaymentProvider;
use ecoretire_core::pool::{JsonFilePoolStore, PoolStore};
use ecoretire_core::retirement::{PrepaidLedger, RetirementService};
use ecoretire_core::store::StorageConfig;
use prepaid::PostgresPrepaidLedger;
use ratelimit::RateLimiter;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub pool_storage: StorageConfig,
    pub batch_storage: StorageConfig,
    pub auth_storage: StorageConfig,
    pub prepaid_database_url: Option<String>,
    pub payment_mode: config::PaymentMode,
    pub ledger_rest_url: String,
    pub ledger_indexer_url: String,
    pub native_denom: String,
    pub buyer_address: Option<String>,
    pub gateway_url: String,
    pub gateway_secret_key: Option<String>,
    pub gateway_webhook_secret: Option<String>,
    pub marketplace_url: String,
    pub email_auth_secret: String,
    pub oauth_auth_secret: String,
    pub recovery_secret: String,
    pub oauth_providers: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub fee_bps: u32,
    pub api_keys: Vec<String>,
}

#[derive(Clone)]
pub struct ServiceState {
    pub config: Arc<ServiceConfig>,
    pub pool: Arc<dyn PoolStore>,
    pub batch_store: Arc<dyn BatchExecutionStore>,
    pub auth: Arc<AuthService>,
    pub ledger: Arc<dyn LedgerClient>,
    pub gateway: Arc<dyn GatewayClient>,
    pub payment: Arc<dyn PaymentProvider>,
    pub retirement: Arc<RetirementService>,
    pub batch_driver: Arc<BatchDriver>,
    pub prepaid: Option<Arc<PostgresPrepaidLedger>>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let pool: Arc<dyn PoolStore> = Arc::new(JsonFilePoolStore::from_config(&config.pool_storage)?);
        let batch_store: Arc<dyn BatchExecutionStore> =
            Arc::new(JsonFileBatchExecutionStore::from_config(&config.batch_storage)?);
        let auth_store: Arc<dyn AuthStore> = Arc::new(JsonFileAuthStore::from_config(&config.auth_storage)?);
        let auth = Arc::new(AuthService::new(
            auth_store,
            config.email_auth_secret.clone(),
            config.oauth_auth_secret.clone(),
            config.recovery_secret.clone(),
            config.oauth_providers.clone(),
        ));

        let buyer_address = config.buyer_address.clone().unwrap_or_default();
        let ledger: Arc<dyn LedgerClient> = Arc::new(HttpLedgerClient::new(
            config.ledger_rest_url.clone(),
            config.ledger_indexer_url.clone(),
            buyer_address.clone(),
            config.native_denom.clone(),
        ));

        let gateway: Arc<dyn GatewayClient> = Arc::new(HttpGatewayClient::new(
            config.gateway_url.clone(),
            config.gateway_secret_key.clone().unwrap_or_default(),
        ));

        let payment: Arc<dyn PaymentProvider> = match config.payment_mode {
            config::PaymentMode::Crypto => Arc::new(NativeTokenProvider::new(ledger.clone())),
            config::PaymentMode::Stripe => Arc::new(FiatProvider::new(
                config.gateway_url.clone(),
                config.gateway_secret_key.clone().unwrap_or_default(),
                "pm_default".to_string(),
            )),
        };

        let prepaid = match &config.prepaid_database_url {
            Some(url) => Some(Arc::new(PostgresPrepaidLedger::connect(url, 5).await?)),
            None => None,
        };
        let prepaid_trait_object: Option<Arc<dyn PrepaidLedger>> = prepaid
            .clone()
            .map(|p| p as Arc<dyn PrepaidLedger>);

        let wallet_configured = !buyer_address.is_empty();
        let retirement = Arc::new(RetirementService::new(
            ledger.clone(),
            payment.clone(),
            prepaid_trait_object,
            config.marketplace_url.clone(),
            wallet_configured,
        ));

        let batch_driver = Arc::new(BatchDriver::new(
            pool.clone(),
            batch_store.clone(),
            ledger.clone(),
            retirement.clone(),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));

        Ok(Self {
            config,
            pool,
            batch_store,
            auth,
            ledger,
            gateway,
            payment,
            retirement,
            batch_driver,
            prepaid,
            rate_limiter,
        })
    }
}

pub fn build_router(state: ServiceState) -> axum::Router {
    routes::build_router(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            pool_storage: StorageConfig::Memory,
            batch_storage: StorageConfig::Memory,
            auth_storage: StorageConfig::Memory,
            prepaid_database_url: None,
            payment_mode: config::PaymentMode::Crypto,
            ledger_rest_url: "https://api.ledger.example".to_string(),
            ledger_indexer_url: "https://indexer.ledger.example".to_string(),
            native_denom: "uatom".to_string(),
            buyer_address: None,
            gateway_url: "https://api.stripe.example".to_string(),
            gateway_secret_key: None,
            gateway_webhook_secret: None,
            marketplace_url: "https://marketplace.example".to_string(),
            email_auth_secret: "test-email-secret".to_string(),
            oauth_auth_secret: "test-oauth-secret".to_string(),
            recovery_secret: "test-recovery-secret".to_string(),
            oauth_providers: vec!["google".to_string()],
            rate_limit_per_minute: 60,
            fee_bps: 100,
            api_keys: vec!["test-key".to_string()],
        }
    }

    #[tokio::test]
    async fn health_check_requires_no_auth() {
        let state = ServiceState::bootstrap(test_config()).await.unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_rejects_missing_bearer_token() {
        let state = ServiceState::bootstrap(test_config()).await.unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/pool/monthly/2026-03")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn contribution_recorded_with_valid_bearer_token() {
        let state = ServiceState::bootstrap(test_config()).await.unwrap();
        let app = build_router(state);

        let payload = serde_json::json!({
            "user_id": "user-1",
            "amount_usd_cents": 500,
            "source": "one_off",
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/contributions")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer test-key")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["duplicate"], false);
    }
}
