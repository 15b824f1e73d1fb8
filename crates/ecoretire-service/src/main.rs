use clap::Parser;
use ecoretire_service::config::{resolve_storage, BatchArgs, Cli, Command, ServeArgs, SyncArgs};
use ecoretire_service::{ServiceConfig, ServiceState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or_else(|| Command::Serve(default_serve_args())) {
        Command::Serve(args) => serve(args).await,
        Command::Batch(args) => run_batch(args).await,
        Command::Sync(args) => run_sync(args).await,
    }
}

fn default_serve_args() -> ServeArgs {
    ServeArgs::parse_from(["ecoretire-serve"])
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = ServiceConfig {
        pool_storage: resolve_storage(args.storage, &args.data_dir, "pool.json"),
        batch_storage: resolve_storage(args.storage, &args.data_dir, "batch.json"),
        auth_storage: resolve_storage(args.storage, &args.data_dir, "auth.json"),
        prepaid_database_url: args.prepaid_database_url,
        payment_mode: args.payment_mode,
        ledger_rest_url: args.ledger_rest_url,
        ledger_indexer_url: args.ledger_indexer_url,
        native_denom: args.native_denom,
        buyer_address: args.buyer_address,
        gateway_url: args.gateway_url,
        gateway_secret_key: args.gateway_secret_key,
        gateway_webhook_secret: args.gateway_webhook_secret,
        marketplace_url: args.marketplace_url,
        email_auth_secret: args.email_auth_secret,
        oauth_auth_secret: args.oauth_auth_secret,
        recovery_secret: args.recovery_secret,
        oauth_providers: args.oauth_providers,
        rate_limit_per_minute: args.rate_limit_per_minute,
        fee_bps: args.fee_bps,
        api_keys: args.api_keys,
    };

    let state = ServiceState::bootstrap(config).await?;
    let router = ecoretire_service::build_router(state);

    info!(listen = %args.listen, "starting ecoretire service");
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn run_batch(args: BatchArgs) -> anyhow::Result<()> {
    let config = ServiceConfig {
        pool_storage: resolve_storage(args.storage, &args.data_dir, "pool.json"),
        batch_storage: resolve_storage(args.storage, &args.data_dir, "batch.json"),
        auth_storage: ecoretire_core::store::StorageConfig::Memory,
        prepaid_database_url: None,
        payment_mode: args.payment_mode,
        ledger_rest_url: args.ledger_rest_url,
        ledger_indexer_url: args.ledger_indexer_url,
        native_denom: args.native_denom,
        buyer_address: args.buyer_address,
        gateway_url: args.gateway_url,
        gateway_secret_key: args.gateway_secret_key,
        gateway_webhook_secret: None,
        marketplace_url: args.marketplace_url,
        email_auth_secret: "unused".to_string(),
        oauth_auth_secret: "unused".to_string(),
        recovery_secret: "unused".to_string(),
        oauth_providers: vec![],
        rate_limit_per_minute: 0,
        fee_bps: args.fee_bps,
        api_keys: vec![],
    };

    let state = ServiceState::bootstrap(config).await?;
    let execution = state
        .batch_driver
        .run(ecoretire_core::batch::BatchRequest {
            month: args.month,
            credit_type: args.credit_type,
            dry_run: args.dry_run,
            reason: args.reason,
            preflight_only: args.preflight_only,
            force: args.force,
            fee_bps: args.fee_bps,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&execution)?);
    Ok(())
}

async fn run_sync(args: SyncArgs) -> anyhow::Result<()> {
    let config = ServiceConfig {
        pool_storage: resolve_storage(args.storage, &args.data_dir, "pool.json"),
        batch_storage: ecoretire_core::store::StorageConfig::Memory,
        auth_storage: ecoretire_core::store::StorageConfig::Memory,
        prepaid_database_url: None,
        payment_mode: ecoretire_service::config::PaymentMode::Crypto,
        ledger_rest_url: "https://api.ledger.example".to_string(),
        ledger_indexer_url: "https://indexer.ledger.example".to_string(),
        native_denom: "uatom".to_string(),
        buyer_address: None,
        gateway_url: args.gateway_url,
        gateway_secret_key: args.gateway_secret_key,
        gateway_webhook_secret: None,
        marketplace_url: "https://marketplace.example".to_string(),
        email_auth_secret: "unused".to_string(),
        oauth_auth_secret: "unused".to_string(),
        recovery_secret: "unused".to_string(),
        oauth_providers: vec![],
        rate_limit_per_minute: 0,
        fee_bps: 0,
        api_keys: vec![],
    };

    let state = ServiceState::bootstrap(config).await?;
    let sync = ecoretire_core::sync::SubscriptionSync::new(state.gateway.clone(), state.pool.clone());
    let result = sync
        .run(ecoretire_core::sync::SyncRequest {
            customer_identifier: args.customer_identifier,
            all_customers: args.all_customers,
            month_filter: args.month,
            max_pages: args.max_pages,
            price_tier_table: Default::default(),
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "synced": result.synced,
        "duplicates": result.duplicates,
        "skipped": result.skipped,
        "truncated": result.truncated,
    }))?);
    Ok(())
}
