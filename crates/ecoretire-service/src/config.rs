use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PaymentMode {
    Crypto,
    Stripe,
}

#[derive(Debug, Parser)]
#[command(name = "ecoretire", version, about = "Ecological credit retirement orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Run the HTTP API server (default when no subcommand is given).
    Serve(ServeArgs),
    /// Run one monthly batch retirement pass and exit. Cron-friendly.
    Batch(BatchArgs),
    /// Run one subscription sync pass and exit. Cron-friendly.
    Sync(SyncArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080", env = "ECORETIRE_LISTEN")]
    pub listen: SocketAddr,

    #[arg(long, value_enum, default_value_t = StorageModeArg::Memory, env = "ECORETIRE_STORAGE")]
    pub storage: StorageModeArg,

    #[arg(long, default_value = "data", env = "ECORETIRE_DATA_DIR")]
    pub data_dir: PathBuf,

    #[arg(long, env = "ECORETIRE_PREPAID_DATABASE_URL")]
    pub prepaid_database_url: Option<String>,

    #[arg(long, value_enum, default_value_t = PaymentMode::Crypto, env = "ECORETIRE_PAYMENT_MODE")]
    pub payment_mode: PaymentMode,

    #[arg(long, env = "ECORETIRE_LEDGER_REST_URL", default_value = "https://api.ledger.example")]
    pub ledger_rest_url: String,

    #[arg(long, env = "ECORETIRE_LEDGER_INDEXER_URL", default_value = "https://indexer.ledger.example")]
    pub ledger_indexer_url: String,

    #[arg(long, env = "ECORETIRE_NATIVE_DENOM", default_value = "uatom")]
    pub native_denom: String,

    #[arg(long, env = "ECORETIRE_BUYER_ADDRESS")]
    pub buyer_address: Option<String>,

    #[arg(long, env = "ECORETIRE_GATEWAY_URL", default_value = "https://api.stripe.com/v1")]
    pub gateway_url: String,

    #[arg(long, env = "ECORETIRE_GATEWAY_SECRET_KEY")]
    pub gateway_secret_key: Option<String>,

    #[arg(long, env = "ECORETIRE_GATEWAY_WEBHOOK_SECRET")]
    pub gateway_webhook_secret: Option<String>,

    #[arg(long, env = "ECORETIRE_MARKETPLACE_URL", default_value = "https://marketplace.example")]
    pub marketplace_url: String,

    #[arg(long, env = "ECORETIRE_EMAIL_AUTH_SECRET", default_value = "dev-email-secret")]
    pub email_auth_secret: String,

    #[arg(long, env = "ECORETIRE_OAUTH_AUTH_SECRET", default_value = "dev-oauth-secret")]
    pub oauth_auth_secret: String,

    #[arg(long, env = "ECORETIRE_RECOVERY_SECRET", default_value = "dev-recovery-secret")]
    pub recovery_secret: String,

    #[arg(long, value_delimiter = ',', env = "ECORETIRE_OAUTH_PROVIDERS", default_value = "google")]
    pub oauth_providers: Vec<String>,

    #[arg(long, default_value_t = 60, env = "ECORETIRE_RATE_LIMIT_PER_MINUTE")]
    pub rate_limit_per_minute: u32,

    #[arg(long, default_value_t = 100, env = "ECORETIRE_FEE_BPS")]
    pub fee_bps: u32,

    #[arg(long, value_delimiter = ',', env = "ECORETIRE_API_KEYS", default_value = "dev-key")]
    pub api_keys: Vec<String>,
}

/// Distinguishes from `ecoretire_core::store::StorageConfig`, which is the
/// richer runtime type this CLI enum resolves into.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StorageModeArg {
    Memory,
    JsonFile,
}

#[derive(Debug, Parser, Clone)]
pub struct BatchArgs {
    #[arg(long)]
    pub month: String,

    #[arg(long)]
    pub credit_type: Option<String>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    pub preflight_only: bool,

    #[arg(long, default_value_t = false)]
    pub force: bool,

    #[arg(long, default_value = "Monthly ecological credit retirement")]
    pub reason: String,

    #[arg(long, value_enum, default_value_t = StorageModeArg::Memory, env = "ECORETIRE_STORAGE")]
    pub storage: StorageModeArg,

    #[arg(long, default_value = "data", env = "ECORETIRE_DATA_DIR")]
    pub data_dir: PathBuf,

    #[arg(long, env = "ECORETIRE_LEDGER_REST_URL", default_value = "https://api.ledger.example")]
    pub ledger_rest_url: String,

    #[arg(long, env = "ECORETIRE_LEDGER_INDEXER_URL", default_value = "https://indexer.ledger.example")]
    pub ledger_indexer_url: String,

    #[arg(long, env = "ECORETIRE_NATIVE_DENOM", default_value = "uatom")]
    pub native_denom: String,

    #[arg(long, env = "ECORETIRE_BUYER_ADDRESS")]
    pub buyer_address: Option<String>,

    #[arg(long, value_enum, default_value_t = PaymentMode::Crypto, env = "ECORETIRE_PAYMENT_MODE")]
    pub payment_mode: PaymentMode,

    #[arg(long, env = "ECORETIRE_GATEWAY_URL", default_value = "https://api.stripe.com/v1")]
    pub gateway_url: String,

    #[arg(long, env = "ECORETIRE_GATEWAY_SECRET_KEY")]
    pub gateway_secret_key: Option<String>,

    #[arg(long, env = "ECORETIRE_MARKETPLACE_URL", default_value = "https://marketplace.example")]
    pub marketplace_url: String,

    #[arg(long, default_value_t = 100, env = "ECORETIRE_FEE_BPS")]
    pub fee_bps: u32,
}

#[derive(Debug, Parser, Clone)]
pub struct SyncArgs {
    #[arg(long)]
    pub customer_identifier: Option<String>,

    #[arg(long, default_value_t = false)]
    pub all_customers: bool,

    #[arg(long)]
    pub month: Option<String>,

    #[arg(long)]
    pub max_pages: Option<u32>,

    #[arg(long, value_enum, default_value_t = StorageModeArg::Memory, env = "ECORETIRE_STORAGE")]
    pub storage: StorageModeArg,

    #[arg(long, default_value = "data", env = "ECORETIRE_DATA_DIR")]
    pub data_dir: PathBuf,

    #[arg(long, env = "ECORETIRE_GATEWAY_URL", default_value = "https://api.stripe.com/v1")]
    pub gateway_url: String,

    #[arg(long, env = "ECORETIRE_GATEWAY_SECRET_KEY")]
    pub gateway_secret_key: Option<String>,
}

pub fn resolve_storage(mode: StorageModeArg, data_dir: &PathBuf, file_name: &str) -> ecoretire_core::store::StorageConfig {
    match mode {
        StorageModeArg::Memory => ecoretire_core::store::StorageConfig::Memory,
        StorageModeArg::JsonFile => {
            ecoretire_core::store::StorageConfig::json_file(data_dir.join(file_name))
        }
    }
}
