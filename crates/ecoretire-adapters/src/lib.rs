pub mod gateway_http;
pub mod ledger_http;
pub mod mock_ledger;
pub mod payment_fiat;
pub mod payment_native;

pub use gateway_http::HttpGatewayClient;
pub use ledger_http::HttpLedgerClient;
pub use mock_ledger::MockLedgerClient;
pub use payment_fiat::FiatProvider;
pub use payment_native::NativeTokenProvider;
