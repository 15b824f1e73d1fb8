//! Read surface against the fiat payment gateway used to ingest subscription invoices.

use crate::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct PaidInvoice {
    pub id: String,
    pub customer_id: String,
    pub customer_email: Option<String>,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub paid_at: DateTime<Utc>,
    pub price_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvoicePage {
    pub invoices: Vec<PaidInvoice>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Fetches one page of paid invoices for a single customer (by id or email).
    async fn list_invoices_for_customer(
        &self,
        customer_identifier: &str,
        cursor: Option<&str>,
    ) -> Result<InvoicePage, CoreError>;

    /// Fetches one page of paid invoices across all customers.
    async fn list_all_invoices(&self, cursor: Option<&str>) -> Result<InvoicePage, CoreError>;
}
