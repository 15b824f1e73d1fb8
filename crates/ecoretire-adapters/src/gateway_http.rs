//! HTTP client for the fiat payment gateway's invoice-listing endpoints,
//! used by subscription sync.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ecoretire_core::error::CoreError;
use ecoretire_core::gateway::{GatewayClient, InvoicePage, PaidInvoice};
use serde::Deserialize;

pub struct HttpGatewayClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpGatewayClient {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            secret_key: secret_key.into(),
        }
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<InvoicePage, CoreError> {
        #[derive(Deserialize)]
        struct InvoiceWire {
            id: String,
            customer: String,
            customer_email: Option<String>,
            amount_paid: i64,
            currency: String,
            status: String,
            #[serde(default)]
            status_transitions: Option<StatusTransitions>,
            lines: Option<Lines>,
        }
        #[derive(Deserialize)]
        struct StatusTransitions {
            paid_at: Option<i64>,
        }
        #[derive(Deserialize)]
        struct Lines {
            data: Vec<LineItem>,
        }
        #[derive(Deserialize)]
        struct LineItem {
            price: Option<Price>,
        }
        #[derive(Deserialize)]
        struct Price {
            id: String,
        }
        #[derive(Deserialize)]
        struct PageWire {
            data: Vec<InvoiceWire>,
            has_more: bool,
        }

        let response = self
            .client
            .get(format!("{}/invoices", self.base_url))
            .bearer_auth(&self.secret_key)
            .query(params)
            .send()
            .await
            .map_err(|err| CoreError::GatewayUnavailable(err.to_string()))?;

        if response.status().is_server_error() {
            return Err(CoreError::GatewayUnavailable(format!(
                "gateway returned {}",
                response.status()
            )));
        }
        let page: PageWire = response
            .json()
            .await
            .map_err(|err| CoreError::GatewayFatal(err.to_string()))?;

        let next_cursor = page.data.last().map(|invoice| invoice.id.clone());
        let invoices = page
            .data
            .into_iter()
            .filter(|invoice| invoice.status == "paid")
            .map(|invoice| {
                let paid_at = invoice
                    .status_transitions
                    .and_then(|t| t.paid_at)
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                    .unwrap_or_else(Utc::now);
                let price_id = invoice
                    .lines
                    .and_then(|lines| lines.data.into_iter().next())
                    .and_then(|line| line.price)
                    .map(|price| price.id);
                PaidInvoice {
                    id: invoice.id,
                    customer_id: invoice.customer,
                    customer_email: invoice.customer_email,
                    amount_paid_cents: invoice.amount_paid,
                    currency: invoice.currency,
                    paid_at,
                    price_id,
                }
            })
            .collect();

        Ok(InvoicePage {
            invoices,
            has_more: page.has_more,
            next_cursor,
        })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn list_invoices_for_customer(
        &self,
        customer_identifier: &str,
        cursor: Option<&str>,
    ) -> Result<InvoicePage, CoreError> {
        let mut params = vec![("customer".to_string(), customer_identifier.to_string())];
        if let Some(cursor) = cursor {
            params.push(("starting_after".to_string(), cursor.to_string()));
        }
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        self.fetch(&params).await
    }

    async fn list_all_invoices(&self, cursor: Option<&str>) -> Result<InvoicePage, CoreError> {
        let mut params = vec![];
        if let Some(cursor) = cursor {
            params.push(("starting_after".to_string(), cursor.to_string()));
        }
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        self.fetch(&params).await
    }
}
