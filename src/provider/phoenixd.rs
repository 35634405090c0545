//! phoenixd adapter.
//!
//! phoenixd exposes incoming payments by payment hash, so verification is a
//! single status query with no secondary lookup.

use crate::error::{Error, Result};
use crate::provider::{http_client, tracking_id, Invoice, PaymentProvider, PaymentVerification};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Lifetime phoenixd gives invoices when none is requested.
const DEFAULT_INVOICE_EXPIRY_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvoiceRequest<'a> {
    amount_sat: u64,
    description: &'a str,
    external_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvoiceResponse {
    payment_hash: String,
    serialized: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingPaymentResponse {
    #[serde(default)]
    is_paid: bool,
    #[serde(default)]
    received_sat: u64,
    #[serde(default)]
    completed_at: Option<i64>,
}

/// Payment provider backed by a phoenixd daemon.
pub struct PhoenixdProvider {
    client: reqwest::Client,
    base_url: String,
    password: String,
}

impl PhoenixdProvider {
    /// Create a provider talking to the phoenixd HTTP API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the password is empty.
    pub fn new(base_url: &str, password: &str, timeout: Duration) -> Result<Self> {
        if password.is_empty() {
            return Err(Error::Config("phoenixd password is required".to_string()));
        }
        let base_url = if base_url.is_empty() {
            "http://localhost:9740"
        } else {
            base_url
        };

        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            password: password.to_string(),
        })
    }

    /// URL of the incoming payment `payment_hash`, escaped as one path segment.
    fn incoming_payment_url(&self, payment_hash: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid phoenixd URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("invalid phoenixd URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v1", "payments", "incoming", payment_hash]);
        Ok(url)
    }
}

/// Convert millisatoshis to whole satoshis, never below one.
fn msat_to_sat(amount_msat: u64) -> u64 {
    (amount_msat / 1000).max(1)
}

// phoenixd reports timestamps as epoch milliseconds.
fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).filter(|_| ms > 0)
}

#[async_trait]
impl PaymentProvider for PhoenixdProvider {
    async fn create_invoice(
        &self,
        amount_msat: u64,
        description: &str,
        identity: &str,
    ) -> Result<Invoice> {
        let request = CreateInvoiceRequest {
            amount_sat: msat_to_sat(amount_msat),
            description,
            external_id: tracking_id(identity),
        };

        let response = self
            .client
            .post(format!("{}/v1/createinvoice", self.base_url))
            .basic_auth("", Some(&self.password))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Provider(format!(
                "phoenixd API error: {} - {body}",
                status.as_u16()
            )));
        }

        let parsed: CreateInvoiceResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Provider(format!("unexpected phoenixd response: {e}")))?;

        let expires_at = parsed
            .expires_at
            .and_then(from_millis)
            .or_else(|| Some(Utc::now() + ChronoDuration::seconds(DEFAULT_INVOICE_EXPIRY_SECS)));

        info!(
            "Created phoenixd invoice {}... for {}...",
            crate::short_id(&parsed.payment_hash),
            crate::short_id(identity)
        );

        Ok(Invoice {
            payment_request: parsed.serialized,
            payment_hash: parsed.payment_hash,
            amount: amount_msat,
            description: parsed
                .description
                .unwrap_or_else(|| description.to_string()),
            expires_at,
        })
    }

    async fn verify_payment(&self, payment_hash: &str) -> Result<PaymentVerification> {
        let response = self
            .client
            .get(self.incoming_payment_url(payment_hash)?)
            .basic_auth("", Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            debug!(
                "phoenixd has no payment {}... yet",
                crate::short_id(payment_hash)
            );
            return Ok(PaymentVerification::unpaid(payment_hash));
        }
        if !status.is_success() {
            return Err(Error::Provider(format!(
                "phoenixd API error: {} - {body}",
                status.as_u16()
            )));
        }

        let parsed: IncomingPaymentResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Provider(format!("unexpected phoenixd response: {e}")))?;

        Ok(PaymentVerification {
            paid: parsed.is_paid,
            payment_hash: payment_hash.to_string(),
            amount: parsed.received_sat.saturating_mul(1000),
            paid_at: parsed.completed_at.and_then(from_millis),
        })
    }

    fn name(&self) -> &str {
        "phoenixd"
    }
}
