//! ZBD charges API adapter.
//!
//! ZBD identifies invoices by charge id, not by payment hash. The adapter
//! derives its own payment hash when the charge is created and records the
//! hash → charge id mapping, first in an LRU cache and then durably in the
//! [`ChargeMappingStore`]. Verification resolves the charge id in the same
//! order before querying the charge status.

use crate::config::ZbdConfig;
use crate::error::{Error, Result};
use crate::provider::{
    extract_identity, http_client, tracking_id, ChargeCache, Invoice, PaymentProvider,
    PaymentVerification, WebhookSettlement,
};
use crate::short_id;
use crate::storage::ChargeMappingStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Charge lifetime requested from ZBD, in seconds.
const CHARGE_EXPIRY_SECS: u32 = 3600;

/// Charge status reported once the invoice is paid.
const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeRequest<'a> {
    amount: String,
    description: &'a str,
    internal_id: String,
    expires_in: u32,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    data: ChargeData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeData {
    id: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    invoice: Option<ChargeInvoice>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    confirmed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeInvoice {
    request: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    id: String,
    status: String,
    amount: String,
    #[serde(default)]
    description: String,
}

/// Payment provider backed by the ZBD charges API.
pub struct ZbdProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    lightning_address: String,
    cache: ChargeCache,
    mappings: Arc<ChargeMappingStore>,
}

impl ZbdProvider {
    /// Create a provider from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key or lightning address is missing.
    pub fn new(
        config: &ZbdConfig,
        mappings: Arc<ChargeMappingStore>,
        timeout: Duration,
    ) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("ZBD API key is required".to_string()));
        }
        if config.lightning_address.is_empty() {
            return Err(Error::Config("lightning address is required".to_string()));
        }

        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            lightning_address: config.lightning_address.clone(),
            cache: ChargeCache::new(),
            mappings,
        })
    }

    /// Charge id for `payment_hash`, from the cache or the durable store.
    fn resolve_charge(&self, payment_hash: &str) -> Option<String> {
        if let Some(charge_id) = self.cache.get(payment_hash) {
            return Some(charge_id);
        }
        let charge_id = self.mappings.get(payment_hash)?;
        self.cache.insert(payment_hash, &charge_id);
        Some(charge_id)
    }

    /// Payment hash issued for `charge_id`, so webhook and verification
    /// grants share one key. Unknown charges fall back to the charge id.
    fn hash_for_charge(&self, charge_id: &str) -> String {
        self.cache
            .hash_for_charge(charge_id)
            .or_else(|| self.mappings.hash_for_charge(charge_id))
            .unwrap_or_else(|| {
                warn!("No payment hash recorded for ZBD charge {charge_id}, keying grant by charge id");
                charge_id.to_string()
            })
    }

    /// Cache statistics for the charge lookup layer.
    #[must_use]
    pub fn cache_stats(&self) -> crate::provider::CacheStats {
        self.cache.stats()
    }
}

/// Payment hash derived from the payment request, identity and issue time.
fn derive_payment_hash(payment_request: &str, identity: &str) -> String {
    let data = format!("{payment_request}:{identity}:{}", Utc::now().timestamp());
    hex::encode(Sha256::digest(data))
}

fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn api_error(status: StatusCode, body: &str) -> Error {
    Error::Provider(format!("ZBD API error: {} - {body}", status.as_u16()))
}

#[async_trait]
impl PaymentProvider for ZbdProvider {
    async fn create_invoice(
        &self,
        amount_msat: u64,
        description: &str,
        identity: &str,
    ) -> Result<Invoice> {
        let request = ChargeRequest {
            amount: amount_msat.to_string(),
            description,
            internal_id: tracking_id(identity),
            expires_in: CHARGE_EXPIRY_SECS,
        };

        let response = self
            .client
            .post(format!("{}/v0/charges", self.base_url))
            .header("apikey", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let charge = serde_json::from_str::<ChargeResponse>(&body)
            .map_err(|e| Error::Provider(format!("unexpected ZBD response: {e}")))?
            .data;

        let payment_request = charge
            .invoice
            .map(|invoice| invoice.request)
            .filter(|request| !request.is_empty())
            .ok_or_else(|| Error::Provider("ZBD charge has no invoice".to_string()))?;

        let amount = charge.amount.parse().unwrap_or_else(|_| {
            debug!("ZBD charge amount {:?} unparsable, using requested", charge.amount);
            amount_msat
        });

        let payment_hash = derive_payment_hash(&payment_request, identity);
        self.cache.insert(&payment_hash, &charge.id);
        if let Err(e) = self.mappings.store(&payment_hash, &charge.id) {
            warn!(
                "Charge mapping for {}... not persisted: {e}",
                short_id(&payment_hash)
            );
        }

        info!(
            "Created ZBD charge {} for {}...",
            charge.id,
            short_id(identity)
        );

        Ok(Invoice {
            payment_request,
            payment_hash,
            amount,
            description: if charge.description.is_empty() {
                description.to_string()
            } else {
                charge.description
            },
            expires_at: parse_rfc3339(charge.expires_at.as_deref()),
        })
    }

    async fn verify_payment(&self, payment_hash: &str) -> Result<PaymentVerification> {
        let charge_id = self
            .resolve_charge(payment_hash)
            .ok_or_else(|| Error::MappingNotFound(payment_hash.to_string()))?;

        debug!(
            "Verifying ZBD payment {}... via charge {charge_id}",
            short_id(payment_hash)
        );

        let response = self
            .client
            .get(format!("{}/v0/charges/{charge_id}", self.base_url))
            .header("apikey", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(PaymentVerification::unpaid(payment_hash));
        }
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let charge = serde_json::from_str::<ChargeResponse>(&body)
            .map_err(|e| Error::Provider(format!("unexpected ZBD response: {e}")))?
            .data;

        let paid = charge.status == STATUS_COMPLETED;
        debug!(
            "ZBD charge {charge_id} status {} (paid={paid})",
            charge.status
        );

        Ok(PaymentVerification {
            paid,
            payment_hash: payment_hash.to_string(),
            amount: charge.amount.parse().unwrap_or(0),
            paid_at: if paid {
                parse_rfc3339(charge.confirmed_at.as_deref())
            } else {
                None
            },
        })
    }

    fn name(&self) -> &str {
        "ZBD"
    }

    fn receiving_address(&self) -> Option<&str> {
        Some(&self.lightning_address)
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<Option<WebhookSettlement>> {
        let payload: WebhookPayload =
            serde_json::from_slice(payload).map_err(|e| Error::Webhook(e.to_string()))?;

        info!(
            "Received ZBD webhook: id={} status={}",
            payload.id, payload.status
        );

        if payload.status != STATUS_COMPLETED && payload.status != "settled" {
            debug!("ZBD charge {} not settled yet", payload.id);
            return Ok(None);
        }

        let identity = extract_identity(&payload.description)
            .ok_or_else(|| Error::Webhook("could not extract pubkey from description".to_string()))?;

        let amount = payload
            .amount
            .parse()
            .map_err(|e| Error::Webhook(format!("invalid amount {:?}: {e}", payload.amount)))?;

        Ok(Some(WebhookSettlement {
            identity: identity.to_string(),
            payment_hash: self.hash_for_charge(&payload.id),
            amount,
        }))
    }

    fn forget_charges(&self, payment_hashes: &[String]) {
        for hash in payment_hashes {
            self.cache.remove(hash);
        }
    }
}
