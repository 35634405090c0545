//! Lightning payment providers.
//!
//! Every backend implements [`PaymentProvider`]. The gate talks only to the
//! trait; which adapter sits behind it is decided once, from configuration.
//!
//! ```text
//!                  ┌────────────────────┐
//!                  │  PaymentProvider   │
//!                  └─────────┬──────────┘
//!             ┌──────────────┴──────────────┐
//!             ▼                             ▼
//!   PhoenixdProvider                  ZbdProvider
//!   (query by payment hash)           (hash → charge id: LRU cache,
//!                                      then ChargeMappingStore)
//! ```

mod cache;
mod phoenixd;
mod zbd;

pub use cache::{CacheStats, ChargeCache};
pub use phoenixd::PhoenixdProvider;
pub use zbd::ZbdProvider;

use crate::config::GateConfig;
use crate::error::{Error, Result};
use crate::storage::ChargeMappingStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Marker preceding the identity in invoice descriptions.
pub const IDENTITY_MARKER: &str = "pubkey:";

/// A payment request issued by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// BOLT11 payment request handed to the actor verbatim.
    pub payment_request: String,
    /// Identifier used to verify the payment later.
    pub payment_hash: String,
    /// Amount in millisatoshis.
    pub amount: u64,
    /// Invoice description.
    pub description: String,
    /// When the invoice stops being payable.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a settlement query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    /// Whether the provider reports the invoice as settled.
    pub paid: bool,
    /// Payment hash that was queried.
    pub payment_hash: String,
    /// Amount confirmed in millisatoshis.
    pub amount: u64,
    /// Settlement time, if settled.
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentVerification {
    /// A definite "not paid" result.
    #[must_use]
    pub fn unpaid(payment_hash: &str) -> Self {
        Self {
            paid: false,
            payment_hash: payment_hash.to_string(),
            amount: 0,
            paid_at: None,
        }
    }
}

/// A settlement pushed by a provider webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSettlement {
    /// Identity recovered from the invoice description.
    pub identity: String,
    /// Reference recorded as the grant's payment hash.
    pub payment_hash: String,
    /// Amount settled in millisatoshis.
    pub amount: u64,
}

/// A Lightning payment backend.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Issue an invoice for `amount_msat` on behalf of `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] if the backend is unreachable or rejects the request.
    async fn create_invoice(
        &self,
        amount_msat: u64,
        description: &str,
        identity: &str,
    ) -> Result<Invoice>;

    /// Ask the backend whether `payment_hash` has been settled.
    ///
    /// An invoice the backend does not know about is reported as unpaid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] on transport failure or an unexpected
    /// response, and [`Error::MappingNotFound`] when the charge reference
    /// needed for the query is unknown.
    async fn verify_payment(&self, payment_hash: &str) -> Result<PaymentVerification>;

    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Lightning address payments are received on, when the backend has one.
    fn receiving_address(&self) -> Option<&str> {
        None
    }

    /// Drop any cached charge references for these payment hashes.
    ///
    /// Called after their durable mappings were pruned.
    fn forget_charges(&self, _payment_hashes: &[String]) {}

    /// Decode a settlement notification pushed by the backend.
    ///
    /// Returns `Ok(None)` for notifications that do not report a settlement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Webhook`] for malformed payloads and
    /// [`Error::WebhookUnsupported`] for backends without webhooks.
    fn parse_webhook(&self, _payload: &[u8]) -> Result<Option<WebhookSettlement>> {
        Err(Error::WebhookUnsupported(self.name().to_string()))
    }
}

/// Supported payment backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// ZBD charges API.
    #[default]
    Zbd,
    /// Self-hosted phoenixd.
    Phoenixd,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zbd => f.write_str("zbd"),
            Self::Phoenixd => f.write_str("phoenixd"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zbd" => Ok(Self::Zbd),
            "phoenixd" => Ok(Self::Phoenixd),
            other => Err(Error::Config(format!(
                "unsupported payment provider: {other} (supported: zbd, phoenixd)"
            ))),
        }
    }
}

/// Build the provider selected in `config`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the provider's credentials are missing.
pub fn build_provider(
    config: &GateConfig,
    mappings: Arc<ChargeMappingStore>,
) -> Result<Arc<dyn PaymentProvider>> {
    config.validate()?;
    let timeout = config.request_timeout();

    let provider: Arc<dyn PaymentProvider> = match config.provider {
        ProviderKind::Zbd => Arc::new(ZbdProvider::new(&config.zbd, mappings, timeout)?),
        ProviderKind::Phoenixd => Arc::new(PhoenixdProvider::new(
            &config.phoenixd.url,
            &config.phoenixd.password,
            timeout,
        )?),
    };
    Ok(provider)
}

/// Description embedding `identity` so webhooks can recover it.
#[must_use]
pub fn invoice_description(identity: &str) -> String {
    format!("Relay Access - {IDENTITY_MARKER}{identity}")
}

/// Recover the identity embedded by [`invoice_description`].
#[must_use]
pub fn extract_identity(description: &str) -> Option<&str> {
    let (_, rest) = description.split_once(IDENTITY_MARKER)?;
    let identity = rest.split_whitespace().next()?;
    Some(identity)
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}

/// Short tracking id derived from the identity and the current second.
pub(crate) fn tracking_id(identity: &str) -> String {
    let digest = Sha256::digest(format!("{identity}{}", Utc::now().timestamp()));
    let mut id = hex::encode(digest);
    id.truncate(16);
    id
}
