//! Administrative operations over the gate.
//!
//! Transport-free handlers for manual verification, provider webhooks and
//! statistics. Bodies are JSON; callers map errors onto their own protocol,
//! with [`http_status`] as the suggested HTTP mapping.

use crate::error::{Error, Result};
use crate::gate::{AccessGate, GateStats};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body of a manual verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Payment hash returned with the invoice.
    pub payment_hash: String,
    /// Identity to grant access to.
    pub pubkey: String,
}

/// Length of a hex-encoded payment hash.
const PAYMENT_HASH_HEX_LEN: usize = 64;

impl VerifyRequest {
    fn validate(&self) -> Result<()> {
        if self.payment_hash.trim().is_empty() {
            return Err(Error::InvalidRequest("payment_hash is required".to_string()));
        }
        if self.payment_hash.len() != PAYMENT_HASH_HEX_LEN
            || !self.payment_hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Error::InvalidRequest(
                "payment_hash must be 64 hex characters".to_string(),
            ));
        }
        if self.pubkey.trim().is_empty() {
            return Err(Error::InvalidRequest("pubkey is required".to_string()));
        }
        Ok(())
    }
}

/// Result of a manual verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Whether the provider reports the payment settled.
    pub paid: bool,
    /// Payment hash checked.
    pub payment_hash: String,
    /// Amount received in millisatoshis.
    pub amount: u64,
    /// Present when the payment is settled: whether the identity now has access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_granted: Option<bool>,
}

/// Verify a payment and grant access.
///
/// # Errors
///
/// [`Error::InvalidRequest`] for a malformed body, otherwise the errors of
/// [`AccessGate::verify_payment`].
pub async fn verify(gate: &AccessGate, body: &[u8]) -> Result<VerifyResponse> {
    let request: VerifyRequest =
        serde_json::from_slice(body).map_err(|e| Error::InvalidRequest(e.to_string()))?;
    request.validate()?;

    let verification = gate
        .verify_payment(&request.payment_hash, &request.pubkey)
        .await?;

    Ok(VerifyResponse {
        paid: verification.paid,
        payment_hash: verification.payment_hash,
        amount: verification.amount,
        access_granted: verification
            .paid
            .then(|| gate.has_access(&request.pubkey)),
    })
}

/// Apply a provider webhook; answers `"OK"` once handled.
///
/// # Errors
///
/// [`Error::Webhook`] or [`Error::WebhookUnsupported`] for payloads that
/// cannot be decoded, and grant persistence errors.
pub fn webhook(gate: &AccessGate, body: &[u8]) -> Result<&'static str> {
    if let Some(record) = gate.handle_webhook(body)? {
        info!(
            "Webhook grant recorded for {}...",
            crate::short_id(&record.pubkey)
        );
    }
    Ok("OK")
}

/// Current gate statistics.
#[must_use]
pub fn stats(gate: &AccessGate) -> GateStats {
    gate.stats()
}

/// HTTP status code for an administrative error.
#[must_use]
pub fn http_status(error: &Error) -> u16 {
    match error {
        Error::InvalidRequest(_)
        | Error::Webhook(_)
        | Error::WebhookUnsupported(_)
        | Error::PaymentAlreadyClaimed { .. } => 400,
        Error::MappingNotFound(_) => 404,
        _ => 500,
    }
}
