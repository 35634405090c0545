//! Access coordinator.
//!
//! [`AccessGate`] owns the payment provider and both stores and is the single
//! entry point the relay and the administrative endpoints call into:
//!
//! ```text
//! inbound event from pubkey
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ AccessStore lookup  │
//! └─────────┬───────────┘
//!    ┌──────┴──────┐
//!  GRANT        NO GRANT
//!    │             │
//!    ▼             ▼
//!  Allow     create invoice ──► Block with payment request
//!                  │
//!          (later) verify payment hash / provider webhook
//!                  │
//!                  ▼
//!          grant written to AccessStore
//! ```

use crate::config::{AccessDuration, GateConfig};
use crate::error::{Error, Result};
use crate::event::{create_event_channel, GateEvent, GateEventsChannel, GateEventsSender};
use crate::provider::{
    build_provider, invoice_description, Invoice, PaymentProvider, PaymentVerification,
};
use crate::reconciler::Reconciler;
use crate::short_id;
use crate::storage::{AccessRecord, AccessStore, ChargeMappingStore, Grant};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Payload returned when an invoice could not be issued.
pub const INVOICE_FAILURE_PAYLOAD: &str = "payment required but invoice creation failed";

/// Payment request handed to an actor without access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Human-readable explanation.
    pub message: String,
    /// BOLT11 payment request.
    pub invoice: String,
    /// Amount in millisatoshis.
    pub amount: u64,
}

/// Admission decision for one inbound unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The actor has paid access.
    Allow,
    /// The actor must pay first; `payload` is handed to the relay's rejection.
    Block {
        /// JSON [`PaymentRequest`], or a generic failure message.
        payload: String,
    },
}

impl GateDecision {
    /// Whether the unit of work must be rejected.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Block { .. })
    }

    /// Rejection payload; empty when allowed.
    #[must_use]
    pub fn payload(&self) -> &str {
        match self {
            Self::Allow => "",
            Self::Block { payload } => payload,
        }
    }
}

/// Gate statistics for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateStats {
    /// Invoices handed out at the gate.
    pub payment_requests: u64,
    /// Payments that produced a durable grant.
    pub successful_payments: u64,
    /// Access records held.
    pub total_members: usize,
    /// Records currently granting access.
    pub active_members: usize,
    /// Records past expiry awaiting cleanup.
    pub expired_members: usize,
    /// Payment backend name.
    pub provider: String,
    /// Lightning address, for providers that have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lightning_address: Option<String>,
    /// Price of access in millisatoshis.
    pub payment_amount_msat: u64,
    /// Price of access in satoshis.
    pub payment_amount_sats: u64,
    /// Configured grant length.
    pub access_duration: String,
}

impl GateStats {
    /// Flatten into a JSON object keyed by field name.
    #[must_use]
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// The access coordinator.
pub struct AccessGate {
    provider: Arc<dyn PaymentProvider>,
    access: Arc<AccessStore>,
    mappings: Arc<ChargeMappingStore>,
    payment_amount_msat: u64,
    access_duration: AccessDuration,
    reject_message: String,
    payment_requests: AtomicU64,
    successful_payments: AtomicU64,
    events_tx: GateEventsSender,
}

impl AccessGate {
    /// Open both stores and build the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing credentials and an I/O or
    /// serialization error if an existing store file cannot be loaded.
    pub fn from_config(config: &GateConfig) -> Result<Self> {
        let access = Arc::new(AccessStore::open(&config.paid_access_file)?);
        let mappings = Arc::new(ChargeMappingStore::open(&config.charge_mapping_file)?);
        let provider = build_provider(config, Arc::clone(&mappings))?;
        Ok(Self::new(config, provider, access, mappings))
    }

    /// Assemble a gate from already constructed parts.
    #[must_use]
    pub fn new(
        config: &GateConfig,
        provider: Arc<dyn PaymentProvider>,
        access: Arc<AccessStore>,
        mappings: Arc<ChargeMappingStore>,
    ) -> Self {
        let (events_tx, _) = create_event_channel();

        info!(
            "Payment gate initialized with {} provider ({} msat, access {})",
            provider.name(),
            config.payment_amount_msat,
            config.access_duration
        );

        Self {
            provider,
            access,
            mappings,
            payment_amount_msat: config.payment_amount_msat,
            access_duration: config.access_duration,
            reject_message: config.reject_message.clone(),
            payment_requests: AtomicU64::new(0),
            successful_payments: AtomicU64::new(0),
            events_tx,
        }
    }

    /// Whether `identity` currently has paid access.
    #[must_use]
    pub fn has_access(&self, identity: &str) -> bool {
        self.access.has_access(identity)
    }

    /// Issue an invoice for `identity` at the configured price.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the invoice could not be created.
    pub async fn create_invoice(&self, identity: &str) -> Result<Invoice> {
        let description = invoice_description(identity);
        self.provider
            .create_invoice(self.payment_amount_msat, &description, identity)
            .await
    }

    /// Ask the provider whether `payment_hash` is settled and grant
    /// `identity` access if it is.
    ///
    /// Re-verifying a payment already granted to `identity` does not extend
    /// its access; it only retries making the grant durable.
    ///
    /// # Errors
    ///
    /// Provider errors are returned unchanged and no grant is made.
    /// [`Error::GrantNotRecorded`] means the payment is confirmed but the
    /// grant could not be written; the caller should verify again.
    pub async fn verify_payment(
        &self,
        payment_hash: &str,
        identity: &str,
    ) -> Result<PaymentVerification> {
        let verification = self.provider.verify_payment(payment_hash).await?;

        if verification.paid {
            self.grant(identity, payment_hash, verification.amount)?;
        } else {
            debug!(
                "Payment {}... not settled yet",
                short_id(payment_hash)
            );
        }

        Ok(verification)
    }

    /// Admission decision for an inbound unit of work from `identity`.
    ///
    /// Fails closed: if no invoice can be issued the actor is still blocked.
    pub async fn handle_gate_check(&self, identity: &str) -> GateDecision {
        if self.has_access(identity) {
            debug!("Allowing event from paid user {}...", short_id(identity));
            return GateDecision::Allow;
        }

        self.payment_requests.fetch_add(1, Ordering::Relaxed);
        let _ = self.events_tx.send(GateEvent::PaymentRequested {
            identity: identity.to_string(),
        });

        let invoice = match self.create_invoice(identity).await {
            Ok(invoice) => invoice,
            Err(e) => {
                warn!(
                    "Failed to create invoice for {}...: {e}",
                    short_id(identity)
                );
                return GateDecision::Block {
                    payload: INVOICE_FAILURE_PAYLOAD.to_string(),
                };
            }
        };

        let request = PaymentRequest {
            message: self.reject_message.clone(),
            invoice: invoice.payment_request,
            amount: invoice.amount,
        };
        let payload =
            serde_json::to_string(&request).unwrap_or_else(|_| INVOICE_FAILURE_PAYLOAD.to_string());

        GateDecision::Block { payload }
    }

    /// Apply a settlement pushed by the provider.
    ///
    /// Returns the grant written, or `None` when the notification does not
    /// report a settlement.
    ///
    /// # Errors
    ///
    /// [`Error::Webhook`] or [`Error::WebhookUnsupported`] for payloads the
    /// provider cannot decode, and the errors of [`Self::verify_payment`]'s
    /// grant step.
    pub fn handle_webhook(&self, payload: &[u8]) -> Result<Option<AccessRecord>> {
        let Some(settlement) = self.provider.parse_webhook(payload)? else {
            return Ok(None);
        };

        let record = self.grant(
            &settlement.identity,
            &settlement.payment_hash,
            settlement.amount,
        )?;
        info!(
            "Webhook processed: access granted for {}...",
            short_id(&settlement.identity)
        );
        Ok(Some(record))
    }

    fn grant(&self, identity: &str, payment_hash: &str, amount: u64) -> Result<AccessRecord> {
        let duration = self.access_duration.grant_length(Utc::now());

        let grant = self
            .access
            .grant_once(identity, payment_hash, amount, duration)
            .map_err(|e| match e {
                Error::Persist { .. } => Error::GrantNotRecorded {
                    payment_hash: payment_hash.to_string(),
                    source: Box::new(e),
                },
                other => other,
            })?;

        match grant {
            Grant::New(record) => {
                self.successful_payments.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Payment verified and access granted for {}...",
                    short_id(identity)
                );
                let _ = self.events_tx.send(GateEvent::AccessGranted {
                    identity: identity.to_string(),
                    payment_hash: payment_hash.to_string(),
                    expires_at: record.expires_at,
                });
                Ok(record)
            }
            Grant::Existing(record) => Ok(record),
        }
    }

    /// Counters, store aggregates and pricing configuration.
    #[must_use]
    pub fn stats(&self) -> GateStats {
        let access = self.access.stats();
        GateStats {
            payment_requests: self.payment_requests.load(Ordering::Relaxed),
            successful_payments: self.successful_payments.load(Ordering::Relaxed),
            total_members: access.total,
            active_members: access.active,
            expired_members: access.expired,
            provider: self.provider.name().to_string(),
            lightning_address: self.provider.receiving_address().map(str::to_string),
            payment_amount_msat: self.payment_amount_msat,
            payment_amount_sats: self.payment_amount_msat / 1000,
            access_duration: self.access_duration.to_string(),
        }
    }

    /// Reconciler over this gate's stores, reporting on the gate's event channel.
    #[must_use]
    pub fn reconciler(&self, config: &GateConfig) -> Reconciler {
        Reconciler::new(
            Arc::clone(&self.access),
            Arc::clone(&self.mappings),
            config.reconcile_interval(),
            config.mapping_ttl(),
        )
        .with_events(self.events_tx.clone())
        .with_provider(Arc::clone(&self.provider))
    }

    /// Subscribe to gate events.
    #[must_use]
    pub fn subscribe_events(&self) -> GateEventsChannel {
        self.events_tx.subscribe()
    }

    /// The access record store.
    #[must_use]
    pub fn access_store(&self) -> &Arc<AccessStore> {
        &self.access
    }

    /// The charge mapping store.
    #[must_use]
    pub fn mapping_store(&self) -> &Arc<ChargeMappingStore> {
        &self.mappings
    }

    /// The active payment provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn PaymentProvider> {
        &self.provider
    }
}
