//! # lightning-gate
//!
//! Lightning payment gate for message relays.
//!
//! Actors are identified by a public key. An actor without paid access is
//! handed a Lightning invoice instead of being served; once the configured
//! payment provider confirms settlement, the key is granted access until an
//! expiry and subsequent checks pass.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 AccessGate                  │
//! │  gate check / invoice / verify / webhook    │
//! ├───────────────┬─────────────────────────────┤
//! │ PaymentProvider (phoenixd, ZBD)             │
//! ├───────────────┴─────────────────────────────┤
//! │ AccessStore        │ ChargeMappingStore     │
//! │ (identity → grant) │ (hash → charge id)     │
//! └─────────────────────────────────────────────┘
//!            ▲ periodic cleanup: Reconciler
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod admin;
pub mod config;
pub mod error;
pub mod event;
pub mod gate;
pub mod provider;
pub mod reconciler;
pub mod storage;

pub use config::{AccessDuration, GateConfig};
pub use error::{Error, Result};
pub use event::{GateEvent, GateEventsChannel};
pub use gate::{AccessGate, GateDecision, GateStats, PaymentRequest};
pub use provider::{Invoice, PaymentProvider, PaymentVerification, ProviderKind};
pub use reconciler::{ReconcileReport, Reconciler};
pub use storage::{AccessRecord, AccessStats, AccessStore, ChargeMappingStore};

/// Shorten an identity for log output.
#[must_use]
pub(crate) fn short_id(identity: &str) -> &str {
    identity.get(..16).unwrap_or(identity)
}
