//! Error types for lightning-gate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the payment gate.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Payment provider transport failure or non-success response.
    #[error("provider error: {0}")]
    Provider(String),

    /// No charge reference is known for this payment hash yet.
    #[error("charge mapping not found for payment hash {0}")]
    MappingNotFound(String),

    /// Writing a store snapshot to disk failed.
    #[error("failed to persist {path}: {source}")]
    Persist {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The provider confirmed the payment but the grant could not be made durable.
    #[error("payment {payment_hash} confirmed but access not recorded: {source}")]
    GrantNotRecorded {
        /// Payment hash that was confirmed.
        payment_hash: String,
        /// Persistence failure.
        #[source]
        source: Box<Error>,
    },

    /// The payment was already used for a grant.
    #[error("payment {payment_hash} already used for a grant")]
    PaymentAlreadyClaimed {
        /// Payment hash presented again.
        payment_hash: String,
    },

    /// Malformed webhook payload.
    #[error("invalid webhook payload: {0}")]
    Webhook(String),

    /// The active provider does not push settlement webhooks.
    #[error("provider {0} does not support webhooks")]
    WebhookUnsupported(String),

    /// Malformed administrative request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may simply try again later.
    ///
    /// A missing charge mapping means the invoice is not payable (yet), and a
    /// grant that failed to persist can be re-attempted by re-verifying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MappingNotFound(_) | Self::GrantNotRecorded { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Provider(format!("request timed out: {e}"))
        } else {
            Self::Provider(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
