//! Payment hash → provider charge reference store.
//!
//! Some providers cannot be queried by payment hash. Their charge id is
//! recorded here when the invoice is issued and looked up again when the
//! payment is verified.

use crate::error::Result;
use crate::storage::{read_document, write_atomic};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A recorded charge reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeMapping {
    /// Provider-internal charge id.
    pub charge_id: String,
    /// When the invoice was issued.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingDocument {
    mappings: HashMap<String, ChargeMapping>,
}

/// Durable payment hash → charge reference map.
#[derive(Debug)]
pub struct ChargeMappingStore {
    doc: RwLock<MappingDocument>,
    path: PathBuf,
}

impl ChargeMappingStore {
    /// Open the store at `path`, loading any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let doc: MappingDocument = read_document(&path)?;
        debug!(
            "Loaded {} charge mappings from {}",
            doc.mappings.len(),
            path.display()
        );
        Ok(Self {
            doc: RwLock::new(doc),
            path,
        })
    }

    /// Record the charge id for `payment_hash` and persist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Persist`] if the snapshot could not be written.
    pub fn store(&self, payment_hash: &str, charge_id: &str) -> Result<()> {
        let mapping = ChargeMapping {
            charge_id: charge_id.to_string(),
            created_at: Utc::now(),
        };

        let mut doc = self.doc.write();
        doc.mappings.insert(payment_hash.to_string(), mapping);
        write_atomic(&self.path, &*doc)?;
        drop(doc);

        debug!(
            "Stored charge mapping {}... -> {charge_id}",
            crate::short_id(payment_hash)
        );
        Ok(())
    }

    /// Charge id recorded for `payment_hash`.
    #[must_use]
    pub fn get(&self, payment_hash: &str) -> Option<String> {
        self.doc
            .read()
            .mappings
            .get(payment_hash)
            .map(|m| m.charge_id.clone())
    }

    /// Payment hash recorded for `charge_id`.
    #[must_use]
    pub fn hash_for_charge(&self, charge_id: &str) -> Option<String> {
        self.doc
            .read()
            .mappings
            .iter()
            .find(|(_, m)| m.charge_id == charge_id)
            .map(|(hash, _)| hash.clone())
    }

    /// Drop mappings older than `ttl`, returning the payment hashes removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Persist`] if the snapshot could not be written.
    pub fn prune(&self, ttl: Duration) -> Result<Vec<String>> {
        self.prune_at(Utc::now(), ttl)
    }

    /// [`Self::prune`] evaluated at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Persist`] if the snapshot could not be written.
    pub fn prune_at(&self, now: DateTime<Utc>, ttl: Duration) -> Result<Vec<String>> {
        let Some(cutoff) = now.checked_sub_signed(ttl) else {
            return Ok(Vec::new());
        };

        let mut doc = self.doc.write();
        let removed: Vec<String> = doc
            .mappings
            .iter()
            .filter(|(_, m)| m.created_at < cutoff)
            .map(|(hash, _)| hash.clone())
            .collect();
        for hash in &removed {
            doc.mappings.remove(hash);
        }

        if !removed.is_empty() {
            write_atomic(&self.path, &*doc)?;
        }
        info!(
            "Charge mapping prune complete ({} removed, {} kept)",
            removed.len(),
            doc.mappings.len()
        );
        Ok(removed)
    }

    /// Number of mappings held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc.read().mappings.len()
    }

    /// Whether no mappings are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc.read().mappings.is_empty()
    }
}
