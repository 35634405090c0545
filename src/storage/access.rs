//! Access record store: identity → paid grant.

use crate::error::{Error, Result};
use crate::short_id;
use crate::storage::{read_document, write_atomic};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A paid grant for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Public key of the actor.
    pub pubkey: String,
    /// Payment that produced this grant.
    pub payment_hash: String,
    /// Amount paid in millisatoshis.
    pub amount: u64,
    /// When the grant was written.
    pub created_at: DateTime<Utc>,
    /// End of access; `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessRecord {
    /// Whether the grant is valid at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| expires > now)
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires < now)
    }
}

/// Aggregate counts over the access store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccessStats {
    /// Records held, active or not.
    pub total: usize,
    /// Records granting access now.
    pub active: usize,
    /// Records past their expiry awaiting cleanup.
    pub expired: usize,
}

/// Outcome of [`AccessStore::grant_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// A new record was written for this payment.
    New(AccessRecord),
    /// The identity already held a grant from this payment; it was left as is.
    Existing(AccessRecord),
}

impl Grant {
    /// The record now held for the identity.
    #[must_use]
    pub fn record(&self) -> &AccessRecord {
        match self {
            Self::New(record) | Self::Existing(record) => record,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccessDocument {
    members: HashMap<String, AccessRecord>,
    /// Every payment hash ever granted, with the identity it went to.
    /// Survives overwrites and cleanup of the records themselves.
    #[serde(default)]
    claimed: HashMap<String, String>,
}

impl AccessDocument {
    /// Backfill claims for records written before claims were tracked.
    fn seed_claims(&mut self) {
        for record in self.members.values() {
            self.claimed
                .entry(record.payment_hash.clone())
                .or_insert_with(|| record.pubkey.clone());
        }
    }
}

/// Durable identity → grant map.
///
/// Reads take a shared lock; grants and cleanup take the exclusive lock for
/// both the in-memory change and the file write.
#[derive(Debug)]
pub struct AccessStore {
    doc: RwLock<AccessDocument>,
    path: PathBuf,
}

impl AccessStore {
    /// Open the store at `path`, loading any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut doc: AccessDocument = read_document(&path)?;
        doc.seed_claims();
        debug!(
            "Loaded {} access records ({} claimed payments) from {}",
            doc.members.len(),
            doc.claimed.len(),
            path.display()
        );
        Ok(Self {
            doc: RwLock::new(doc),
            path,
        })
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `identity` currently holds a valid grant.
    #[must_use]
    pub fn has_access(&self, identity: &str) -> bool {
        self.has_access_at(identity, Utc::now())
    }

    /// Whether `identity` holds a grant valid at `now`.
    #[must_use]
    pub fn has_access_at(&self, identity: &str, now: DateTime<Utc>) -> bool {
        self.doc
            .read()
            .members
            .get(identity)
            .is_some_and(|record| record.is_active_at(now))
    }

    /// Current grant for `identity`, if any, expired or not.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<AccessRecord> {
        self.doc.read().members.get(identity).cloned()
    }

    /// Grant `identity` access for `duration`, replacing any previous grant.
    ///
    /// A `None` or zero duration grants access that never expires. The record
    /// stays in memory even if writing the file fails.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Persist`] if the snapshot could not be written.
    pub fn add_paid_access(
        &self,
        identity: &str,
        payment_hash: &str,
        amount: u64,
        duration: Option<Duration>,
    ) -> Result<AccessRecord> {
        let record = new_record(identity, payment_hash, amount, duration);

        let mut doc = self.doc.write();
        doc.claimed
            .insert(payment_hash.to_string(), identity.to_string());
        doc.members.insert(identity.to_string(), record.clone());
        write_atomic(&self.path, &*doc)?;
        drop(doc);

        log_grant(&record);
        Ok(record)
    }

    /// Grant access for a payment at most once.
    ///
    /// If `identity` still holds the grant from `payment_hash` the record is
    /// kept and the snapshot rewritten, which makes a retry after a failed
    /// write durable without extending access. Any other use of a payment
    /// that was already granted is refused, including after the grant was
    /// replaced by a renewal or removed by cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PaymentAlreadyClaimed`] if the payment was already
    /// used for a grant that `identity` no longer holds, or
    /// [`Error::Persist`] if the snapshot could not be written.
    pub fn grant_once(
        &self,
        identity: &str,
        payment_hash: &str,
        amount: u64,
        duration: Option<Duration>,
    ) -> Result<Grant> {
        let mut doc = self.doc.write();

        if let Some(owner) = doc.claimed.get(payment_hash) {
            let current = doc
                .members
                .get(identity)
                .filter(|r| owner == identity && r.payment_hash == payment_hash)
                .cloned();
            let Some(existing) = current else {
                warn!(
                    "Payment {}... already used, refusing grant to {}...",
                    short_id(payment_hash),
                    short_id(identity)
                );
                return Err(Error::PaymentAlreadyClaimed {
                    payment_hash: payment_hash.to_string(),
                });
            };

            write_atomic(&self.path, &*doc)?;
            debug!(
                "Payment {}... already granted to {}...",
                short_id(payment_hash),
                short_id(identity)
            );
            return Ok(Grant::Existing(existing));
        }

        let record = new_record(identity, payment_hash, amount, duration);
        doc.claimed
            .insert(payment_hash.to_string(), identity.to_string());
        doc.members.insert(identity.to_string(), record.clone());
        write_atomic(&self.path, &*doc)?;
        drop(doc);

        log_grant(&record);
        Ok(Grant::New(record))
    }

    /// Remove every grant whose expiry has passed.
    ///
    /// Returns the number of records removed. The file is only rewritten when
    /// something was removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Persist`] if the snapshot could not be written.
    pub fn cleanup_expired(&self) -> Result<usize> {
        self.cleanup_expired_at(Utc::now())
    }

    /// [`Self::cleanup_expired`] evaluated at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Persist`] if the snapshot could not be written.
    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut doc = self.doc.write();
        let before = doc.members.len();
        doc.members.retain(|_, record| !record.is_expired_at(now));
        let removed = before - doc.members.len();

        if removed > 0 {
            write_atomic(&self.path, &*doc)?;
            info!("Cleaned up {removed} expired access records");
        }
        Ok(removed)
    }

    /// Counts of total, active and expired records.
    #[must_use]
    pub fn stats(&self) -> AccessStats {
        self.stats_at(Utc::now())
    }

    /// [`Self::stats`] evaluated at `now`.
    #[must_use]
    pub fn stats_at(&self, now: DateTime<Utc>) -> AccessStats {
        let doc = self.doc.read();
        let active = doc
            .members
            .values()
            .filter(|record| record.is_active_at(now))
            .count();
        AccessStats {
            total: doc.members.len(),
            active,
            expired: doc.members.len() - active,
        }
    }

    /// Whether `payment_hash` has ever been used for a grant.
    #[must_use]
    pub fn is_claimed(&self, payment_hash: &str) -> bool {
        self.doc.read().claimed.contains_key(payment_hash)
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc.read().members.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc.read().members.is_empty()
    }
}

fn new_record(
    identity: &str,
    payment_hash: &str,
    amount: u64,
    duration: Option<Duration>,
) -> AccessRecord {
    let now = Utc::now();
    AccessRecord {
        pubkey: identity.to_string(),
        payment_hash: payment_hash.to_string(),
        amount,
        created_at: now,
        expires_at: duration
            .filter(|d| !d.is_zero())
            .and_then(|d| now.checked_add_signed(d)),
    }
}

fn log_grant(record: &AccessRecord) {
    match record.expires_at {
        Some(expires) => info!(
            "Added paid access for {}... (expires {expires})",
            short_id(&record.pubkey)
        ),
        None => info!(
            "Added permanent paid access for {}...",
            short_id(&record.pubkey)
        ),
    }
}
