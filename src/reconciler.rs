//! Background maintenance of the stores.
//!
//! Wakes on a fixed interval, evicts expired grants and prunes charge
//! mappings older than their TTL. Failures are logged and the loop carries
//! on; maintenance is never fatal.

use crate::event::{GateEvent, GateEventsSender};
use crate::provider::PaymentProvider;
use crate::storage::{AccessStore, ChargeMappingStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Expired access records removed.
    pub expired_removed: usize,
    /// Charge mappings pruned.
    pub mappings_pruned: usize,
}

/// Periodic store maintenance task.
pub struct Reconciler {
    access: Arc<AccessStore>,
    mappings: Arc<ChargeMappingStore>,
    interval: Duration,
    mapping_ttl: chrono::Duration,
    events_tx: Option<GateEventsSender>,
    provider: Option<Arc<dyn PaymentProvider>>,
}

impl Reconciler {
    /// Create a reconciler over both stores.
    #[must_use]
    pub fn new(
        access: Arc<AccessStore>,
        mappings: Arc<ChargeMappingStore>,
        interval: Duration,
        mapping_ttl: chrono::Duration,
    ) -> Self {
        Self {
            access,
            mappings,
            interval,
            mapping_ttl,
            events_tx: None,
            provider: None,
        }
    }

    /// Evict pruned charge references from `provider`'s lookup cache.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Report removals on an event channel.
    #[must_use]
    pub fn with_events(mut self, events_tx: GateEventsSender) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    /// Wake interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single maintenance pass.
    pub fn run_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        match self.access.cleanup_expired() {
            Ok(count) => {
                report.expired_removed = count;
                if count > 0 {
                    self.emit(GateEvent::ExpiredRemoved { count });
                }
            }
            Err(e) => warn!("Failed to clean up expired access records: {e}"),
        }

        match self.mappings.prune(self.mapping_ttl) {
            Ok(pruned) => {
                let count = pruned.len();
                report.mappings_pruned = count;
                if count > 0 {
                    if let Some(provider) = &self.provider {
                        provider.forget_charges(&pruned);
                    }
                    self.emit(GateEvent::MappingsPruned { count });
                }
            }
            Err(e) => warn!("Failed to prune charge mappings: {e}"),
        }

        debug!(
            "Reconcile pass: {} expired removed, {} mappings pruned",
            report.expired_removed, report.mappings_pruned
        );
        report
    }

    /// Run until `shutdown` turns `true` or its sender is dropped.
    ///
    /// The first pass happens one interval after start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Reconciler started (every {}s)",
            self.interval.as_secs()
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_once();
                }
            }
        }

        info!("Reconciler stopped");
    }

    /// Spawn [`Self::run`] on the current runtime.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    fn emit(&self, event: GateEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }
}
