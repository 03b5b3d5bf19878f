//! Status callback ledger
//!
//! Vendors retry status callbacks. Each `(call_id, status)` pair is
//! processed once; repeats are acknowledged and dropped. Finished calls are
//! forgotten after a grace window so that late retries are still caught,
//! and calls that never report a final status are dropped after `max_age`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use voice_agent_core::StatusCallbackRecord;

/// Latest status known for a call
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub provider: String,
    pub workflow_run_id: i64,
    pub record: StatusCallbackRecord,
    /// When the ledger accepted this record
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StatusLedger {
    seen: DashMap<(String, String), DateTime<Utc>>,
    latest: DashMap<String, StatusUpdate>,
    /// How long a finished call keeps absorbing vendor retries
    terminal_retention: Duration,
    /// Upper bound for calls that never report a final status
    max_age: Duration,
    cleanup_interval: Duration,
}

impl Default for StatusLedger {
    fn default() -> Self {
        Self::with_retention(
            Duration::from_secs(600),
            Duration::from_secs(6 * 3600),
            Duration::from_secs(60),
        )
    }
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(
        terminal_retention: Duration,
        max_age: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            seen: DashMap::new(),
            latest: DashMap::new(),
            terminal_retention,
            max_age,
            cleanup_interval,
        }
    }

    /// Record a callback. Returns `false` when this `(call_id, status)` was
    /// already processed.
    pub fn record(&self, provider: &str, workflow_run_id: i64, record: StatusCallbackRecord) -> bool {
        self.record_at(provider, workflow_run_id, record, Utc::now())
    }

    fn record_at(
        &self,
        provider: &str,
        workflow_run_id: i64,
        record: StatusCallbackRecord,
        now: DateTime<Utc>,
    ) -> bool {
        match self.seen.entry(record.dedup_key()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(now);
            },
        }

        if record.is_terminal() {
            tracing::info!(
                provider,
                workflow_run_id,
                call_id = %record.call_id,
                status = %record.status,
                duration = ?record.duration,
                "Call finished"
            );
        }

        let update = StatusUpdate {
            provider: provider.to_string(),
            workflow_run_id,
            record,
            recorded_at: now,
        };
        match self.latest.entry(update.record.call_id.clone()) {
            Entry::Occupied(mut current) => {
                // A final status is never replaced by a late progress update
                if current.get().record.is_terminal() && !update.record.is_terminal() {
                    tracing::debug!(
                        call_id = %update.record.call_id,
                        status = %update.record.status,
                        current = %current.get().record.status,
                        "Late status callback after call finished"
                    );
                } else {
                    current.insert(update);
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(update);
            },
        }
        true
    }

    pub fn latest(&self, call_id: &str) -> Option<StatusUpdate> {
        self.latest.get(call_id).map(|entry| entry.value().clone())
    }

    /// Number of `(call_id, status)` pairs held
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Number of calls held
    pub fn call_count(&self) -> usize {
        self.latest.len()
    }

    /// Forget finished calls past the grace window and stale calls past `max_age`
    pub fn cleanup_expired(&self) {
        self.cleanup_expired_at(Utc::now());
    }

    fn cleanup_expired_at(&self, now: DateTime<Utc>) {
        let age = |at: DateTime<Utc>| (now - at).to_std().unwrap_or_default();

        self.latest.retain(|_, update| {
            let age = age(update.recorded_at);
            if update.record.is_terminal() {
                age < self.terminal_retention
            } else {
                age < self.max_age
            }
        });
        self.seen
            .retain(|(call_id, _), at| self.latest.contains_key(call_id) && age(*at) < self.max_age);
    }

    /// Start a background task that periodically runs [`Self::cleanup_expired`].
    ///
    /// Returns a shutdown sender that stops the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let ledger = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(ledger.cleanup_interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let before = ledger.call_count();
                        ledger.cleanup_expired();
                        let after = ledger.call_count();
                        if before != after {
                            tracing::info!(
                                "Status ledger cleanup: removed {} calls ({} remaining)",
                                before - after,
                                after
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Status ledger cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
