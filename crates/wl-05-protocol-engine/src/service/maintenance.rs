//! Periodic cleanup of expired state.

use std::sync::Arc;
use std::time::Duration;

use shared_types::Timestamp;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::engine::SessionProtocolEngine;

/// What one maintenance pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineMaintenanceReport {
    /// Handshakes that ran past `handshake_timeout`
    pub handshakes_expired: usize,
    /// READY sessions that ran past their lifetime
    pub sessions_expired: usize,
    /// Terminal sessions dropped from the table
    pub sessions_removed: usize,
    /// Session-id tombstones past their retention
    pub tombstones_purged: usize,
    /// Nonces past their retention
    pub nonces_purged: usize,
    /// Incomplete chunk transfers past the assembly window
    pub transfers_expired: usize,
    /// Idle rate-limit buckets
    pub buckets_purged: usize,
}

impl SessionProtocolEngine {
    /// Expire sessions and purge every time-bounded cache as of `now`.
    pub fn run_maintenance(&self, now: Timestamp) -> EngineMaintenanceReport {
        let mut report = EngineMaintenanceReport::default();

        let slots: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (key, slot) in slots {
            let (terminal, session_id) = {
                let mut guard = slot.lock();
                let handshaking = guard.session.state().is_handshaking();
                if guard.session.check_expiry(now) {
                    if handshaking {
                        report.handshakes_expired += 1;
                    } else {
                        report.sessions_expired += 1;
                    }
                }
                (guard.session.state().is_terminal(), guard.session.session_id())
            };
            if terminal
                && self
                    .sessions
                    .remove_if(&key, |_, held| Arc::ptr_eq(held, &slot))
                    .is_some()
            {
                self.tombstone(session_id, now);
                report.sessions_removed += 1;
            }
        }

        let ttl = self.config.tombstone_ttl;
        let before = self.tombstones.len();
        self.tombstones.retain(|_, died| now.since(*died) < ttl);
        report.tombstones_purged = before.saturating_sub(self.tombstones.len());

        report.nonces_purged = self.nonces.purge(now);
        report.transfers_expired = self.chunks.purge_expired(now);
        report.buckets_purged = self.limiter.purge_idle(now);
        self.backoff.retain(|_, until| now < *until);

        if report != EngineMaintenanceReport::default() {
            debug!(?report, "engine maintenance");
        }
        report
    }

    /// Run maintenance every `tick` until `shutdown` flips to `true`.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        tick: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            info!(node = ?engine.local_id(), "engine maintenance loop started");
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        engine.run_maintenance(engine.now());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(node = ?engine.local_id(), "engine maintenance loop stopped");
        })
    }
}
