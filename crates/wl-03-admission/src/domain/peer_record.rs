//! Per-peer violation history and block state.

use shared_types::Timestamp;
use std::collections::VecDeque;
use std::time::Duration;

/// What a peer has done wrong lately.
#[derive(Debug, Clone, Default)]
pub struct PeerRecord {
    /// Times of rejected admissions still inside the violation window.
    violations: VecDeque<Timestamp>,
    /// End of the current block, if any.
    blocked_until: Option<Timestamp>,
    /// Last `RateLimited` notice sent to this peer.
    last_notified: Option<Timestamp>,
}

impl PeerRecord {
    /// Active block end, if the peer is blocked at `now`.
    pub fn blocked_until(&self, now: Timestamp) -> Option<Timestamp> {
        self.blocked_until.filter(|until| now < *until)
    }

    /// Count a violation at `now`. Returns the block end if this violation
    /// reached `threshold` inside `window`.
    pub fn record_violation(
        &mut self,
        now: Timestamp,
        window: Duration,
        threshold: u32,
        block_for: Duration,
    ) -> Option<Timestamp> {
        self.prune(now, window);
        self.violations.push_back(now);

        if threshold > 0 && self.violations.len() >= threshold as usize {
            let until = now.saturating_add(block_for);
            self.blocked_until = Some(until);
            self.violations.clear();
            return Some(until);
        }
        None
    }

    /// Violations inside `window` of `now`.
    pub fn violation_count(&mut self, now: Timestamp, window: Duration) -> usize {
        self.prune(now, window);
        self.violations.len()
    }

    /// `true` and records the notice if none was sent within `interval`.
    pub fn try_notify(&mut self, now: Timestamp, interval: Duration) -> bool {
        match self.last_notified {
            Some(last) if now.since(last) < interval => false,
            _ => {
                self.last_notified = Some(now);
                true
            }
        }
    }

    /// Nothing worth keeping: no block, no recent violations, no recent notice.
    pub fn is_idle(&mut self, now: Timestamp, window: Duration, notify_interval: Duration) -> bool {
        self.prune(now, window);
        if self.blocked_until(now).is_none() {
            self.blocked_until = None;
        }
        self.blocked_until.is_none()
            && self.violations.is_empty()
            && self
                .last_notified
                .map_or(true, |last| now.since(last) >= notify_interval)
    }

    fn prune(&mut self, now: Timestamp, window: Duration) {
        let horizon = now.saturating_sub(window);
        while self.violations.front().is_some_and(|t| *t <= horizon) {
            self.violations.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);
    const BLOCK: Duration = Duration::from_secs(300);

    #[test]
    fn test_threshold_inside_window_blocks() {
        let mut record = PeerRecord::default();
        let now = Timestamp::from_secs(1_000);

        assert_eq!(record.record_violation(now, WINDOW, 3, BLOCK), None);
        assert_eq!(record.record_violation(now, WINDOW, 3, BLOCK), None);
        let until = record.record_violation(now, WINDOW, 3, BLOCK);
        assert_eq!(until, Some(Timestamp::from_secs(1_300)));

        assert!(record.blocked_until(Timestamp::from_secs(1_299)).is_some());
        assert!(record.blocked_until(Timestamp::from_secs(1_300)).is_none());
    }

    #[test]
    fn test_old_violations_age_out() {
        let mut record = PeerRecord::default();
        record.record_violation(Timestamp::from_secs(0), WINDOW, 3, BLOCK);
        record.record_violation(Timestamp::from_secs(10), WINDOW, 3, BLOCK);

        let later = Timestamp::from_secs(65);
        assert_eq!(record.violation_count(later, WINDOW), 1);
        assert_eq!(record.record_violation(later, WINDOW, 3, BLOCK), None);
    }

    #[test]
    fn test_notify_throttled() {
        let mut record = PeerRecord::default();
        let interval = Duration::from_secs(1);
        let now = Timestamp::from_secs(5);

        assert!(record.try_notify(now, interval));
        assert!(!record.try_notify(Timestamp::from_millis(5_999), interval));
        assert!(record.try_notify(Timestamp::from_secs(6), interval));
    }
}
