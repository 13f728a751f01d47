//! Receive-side sequence window.
//!
//! A fixed ring of `window + forward` flags indexed by `seq mod size`. The
//! ring covers `[expected - window, expected + forward)`; every time
//! `expected` advances, the slot that enters the forward edge is cleared
//! because it last held a number that just left the backward edge.

use shared_types::{ProtocolError, ReplayKind};

/// Outcome of an accepted sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowVerdict {
    /// `seq` was the expected number.
    InOrder,
    /// `seq` was accepted from the backward or forward window.
    OutOfOrder,
}

/// Sliding replay window over per-direction sequence numbers.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    seen: Vec<bool>,
    expected: u64,
    window: u64,
    forward: u64,
}

impl ReplayWindow {
    /// Window expecting `0` first.
    pub fn new(window: u64, forward: u64) -> Self {
        let size = (window + forward).max(1);
        Self {
            seen: vec![false; size as usize],
            expected: 0,
            window,
            forward: forward.max(1),
        }
    }

    /// Next in-order sequence number.
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Accept `seq` at most once.
    ///
    /// # Errors
    ///
    /// - `ReplayDetected(SequenceBehindWindow)` if `seq < expected - window`
    /// - `ReplayDetected(SequenceReused)` on a second arrival
    /// - `SequenceError` if `seq >= expected + forward`; the caller should
    ///   request a gap fill for `[expected, seq]`
    pub fn check_and_mark(&mut self, seq: u64) -> Result<WindowVerdict, ProtocolError> {
        if seq.saturating_add(self.window) < self.expected {
            return Err(ProtocolError::ReplayDetected(ReplayKind::SequenceBehindWindow));
        }
        if seq >= self.expected.saturating_add(self.forward) {
            return Err(ProtocolError::SequenceError {
                expected: self.expected,
                received: seq,
            });
        }

        let slot = self.slot(seq);
        if self.seen[slot] {
            return Err(ProtocolError::ReplayDetected(ReplayKind::SequenceReused));
        }
        self.seen[slot] = true;

        if seq != self.expected {
            return Ok(WindowVerdict::OutOfOrder);
        }
        while self.seen[self.slot(self.expected)] {
            self.expected += 1;
            let entering = self.expected + self.forward - 1;
            let slot = self.slot(entering);
            self.seen[slot] = false;
        }
        Ok(WindowVerdict::InOrder)
    }

    /// `true` if `seq` was already accepted and is still tracked.
    pub fn contains(&self, seq: u64) -> bool {
        seq.saturating_add(self.window) >= self.expected
            && seq < self.expected.saturating_add(self.forward)
            && self.seen[self.slot(seq)]
    }

    fn slot(&self, seq: u64) -> usize {
        (seq % self.seen.len() as u64) as usize
    }
}
