//! Connection counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters kept by a connection.
#[derive(Debug, Default)]
pub struct ClientStats {
    requests_sent: AtomicU64,
    responses_matched: AtomicU64,
    responses_unmatched: AtomicU64,
    timeouts: AtomicU64,
    frames_dropped: AtomicU64,
    events_dispatched: AtomicU64,
    handler_panics: AtomicU64,
    reconnect_attempts: AtomicU64,
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests_sent: u64,
    pub responses_matched: u64,
    pub responses_unmatched: u64,
    pub timeouts: u64,
    pub frames_dropped: u64,
    pub events_dispatched: u64,
    pub handler_panics: u64,
    pub reconnect_attempts: u64,
}

impl ClientStats {
    pub(crate) fn request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn response_matched(&self) {
        self.responses_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn response_unmatched(&self) {
        self.responses_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn handler_panicked(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reconnect_attempted(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            responses_unmatched: self.responses_unmatched.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = ClientStats::default();
        stats.request_sent();
        stats.request_sent();
        stats.frame_dropped();
        stats.reconnect_attempted();

        let snap = stats.snapshot();
        assert_eq!(snap.requests_sent, 2);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.reconnect_attempts, 1);
        assert_eq!(snap.timeouts, 0);
    }
}
