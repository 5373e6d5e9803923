// CLASSIFICATION: COMMUNITY
// Filename: stats.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Protocol traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the coherence engine.
#[derive(Debug, Default)]
pub struct ProtocolStats {
    requests_sent: AtomicU64,
    responses_sent: AtomicU64,
    messages_received: AtomicU64,
    invalidations_applied: AtomicU64,
    fetches_served: AtomicU64,
}

/// Point-in-time copy of [`ProtocolStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub requests_sent: u64,
    pub responses_sent: u64,
    pub messages_received: u64,
    pub invalidations_applied: u64,
    pub fetches_served: u64,
}

impl ProtocolStats {
    pub fn record_request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_served(&self) {
        self.fetches_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            invalidations_applied: self.invalidations_applied.load(Ordering::Relaxed),
            fetches_served: self.fetches_served.load(Ordering::Relaxed),
        }
    }
}
