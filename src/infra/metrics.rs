//! Lock-free metrics collection
//!
//! Plain atomic counters incremented from the control loops and reported
//! periodically as a single structured summary line. Counters cover the
//! candidate pipeline, gate decisions, payments, and degradation events.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct Metrics {
    candidates_accepted: AtomicU64,
    candidates_rejected: AtomicU64,
    boxes_filtered: AtomicU64,
    votes_decided: AtomicU64,
    cooldown_skips: AtomicU64,
    entries_logged: AtomicU64,
    exits_granted: AtomicU64,
    exits_denied: AtomicU64,
    payments_completed: AtomicU64,
    payments_failed: AtomicU64,
    store_errors: AtomicU64,
    actuator_errors: AtomicU64,
    detections_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_candidate_accepted(&self) {
        self.candidates_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate_rejected(&self) {
        self.candidates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_box_filtered(&self) {
        self.boxes_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_vote_decided(&self) {
        self.votes_decided.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cooldown_skip(&self) {
        self.cooldown_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entry_logged(&self) {
        self.entries_logged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit_granted(&self) {
        self.exits_granted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit_denied(&self) {
        self.exits_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payment_completed(&self) {
        self.payments_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payment_failed(&self) {
        self.payments_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actuator_error(&self) {
        self.actuator_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection_dropped(&self) {
        self.detections_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters (lock-free reads)
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            candidates_accepted: self.candidates_accepted.load(Ordering::Relaxed),
            candidates_rejected: self.candidates_rejected.load(Ordering::Relaxed),
            boxes_filtered: self.boxes_filtered.load(Ordering::Relaxed),
            votes_decided: self.votes_decided.load(Ordering::Relaxed),
            cooldown_skips: self.cooldown_skips.load(Ordering::Relaxed),
            entries_logged: self.entries_logged.load(Ordering::Relaxed),
            exits_granted: self.exits_granted.load(Ordering::Relaxed),
            exits_denied: self.exits_denied.load(Ordering::Relaxed),
            payments_completed: self.payments_completed.load(Ordering::Relaxed),
            payments_failed: self.payments_failed.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            actuator_errors: self.actuator_errors.load(Ordering::Relaxed),
            detections_dropped: self.detections_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSummary {
    pub candidates_accepted: u64,
    pub candidates_rejected: u64,
    pub boxes_filtered: u64,
    pub votes_decided: u64,
    pub cooldown_skips: u64,
    pub entries_logged: u64,
    pub exits_granted: u64,
    pub exits_denied: u64,
    pub payments_completed: u64,
    pub payments_failed: u64,
    pub store_errors: u64,
    pub actuator_errors: u64,
    pub detections_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            candidates_accepted = %self.candidates_accepted,
            candidates_rejected = %self.candidates_rejected,
            boxes_filtered = %self.boxes_filtered,
            votes_decided = %self.votes_decided,
            cooldown_skips = %self.cooldown_skips,
            entries_logged = %self.entries_logged,
            exits_granted = %self.exits_granted,
            exits_denied = %self.exits_denied,
            payments_completed = %self.payments_completed,
            payments_failed = %self.payments_failed,
            store_errors = %self.store_errors,
            actuator_errors = %self.actuator_errors,
            detections_dropped = %self.detections_dropped,
            "metrics_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new();
        let report = metrics.report();
        assert_eq!(report.candidates_accepted, 0);
        assert_eq!(report.payments_completed, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_candidate_accepted();
        metrics.record_candidate_accepted();
        metrics.record_exit_denied();
        metrics.record_store_error();

        let report = metrics.report();
        assert_eq!(report.candidates_accepted, 2);
        assert_eq!(report.exits_denied, 1);
        assert_eq!(report.store_errors, 1);
        assert_eq!(report.exits_granted, 0);
    }
}
