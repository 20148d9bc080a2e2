use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Workflow event counters
#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    pub notes_created: AtomicU64,
    pub notes_signed: AtomicU64,
    pub notes_cosigned: AtomicU64,
    pub unlock_requests: AtomicU64,
    pub unlocks_approved: AtomicU64,
    pub unlocks_expired: AtomicU64,
    pub revisions: AtomicU64,
    pub auth_failures: AtomicU64,
    pub offers_made: AtomicU64,
    pub offers_expired: AtomicU64,
    pub bookings: AtomicU64,
    pub slot_races_lost: AtomicU64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_note_created(&self) {
        self.notes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_note_signed(&self) {
        self.notes_signed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_note_cosigned(&self) {
        self.notes_cosigned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unlock_requested(&self) {
        self.unlock_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unlock_approved(&self) {
        self.unlocks_approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unlock_expired(&self) {
        self.unlocks_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revision(&self) {
        self.revisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offer(&self) {
        self.offers_made.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offer_expired(&self) {
        self.offers_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_booking(&self) {
        self.bookings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_race_lost(&self) {
        self.slot_races_lost.fetch_add(1, Ordering::Relaxed);
        warn!("Slot was taken before the booking committed");
    }

    pub fn get_stats(&self) -> WorkflowStats {
        WorkflowStats {
            notes_created: self.notes_created.load(Ordering::Relaxed),
            notes_signed: self.notes_signed.load(Ordering::Relaxed),
            notes_cosigned: self.notes_cosigned.load(Ordering::Relaxed),
            unlock_requests: self.unlock_requests.load(Ordering::Relaxed),
            unlocks_approved: self.unlocks_approved.load(Ordering::Relaxed),
            unlocks_expired: self.unlocks_expired.load(Ordering::Relaxed),
            revisions: self.revisions.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            offers_made: self.offers_made.load(Ordering::Relaxed),
            offers_expired: self.offers_expired.load(Ordering::Relaxed),
            bookings: self.bookings.load(Ordering::Relaxed),
            slot_races_lost: self.slot_races_lost.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            notes_created = stats.notes_created,
            notes_signed = stats.notes_signed,
            notes_cosigned = stats.notes_cosigned,
            unlocks_approved = stats.unlocks_approved,
            unlocks_expired = stats.unlocks_expired,
            revisions = stats.revisions,
            auth_failures = stats.auth_failures,
            bookings = stats.bookings,
            slot_races_lost = stats.slot_races_lost,
            offers_expired = stats.offers_expired,
            "Workflow metrics"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStats {
    pub notes_created: u64,
    pub notes_signed: u64,
    pub notes_cosigned: u64,
    pub unlock_requests: u64,
    pub unlocks_approved: u64,
    pub unlocks_expired: u64,
    pub revisions: u64,
    pub auth_failures: u64,
    pub offers_made: u64,
    pub offers_expired: u64,
    pub bookings: u64,
    pub slot_races_lost: u64,
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
