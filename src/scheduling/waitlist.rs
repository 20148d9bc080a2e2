// Waitlist offers and booking.
//
// An offer reserves nothing: the slot is re-checked and the booking is
// committed atomically by the store, so two bookings can never share a slot.

use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::WaitlistConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::observability::WorkflowMetrics;
use crate::store::SchedulingStore;

use super::types::*;

/// Result of converting an offer into an appointment.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Booking {
    pub appointment: Appointment,
    pub entry: WaitlistEntry,
}

pub struct WaitlistManager {
    store: Arc<dyn SchedulingStore>,
    clock: Arc<dyn Clock>,
    policy: WaitlistConfig,
    metrics: Arc<WorkflowMetrics>,
}

impl WaitlistManager {
    pub fn new(store: Arc<dyn SchedulingStore>, clock: Arc<dyn Clock>, policy: WaitlistConfig) -> Self {
        Self {
            store,
            clock,
            policy,
            metrics: Arc::new(WorkflowMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<WorkflowMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn add_to_waitlist(&self, request: NewWaitlistEntry) -> WorkflowResult<WaitlistEntry> {
        if request.client_id.is_nil() {
            return Err(WorkflowError::validation("client_id is required"));
        }
        request.criteria.validate()?;

        let now = self.clock.now();
        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            client_id: request.client_id,
            clinician_id: request.clinician_id,
            criteria: request.criteria,
            priority: request.priority,
            status: WaitlistStatus::Waiting,
            offered_slot: None,
            offered_at: None,
            offer_expires_at: None,
            appointment_id: None,
            removal_reason: None,
            added_at: now,
            updated_at: now,
            row_version: 0,
        };
        self.store.insert_waitlist_entry(&entry).await?;
        info!(
            entry_id = %entry.id,
            client_id = %entry.client_id,
            priority = %entry.priority,
            "Client added to waitlist"
        );
        Ok(entry)
    }

    pub async fn get_entry(&self, entry_id: Uuid) -> WorkflowResult<WaitlistEntry> {
        self.store
            .get_waitlist_entry(entry_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("waitlist entry", entry_id))
    }

    pub async fn offer_slot(
        &self,
        entry_id: Uuid,
        slot: AppointmentSlot,
    ) -> WorkflowResult<WaitlistEntry> {
        let mut entry = self.get_entry(entry_id).await?;
        let next = entry.status.apply(WaitlistAction::Offer)?;
        slot.validate()?;
        if !entry.fits(&slot) {
            return Err(WorkflowError::validation(format!(
                "slot at {} with clinician {} does not match entry {}'s preferences",
                slot.start_time, slot.clinician_id, entry.id
            )));
        }
        self.ensure_open(&slot).await?;

        let now = self.clock.now();
        entry.status = next;
        entry.offered_slot = Some(slot);
        entry.offered_at = Some(now);
        entry.offer_expires_at = Some(now + Duration::hours(i64::from(self.policy.offer_ttl_hours)));
        entry.updated_at = now;

        self.persist(&mut entry).await?;
        self.metrics.record_offer();
        info!(
            entry_id = %entry.id,
            clinician_id = %slot.clinician_id,
            start_time = %slot.start_time,
            expires_at = ?entry.offer_expires_at,
            "Slot offered"
        );
        Ok(entry)
    }

    pub async fn book_from_waitlist(&self, entry_id: Uuid) -> WorkflowResult<Booking> {
        let mut entry = self.get_entry(entry_id).await?;
        let now = self.clock.now();

        if entry.offer_expired(now) {
            self.revert_expired_offer(&mut entry).await?;
            return Err(WorkflowError::invalid_transition(
                "waitlist entry",
                "Offered (expired)",
                WaitlistAction::Book,
            ));
        }
        let next = entry.status.apply(WaitlistAction::Book)?;
        let slot = entry.offered_slot.ok_or_else(|| {
            WorkflowError::Storage(format!("offered entry {} has no slot", entry.id))
        })?;

        if let Err(err) = self.ensure_open(&slot).await {
            self.metrics.record_slot_race_lost();
            return Err(err);
        }

        let appointment_type = entry
            .criteria
            .appointment_type
            .clone()
            .unwrap_or_else(|| self.policy.default_appointment_type.clone());
        let mut appointment = Appointment::new(entry.client_id, slot, appointment_type, now);
        appointment.waitlist_entry_id = Some(entry.id);

        entry.status = next;
        entry.appointment_id = Some(appointment.id);
        entry.updated_at = now;

        if let Err(err) = self.store.commit_booking(&appointment, &entry).await {
            let err = WorkflowError::from(err);
            if matches!(err, WorkflowError::SlotUnavailable(_)) {
                self.metrics.record_slot_race_lost();
            }
            return Err(err);
        }
        entry.row_version += 1;

        self.metrics.record_booking();
        info!(
            entry_id = %entry.id,
            appointment_id = %appointment.id,
            clinician_id = %appointment.clinician_id,
            start_time = %appointment.start_time,
            "Booked from waitlist"
        );
        Ok(Booking { appointment, entry })
    }

    pub async fn decline_offer(&self, entry_id: Uuid) -> WorkflowResult<WaitlistEntry> {
        let mut entry = self.get_entry(entry_id).await?;
        let next = entry.status.apply(WaitlistAction::Decline)?;

        entry.status = next;
        entry.clear_offer();
        entry.updated_at = self.clock.now();

        self.persist(&mut entry).await?;
        info!(entry_id = %entry.id, "Offer declined, entry back to waiting");
        Ok(entry)
    }

    pub async fn update_priority(
        &self,
        entry_id: Uuid,
        priority: Priority,
    ) -> WorkflowResult<WaitlistEntry> {
        let mut entry = self.get_entry(entry_id).await?;
        entry.status.apply(WaitlistAction::Reprioritize)?;
        let previous = entry.priority;

        entry.priority = priority;
        entry.updated_at = self.clock.now();

        self.persist(&mut entry).await?;
        info!(entry_id = %entry.id, from = %previous, to = %priority, "Waitlist priority changed");
        Ok(entry)
    }

    pub async fn remove_from_waitlist(
        &self,
        entry_id: Uuid,
        reason: Option<String>,
    ) -> WorkflowResult<WaitlistEntry> {
        let mut entry = self.get_entry(entry_id).await?;
        let next = entry.status.apply(WaitlistAction::Remove)?;

        entry.status = next;
        entry.clear_offer();
        entry.removal_reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        entry.updated_at = self.clock.now();

        self.persist(&mut entry).await?;
        info!(entry_id = %entry.id, reason = ?entry.removal_reason, "Removed from waitlist");
        Ok(entry)
    }

    /// Waiting entries that fit `slot`, most urgent first, then longest waiting.
    pub async fn rank_candidates(&self, slot: &AppointmentSlot) -> WorkflowResult<Vec<WaitlistEntry>> {
        slot.validate()?;
        let mut candidates: Vec<WaitlistEntry> = self
            .store
            .list_waitlist(Some(WaitlistStatus::Waiting))
            .await?
            .into_iter()
            .filter(|entry| entry.fits(slot))
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.added_at.cmp(&b.added_at))
        });
        Ok(candidates)
    }

    /// Returns lapsed offers to Waiting. Returns how many were reverted.
    pub async fn expire_offers(&self) -> WorkflowResult<usize> {
        let now = self.clock.now();
        let offered = self.store.list_waitlist(Some(WaitlistStatus::Offered)).await?;
        let mut expired = 0;
        for mut entry in offered.into_iter().filter(|e| e.offer_expired(now)) {
            match self.revert_expired_offer(&mut entry).await {
                Ok(()) => expired += 1,
                Err(WorkflowError::Conflict(_)) => {
                    warn!(entry_id = %entry.id, "Entry changed during offer sweep, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        if expired > 0 {
            info!(expired, "Waitlist offers expired");
        }
        Ok(expired)
    }

    async fn revert_expired_offer(&self, entry: &mut WaitlistEntry) -> WorkflowResult<()> {
        entry.status = entry.status.apply(WaitlistAction::ExpireOffer)?;
        entry.clear_offer();
        entry.updated_at = self.clock.now();
        self.persist(entry).await?;
        self.metrics.record_offer_expired();
        info!(entry_id = %entry.id, "Offer expired, entry back to waiting");
        Ok(())
    }

    async fn ensure_open(&self, slot: &AppointmentSlot) -> WorkflowResult<()> {
        let clashes = self
            .store
            .overlapping_appointments(slot.clinician_id, slot.start_time, slot.end_time)
            .await?;
        if let Some(existing) = clashes.first() {
            return Err(WorkflowError::SlotUnavailable(format!(
                "clinician {} already has appointment {} at {}",
                slot.clinician_id, existing.id, existing.start_time
            )));
        }
        Ok(())
    }

    async fn persist(&self, entry: &mut WaitlistEntry) -> WorkflowResult<()> {
        self.store.update_waitlist_entry(entry).await?;
        entry.row_version += 1;
        Ok(())
    }
}
