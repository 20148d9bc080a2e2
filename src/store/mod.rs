//! Persistence seams for the workflows.
//!
//! Every update is conditional on the `row_version` the caller read; the
//! stored row gets `row_version + 1`. A mismatch is reported as
//! [`StoreError::VersionConflict`] and nothing is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::attestation::{AttestationKey, SignatureAttestation};
use crate::error::StoreError;
use crate::notes::{ClinicalNote, NoteStatus};
use crate::scheduling::{Appointment, WaitlistEntry, WaitlistStatus};

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn insert_note(&self, note: &ClinicalNote) -> Result<(), StoreError>;

    async fn get_note(&self, id: Uuid) -> Result<Option<ClinicalNote>, StoreError>;

    async fn update_note(&self, note: &ClinicalNote) -> Result<(), StoreError>;

    async fn notes_with_status(&self, status: NoteStatus) -> Result<Vec<ClinicalNote>, StoreError>;
}

#[async_trait]
pub trait AttestationStore: Send + Sync {
    /// Exact lookup of an active row; wildcard fallback is the resolver's job.
    async fn find_active_attestation(
        &self,
        key: &AttestationKey,
    ) -> Result<Option<SignatureAttestation>, StoreError>;

    /// Inserts, or replaces the text of the row with the same key.
    async fn upsert_attestation(
        &self,
        attestation: &SignatureAttestation,
    ) -> Result<SignatureAttestation, StoreError>;

    async fn set_attestation_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;

    async fn list_attestations(&self) -> Result<Vec<SignatureAttestation>, StoreError>;
}

#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError>;

    async fn get_waitlist_entry(&self, id: Uuid) -> Result<Option<WaitlistEntry>, StoreError>;

    async fn update_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError>;

    async fn list_waitlist(
        &self,
        status: Option<WaitlistStatus>,
    ) -> Result<Vec<WaitlistEntry>, StoreError>;

    /// Active (scheduled, confirmed or completed) appointments for the
    /// clinician overlapping `[start, end)`.
    async fn overlapping_appointments(
        &self,
        clinician_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Inserts unless an active appointment already overlaps the slot, in
    /// which case [`StoreError::SlotTaken`] is returned.
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;

    /// Inserts the appointment and applies the waitlist entry update as one
    /// unit; either both land or neither does.
    async fn commit_booking(
        &self,
        appointment: &Appointment,
        entry: &WaitlistEntry,
    ) -> Result<(), StoreError>;

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;
}
