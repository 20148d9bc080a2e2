use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AttestationStore, NoteStore, SchedulingStore};
use crate::attestation::{AttestationKey, SignatureAttestation};
use crate::error::StoreError;
use crate::notes::{ClinicalNote, NoteStatus};
use crate::scheduling::{Appointment, WaitlistEntry, WaitlistStatus};

#[derive(Debug, Default)]
struct Tables {
    notes: HashMap<Uuid, ClinicalNote>,
    attestations: HashMap<Uuid, SignatureAttestation>,
    waitlist: HashMap<Uuid, WaitlistEntry>,
    appointments: HashMap<Uuid, Appointment>,
}

impl Tables {
    fn slot_clash(&self, appointment: &Appointment) -> bool {
        self.appointments.values().any(|existing| {
            existing.id != appointment.id
                && existing.clinician_id == appointment.clinician_id
                && existing.status.is_active()
                && existing.start_time < appointment.end_time
                && appointment.start_time < existing.end_time
        })
    }
}

/// Process-local store. One lock guards every table, so multi-row writes
/// such as `commit_booking` are atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn bump_checked<T: Clone>(
    rows: &mut HashMap<Uuid, T>,
    entity: &'static str,
    id: Uuid,
    expected: i64,
    current_version: impl Fn(&T) -> i64,
    next: &T,
    set_version: impl Fn(&mut T, i64),
) -> Result<(), StoreError> {
    let stored = rows.get(&id).ok_or(StoreError::Missing { entity, id })?;
    if current_version(stored) != expected {
        return Err(StoreError::VersionConflict {
            entity,
            id,
            expected,
        });
    }
    let mut row = next.clone();
    set_version(&mut row, expected + 1);
    rows.insert(id, row);
    Ok(())
}

#[async_trait]
impl NoteStore for InMemoryStore {
    async fn insert_note(&self, note: &ClinicalNote) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.notes.contains_key(&note.id) {
            return Err(StoreError::Duplicate {
                entity: "clinical note",
                id: note.id,
            });
        }
        tables.notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<ClinicalNote>, StoreError> {
        Ok(self.tables.read().await.notes.get(&id).cloned())
    }

    async fn update_note(&self, note: &ClinicalNote) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        bump_checked(
            &mut tables.notes,
            "clinical note",
            note.id,
            note.row_version,
            |n| n.row_version,
            note,
            |n, v| n.row_version = v,
        )
    }

    async fn notes_with_status(&self, status: NoteStatus) -> Result<Vec<ClinicalNote>, StoreError> {
        let tables = self.tables.read().await;
        let mut notes: Vec<ClinicalNote> = tables
            .notes
            .values()
            .filter(|n| n.status == status)
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }
}

#[async_trait]
impl AttestationStore for InMemoryStore {
    async fn find_active_attestation(
        &self,
        key: &AttestationKey,
    ) -> Result<Option<SignatureAttestation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .attestations
            .values()
            .filter(|a| a.is_active && a.key().matches(key))
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn upsert_attestation(
        &self,
        attestation: &SignatureAttestation,
    ) -> Result<SignatureAttestation, StoreError> {
        let mut tables = self.tables.write().await;
        let key = attestation.key();
        if let Some(existing) = tables
            .attestations
            .values_mut()
            .find(|a| a.key().matches(&key))
        {
            existing.attestation_text = attestation.attestation_text.clone();
            existing.is_active = true;
            return Ok(existing.clone());
        }
        tables
            .attestations
            .insert(attestation.id, attestation.clone());
        Ok(attestation.clone())
    }

    async fn set_attestation_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables.attestations.get_mut(&id).ok_or(StoreError::Missing {
            entity: "attestation",
            id,
        })?;
        row.is_active = active;
        Ok(())
    }

    async fn list_attestations(&self) -> Result<Vec<SignatureAttestation>, StoreError> {
        let tables = self.tables.read().await;
        let mut all: Vec<SignatureAttestation> = tables.attestations.values().cloned().collect();
        all.sort_by(|a, b| {
            (&a.role, &a.jurisdiction, &a.note_type).cmp(&(&b.role, &b.jurisdiction, &b.note_type))
        });
        Ok(all)
    }
}

#[async_trait]
impl SchedulingStore for InMemoryStore {
    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.waitlist.contains_key(&entry.id) {
            return Err(StoreError::Duplicate {
                entity: "waitlist entry",
                id: entry.id,
            });
        }
        tables.waitlist.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get_waitlist_entry(&self, id: Uuid) -> Result<Option<WaitlistEntry>, StoreError> {
        Ok(self.tables.read().await.waitlist.get(&id).cloned())
    }

    async fn update_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        bump_checked(
            &mut tables.waitlist,
            "waitlist entry",
            entry.id,
            entry.row_version,
            |e| e.row_version,
            entry,
            |e, v| e.row_version = v,
        )
    }

    async fn list_waitlist(
        &self,
        status: Option<WaitlistStatus>,
    ) -> Result<Vec<WaitlistEntry>, StoreError> {
        let tables = self.tables.read().await;
        let mut entries: Vec<WaitlistEntry> = tables
            .waitlist
            .values()
            .filter(|e| status.map(|s| e.status == s).unwrap_or(true))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.added_at);
        Ok(entries)
    }

    async fn overlapping_appointments(
        &self,
        clinician_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.read().await;
        let mut clashes: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| {
                a.clinician_id == clinician_id
                    && a.status.is_active()
                    && a.start_time < end
                    && start < a.end_time
            })
            .cloned()
            .collect();
        clashes.sort_by_key(|a| a.start_time);
        Ok(clashes)
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.appointments.contains_key(&appointment.id) {
            return Err(StoreError::Duplicate {
                entity: "appointment",
                id: appointment.id,
            });
        }
        if appointment.status.is_active() && tables.slot_clash(appointment) {
            return Err(StoreError::SlotTaken {
                clinician_id: appointment.clinician_id,
                start: appointment.start_time,
            });
        }
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn commit_booking(
        &self,
        appointment: &Appointment,
        entry: &WaitlistEntry,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        let stored = tables.waitlist.get(&entry.id).ok_or(StoreError::Missing {
            entity: "waitlist entry",
            id: entry.id,
        })?;
        if stored.row_version != entry.row_version {
            return Err(StoreError::VersionConflict {
                entity: "waitlist entry",
                id: entry.id,
                expected: entry.row_version,
            });
        }
        if tables.slot_clash(appointment) {
            return Err(StoreError::SlotTaken {
                clinician_id: appointment.clinician_id,
                start: appointment.start_time,
            });
        }

        tables.appointments.insert(appointment.id, appointment.clone());
        let mut updated = entry.clone();
        updated.row_version += 1;
        tables.waitlist.insert(updated.id, updated);
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if appointment.status.is_active() && tables.slot_clash(appointment) {
            return Err(StoreError::SlotTaken {
                clinician_id: appointment.clinician_id,
                start: appointment.start_time,
            });
        }
        bump_checked(
            &mut tables.appointments,
            "appointment",
            appointment.id,
            appointment.row_version,
            |a| a.row_version,
            appointment,
            |a, v| a.row_version = v,
        )
    }
}
