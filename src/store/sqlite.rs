use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{AttestationStore, NoteStore, SchedulingStore};
use crate::attestation::{AttestationKey, SignatureAttestation};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::notes::{ClinicalNote, NoteStatus};
use crate::scheduling::{
    Appointment, AppointmentStatus, Priority, WaitlistEntry, WaitlistStatus,
};

const ACTIVE_APPOINTMENT_STATUSES: &str = "('scheduled', 'confirmed', 'completed')";

/// SQLite-backed store. The database is the single source of truth; every
/// conditional write checks `row_version` in its `WHERE` clause.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) and optionally migrate.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;
        info!(url = %config.url, "Connected to database");

        let store = Self { pool };
        if config.auto_migrate {
            store.migrate().await?;
        }
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }

    async fn version_failure(
        &self,
        table: &'static str,
        entity: &'static str,
        id: Uuid,
        expected: i64,
    ) -> StoreError {
        let exists = sqlx::query(&format!("SELECT 1 FROM {table} WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await;
        match exists {
            Ok(Some(_)) => StoreError::VersionConflict {
                entity,
                id,
                expected,
            },
            Ok(None) => StoreError::Missing { entity, id },
            Err(err) => StoreError::Database(err),
        }
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn opt_ts(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(ts)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("bad uuid {raw:?}: {e}")))
}

fn parse_opt_uuid(raw: Option<String>) -> Result<Option<Uuid>, StoreError> {
    raw.as_deref().map(parse_uuid).transpose()
}

fn parse_opt_date(raw: Option<String>) -> Result<Option<NaiveDate>, StoreError> {
    raw.map(|d| {
        d.parse::<NaiveDate>()
            .map_err(|e| StoreError::Corrupt(format!("bad date {d:?}: {e}")))
    })
    .transpose()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

fn slot_taken(err: sqlx::Error, appointment: &Appointment) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::SlotTaken {
            clinician_id: appointment.clinician_id,
            start: appointment.start_time,
        },
        _ => StoreError::Database(err),
    }
}

fn note_from_row(row: &SqliteRow) -> Result<ClinicalNote, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(ClinicalNote {
        id: parse_uuid(row.try_get("id")?)?,
        client_id: parse_uuid(row.try_get("client_id")?)?,
        clinician_id: parse_uuid(row.try_get("clinician_id")?)?,
        note_type: row.try_get("note_type")?,
        status: NoteStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown note status {status:?}")))?,
        session_date: parse_opt_date(row.try_get("session_date")?)?,
        appointment_id: parse_opt_uuid(row.try_get("appointment_id")?)?,
        due_date: parse_opt_date(row.try_get("due_date")?)?,
        content: from_json(row.try_get("content")?)?,
        signed_at: parse_opt_ts(row.try_get("signed_at")?)?,
        signed_by: parse_opt_uuid(row.try_get("signed_by")?)?,
        attestation_text: row.try_get("attestation_text")?,
        cosigner_id: parse_opt_uuid(row.try_get("cosigner_id")?)?,
        cosigned_at: parse_opt_ts(row.try_get("cosigned_at")?)?,
        revision_history: from_json(row.try_get("revision_history")?)?,
        revision_count: row.try_get::<i64, _>("revision_count")? as u32,
        versions: from_json(row.try_get("versions")?)?,
        is_locked: row.try_get("is_locked")?,
        unlock_requested: row.try_get("unlock_requested")?,
        unlock_reason: row.try_get("unlock_reason")?,
        unlock_requested_by: parse_opt_uuid(row.try_get("unlock_requested_by")?)?,
        unlock_request_date: parse_opt_ts(row.try_get("unlock_request_date")?)?,
        unlock_approved_by: parse_opt_uuid(row.try_get("unlock_approved_by")?)?,
        unlock_until: parse_opt_ts(row.try_get("unlock_until")?)?,
        created_at: parse_ts(row.try_get("created_at")?)?,
        updated_at: parse_ts(row.try_get("updated_at")?)?,
        row_version: row.try_get("row_version")?,
    })
}

fn attestation_from_row(row: &SqliteRow) -> Result<SignatureAttestation, StoreError> {
    Ok(SignatureAttestation {
        id: parse_uuid(row.try_get("id")?)?,
        role: row.try_get("role")?,
        note_type: row.try_get("note_type")?,
        jurisdiction: row.try_get("jurisdiction")?,
        attestation_text: row.try_get("attestation_text")?,
        is_active: row.try_get("is_active")?,
        created_at: parse_ts(row.try_get("created_at")?)?,
    })
}

fn waitlist_from_row(row: &SqliteRow) -> Result<WaitlistEntry, StoreError> {
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;
    let offered_slot: Option<String> = row.try_get("offered_slot")?;
    Ok(WaitlistEntry {
        id: parse_uuid(row.try_get("id")?)?,
        client_id: parse_uuid(row.try_get("client_id")?)?,
        clinician_id: parse_opt_uuid(row.try_get("clinician_id")?)?,
        criteria: from_json(row.try_get("criteria")?)?,
        priority: Priority::from_label(&priority)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown priority {priority:?}")))?,
        status: WaitlistStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown waitlist status {status:?}")))?,
        offered_slot: offered_slot.as_deref().map(from_json).transpose()?,
        offered_at: parse_opt_ts(row.try_get("offered_at")?)?,
        offer_expires_at: parse_opt_ts(row.try_get("offer_expires_at")?)?,
        appointment_id: parse_opt_uuid(row.try_get("appointment_id")?)?,
        removal_reason: row.try_get("removal_reason")?,
        added_at: parse_ts(row.try_get("added_at")?)?,
        updated_at: parse_ts(row.try_get("updated_at")?)?,
        row_version: row.try_get("row_version")?,
    })
}

fn appointment_from_row(row: &SqliteRow) -> Result<Appointment, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Appointment {
        id: parse_uuid(row.try_get("id")?)?,
        client_id: parse_uuid(row.try_get("client_id")?)?,
        clinician_id: parse_uuid(row.try_get("clinician_id")?)?,
        start_time: parse_ts(row.try_get("start_time")?)?,
        end_time: parse_ts(row.try_get("end_time")?)?,
        appointment_type: row.try_get("appointment_type")?,
        status: AppointmentStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown appointment status {status:?}")))?,
        confirmed_at: parse_opt_ts(row.try_get("confirmed_at")?)?,
        confirmation_method: row.try_get("confirmation_method")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        no_show_risk_score: row.try_get("no_show_risk_score")?,
        no_show_risk_level: row.try_get("no_show_risk_level")?,
        no_show_risk_factors: from_json(row.try_get("no_show_risk_factors")?)?,
        waitlist_entry_id: parse_opt_uuid(row.try_get("waitlist_entry_id")?)?,
        created_at: parse_ts(row.try_get("created_at")?)?,
        updated_at: parse_ts(row.try_get("updated_at")?)?,
        row_version: row.try_get("row_version")?,
    })
}

/// Inserts the appointment inside `tx` after checking for overlaps. The
/// partial unique index backs up the check for identical start times.
async fn insert_appointment_in(
    tx: &mut Transaction<'_, Sqlite>,
    appointment: &Appointment,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO appointments (
            id, client_id, clinician_id, start_time, end_time, appointment_type, status,
            confirmed_at, confirmation_method, cancellation_reason, no_show_risk_score,
            no_show_risk_level, no_show_risk_factors, waitlist_entry_id, created_at,
            updated_at, row_version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(appointment.id.to_string())
    .bind(appointment.client_id.to_string())
    .bind(appointment.clinician_id.to_string())
    .bind(ts(appointment.start_time))
    .bind(ts(appointment.end_time))
    .bind(&appointment.appointment_type)
    .bind(appointment.status.as_str())
    .bind(opt_ts(appointment.confirmed_at))
    .bind(&appointment.confirmation_method)
    .bind(&appointment.cancellation_reason)
    .bind(appointment.no_show_risk_score)
    .bind(&appointment.no_show_risk_level)
    .bind(to_json(&appointment.no_show_risk_factors)?)
    .bind(appointment.waitlist_entry_id.map(|id| id.to_string()))
    .bind(ts(appointment.created_at))
    .bind(ts(appointment.updated_at))
    .bind(appointment.row_version)
    .execute(&mut **tx)
    .await
    .map_err(|e| slot_taken(e, appointment))?;

    if appointment.status.is_active() {
        ensure_no_overlap(tx, appointment).await?;
    }
    Ok(())
}

/// Runs after this transaction has written, so it holds SQLite's write lock
/// and no other writer can slip in between check and commit.
async fn ensure_no_overlap(
    tx: &mut Transaction<'_, Sqlite>,
    appointment: &Appointment,
) -> Result<(), StoreError> {
    let clash = sqlx::query(&format!(
        "SELECT id FROM appointments
         WHERE clinician_id = ?1 AND id != ?2 AND start_time < ?3 AND ?4 < end_time
           AND status IN {ACTIVE_APPOINTMENT_STATUSES}
         LIMIT 1"
    ))
    .bind(appointment.clinician_id.to_string())
    .bind(appointment.id.to_string())
    .bind(ts(appointment.end_time))
    .bind(ts(appointment.start_time))
    .fetch_optional(&mut **tx)
    .await?;

    if clash.is_some() {
        return Err(StoreError::SlotTaken {
            clinician_id: appointment.clinician_id,
            start: appointment.start_time,
        });
    }
    Ok(())
}

#[async_trait]
impl NoteStore for SqliteStore {
    async fn insert_note(&self, note: &ClinicalNote) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO clinical_notes (
                id, client_id, clinician_id, note_type, status, session_date, appointment_id,
                due_date, content, signed_at, signed_by, attestation_text, cosigner_id,
                cosigned_at, revision_history, revision_count, versions, is_locked,
                unlock_requested, unlock_reason, unlock_requested_by, unlock_request_date,
                unlock_approved_by, unlock_until, created_at, updated_at, row_version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)
            "#,
        )
        .bind(note.id.to_string())
        .bind(note.client_id.to_string())
        .bind(note.clinician_id.to_string())
        .bind(&note.note_type)
        .bind(note.status.as_str())
        .bind(note.session_date.map(|d| d.to_string()))
        .bind(note.appointment_id.map(|id| id.to_string()))
        .bind(note.due_date.map(|d| d.to_string()))
        .bind(to_json(&note.content)?)
        .bind(opt_ts(note.signed_at))
        .bind(note.signed_by.map(|id| id.to_string()))
        .bind(&note.attestation_text)
        .bind(note.cosigner_id.map(|id| id.to_string()))
        .bind(opt_ts(note.cosigned_at))
        .bind(to_json(&note.revision_history)?)
        .bind(i64::from(note.revision_count))
        .bind(to_json(&note.versions)?)
        .bind(note.is_locked)
        .bind(note.unlock_requested)
        .bind(&note.unlock_reason)
        .bind(note.unlock_requested_by.map(|id| id.to_string()))
        .bind(opt_ts(note.unlock_request_date))
        .bind(note.unlock_approved_by.map(|id| id.to_string()))
        .bind(opt_ts(note.unlock_until))
        .bind(ts(note.created_at))
        .bind(ts(note.updated_at))
        .bind(note.row_version)
        .execute(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate {
                entity: "clinical note",
                id: note.id,
            },
            _ => StoreError::Database(err),
        })?;
        Ok(())
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<ClinicalNote>, StoreError> {
        let row = sqlx::query("SELECT * FROM clinical_notes WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(note_from_row).transpose()
    }

    async fn update_note(&self, note: &ClinicalNote) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE clinical_notes SET
                client_id = ?1, clinician_id = ?2, note_type = ?3, status = ?4,
                session_date = ?5, appointment_id = ?6, due_date = ?7, content = ?8,
                signed_at = ?9, signed_by = ?10, attestation_text = ?11, cosigner_id = ?12,
                cosigned_at = ?13, revision_history = ?14, revision_count = ?15,
                versions = ?16, is_locked = ?17, unlock_requested = ?18, unlock_reason = ?19,
                unlock_requested_by = ?20, unlock_request_date = ?21,
                unlock_approved_by = ?22, unlock_until = ?23, updated_at = ?24,
                row_version = row_version + 1
            WHERE id = ?25 AND row_version = ?26
            "#,
        )
        .bind(note.client_id.to_string())
        .bind(note.clinician_id.to_string())
        .bind(&note.note_type)
        .bind(note.status.as_str())
        .bind(note.session_date.map(|d| d.to_string()))
        .bind(note.appointment_id.map(|id| id.to_string()))
        .bind(note.due_date.map(|d| d.to_string()))
        .bind(to_json(&note.content)?)
        .bind(opt_ts(note.signed_at))
        .bind(note.signed_by.map(|id| id.to_string()))
        .bind(&note.attestation_text)
        .bind(note.cosigner_id.map(|id| id.to_string()))
        .bind(opt_ts(note.cosigned_at))
        .bind(to_json(&note.revision_history)?)
        .bind(i64::from(note.revision_count))
        .bind(to_json(&note.versions)?)
        .bind(note.is_locked)
        .bind(note.unlock_requested)
        .bind(&note.unlock_reason)
        .bind(note.unlock_requested_by.map(|id| id.to_string()))
        .bind(opt_ts(note.unlock_request_date))
        .bind(note.unlock_approved_by.map(|id| id.to_string()))
        .bind(opt_ts(note.unlock_until))
        .bind(ts(note.updated_at))
        .bind(note.id.to_string())
        .bind(note.row_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .version_failure("clinical_notes", "clinical note", note.id, note.row_version)
                .await);
        }
        Ok(())
    }

    async fn notes_with_status(&self, status: NoteStatus) -> Result<Vec<ClinicalNote>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM clinical_notes WHERE status = ?1 ORDER BY created_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(note_from_row).collect()
    }
}

#[async_trait]
impl AttestationStore for SqliteStore {
    async fn find_active_attestation(
        &self,
        key: &AttestationKey,
    ) -> Result<Option<SignatureAttestation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM signature_attestations
            WHERE role = ?1 AND jurisdiction = ?2 AND note_type = ?3 COLLATE NOCASE
              AND is_active = 1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&key.role)
        .bind(&key.jurisdiction)
        .bind(&key.note_type)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(attestation_from_row).transpose()
    }

    async fn upsert_attestation(
        &self,
        attestation: &SignatureAttestation,
    ) -> Result<SignatureAttestation, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE signature_attestations
            SET attestation_text = ?1, is_active = 1
            WHERE role = ?2 AND jurisdiction = ?3 AND note_type = ?4 COLLATE NOCASE
            "#,
        )
        .bind(&attestation.attestation_text)
        .bind(&attestation.role)
        .bind(&attestation.jurisdiction)
        .bind(&attestation.note_type)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO signature_attestations
                    (id, role, note_type, jurisdiction, attestation_text, is_active, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(attestation.id.to_string())
            .bind(&attestation.role)
            .bind(&attestation.note_type)
            .bind(&attestation.jurisdiction)
            .bind(&attestation.attestation_text)
            .bind(attestation.is_active)
            .bind(ts(attestation.created_at))
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(
            r#"
            SELECT * FROM signature_attestations
            WHERE role = ?1 AND jurisdiction = ?2 AND note_type = ?3 COLLATE NOCASE
            "#,
        )
        .bind(&attestation.role)
        .bind(&attestation.jurisdiction)
        .bind(&attestation.note_type)
        .fetch_one(&mut *tx)
        .await?;
        let stored = attestation_from_row(&row)?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn set_attestation_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE signature_attestations SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing {
                entity: "attestation",
                id,
            });
        }
        Ok(())
    }

    async fn list_attestations(&self) -> Result<Vec<SignatureAttestation>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM signature_attestations ORDER BY role, jurisdiction, note_type",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(attestation_from_row).collect()
    }
}

#[async_trait]
impl SchedulingStore for SqliteStore {
    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO waitlist_entries (
                id, client_id, clinician_id, criteria, priority, status, offered_slot,
                offered_at, offer_expires_at, appointment_id, removal_reason, added_at,
                updated_at, row_version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.client_id.to_string())
        .bind(entry.clinician_id.map(|id| id.to_string()))
        .bind(to_json(&entry.criteria)?)
        .bind(entry.priority.as_str())
        .bind(entry.status.as_str())
        .bind(entry.offered_slot.as_ref().map(to_json).transpose()?)
        .bind(opt_ts(entry.offered_at))
        .bind(opt_ts(entry.offer_expires_at))
        .bind(entry.appointment_id.map(|id| id.to_string()))
        .bind(&entry.removal_reason)
        .bind(ts(entry.added_at))
        .bind(ts(entry.updated_at))
        .bind(entry.row_version)
        .execute(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate {
                entity: "waitlist entry",
                id: entry.id,
            },
            _ => StoreError::Database(err),
        })?;
        Ok(())
    }

    async fn get_waitlist_entry(&self, id: Uuid) -> Result<Option<WaitlistEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM waitlist_entries WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(waitlist_from_row).transpose()
    }

    async fn update_waitlist_entry(&self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        let result = update_waitlist_query(entry)?.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(self
                .version_failure("waitlist_entries", "waitlist entry", entry.id, entry.row_version)
                .await);
        }
        Ok(())
    }

    async fn list_waitlist(
        &self,
        status: Option<WaitlistStatus>,
    ) -> Result<Vec<WaitlistEntry>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM waitlist_entries WHERE status = ?1 ORDER BY added_at ASC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM waitlist_entries ORDER BY added_at ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(waitlist_from_row).collect()
    }

    async fn overlapping_appointments(
        &self,
        clinician_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM appointments
             WHERE clinician_id = ?1 AND start_time < ?2 AND ?3 < end_time
               AND status IN {ACTIVE_APPOINTMENT_STATUSES}
             ORDER BY start_time ASC"
        ))
        .bind(clinician_id.to_string())
        .bind(ts(end))
        .bind(ts(start))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_appointment_in(&mut tx, appointment).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_booking(
        &self,
        appointment: &Appointment,
        entry: &WaitlistEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = update_waitlist_query(entry)?.execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            drop(tx);
            return Err(self
                .version_failure("waitlist_entries", "waitlist entry", entry.id, entry.row_version)
                .await);
        }
        insert_appointment_in(&mut tx, appointment).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let row = sqlx::query("SELECT * FROM appointments WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(appointment_from_row).transpose()
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE appointments SET
                start_time = ?1, end_time = ?2, appointment_type = ?3, status = ?4,
                confirmed_at = ?5, confirmation_method = ?6, cancellation_reason = ?7,
                no_show_risk_score = ?8, no_show_risk_level = ?9, no_show_risk_factors = ?10,
                updated_at = ?11, row_version = row_version + 1
            WHERE id = ?12 AND row_version = ?13
            "#,
        )
        .bind(ts(appointment.start_time))
        .bind(ts(appointment.end_time))
        .bind(&appointment.appointment_type)
        .bind(appointment.status.as_str())
        .bind(opt_ts(appointment.confirmed_at))
        .bind(&appointment.confirmation_method)
        .bind(&appointment.cancellation_reason)
        .bind(appointment.no_show_risk_score)
        .bind(&appointment.no_show_risk_level)
        .bind(to_json(&appointment.no_show_risk_factors)?)
        .bind(ts(appointment.updated_at))
        .bind(appointment.id.to_string())
        .bind(appointment.row_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| slot_taken(e, appointment))?;

        if result.rows_affected() == 0 {
            drop(tx);
            return Err(self
                .version_failure("appointments", "appointment", appointment.id, appointment.row_version)
                .await);
        }
        if appointment.status.is_active() {
            ensure_no_overlap(&mut tx, appointment).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn update_waitlist_query(
    entry: &WaitlistEntry,
) -> Result<sqlx::query::Query<'static, Sqlite, sqlx::sqlite::SqliteArguments<'static>>, StoreError> {
    Ok(sqlx::query(
        r#"
        UPDATE waitlist_entries SET
            clinician_id = ?1, criteria = ?2, priority = ?3, status = ?4, offered_slot = ?5,
            offered_at = ?6, offer_expires_at = ?7, appointment_id = ?8, removal_reason = ?9,
            updated_at = ?10, row_version = row_version + 1
        WHERE id = ?11 AND row_version = ?12
        "#,
    )
    .bind(entry.clinician_id.map(|id| id.to_string()))
    .bind(to_json(&entry.criteria)?)
    .bind(entry.priority.as_str())
    .bind(entry.status.as_str())
    .bind(entry.offered_slot.as_ref().map(to_json).transpose()?)
    .bind(opt_ts(entry.offered_at))
    .bind(opt_ts(entry.offer_expires_at))
    .bind(entry.appointment_id.map(|id| id.to_string()))
    .bind(entry.removal_reason.clone())
    .bind(ts(entry.updated_at))
    .bind(entry.id.to_string())
    .bind(entry.row_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{NewNote, NoteContent};
    use crate::scheduling::{AppointmentSlot, WaitlistCriteria};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ehr.db").display());
        let store = SqliteStore::connect(&DatabaseConfig {
            url,
            max_connections: 4,
            auto_migrate: true,
        })
        .await
        .unwrap();
        (store, dir)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 3, hour, 0, 0).unwrap()
    }

    fn appointment(clinician_id: Uuid, hour: u32) -> Appointment {
        Appointment::new(
            Uuid::new_v4(),
            AppointmentSlot {
                clinician_id,
                start_time: at(hour),
                end_time: at(hour) + Duration::minutes(50),
            },
            "Individual Therapy",
            Utc::now(),
        )
    }

    fn entry() -> WaitlistEntry {
        let now = Utc::now();
        WaitlistEntry {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            clinician_id: None,
            criteria: WaitlistCriteria::default(),
            priority: Priority::High,
            status: WaitlistStatus::Offered,
            offered_slot: None,
            offered_at: Some(now),
            offer_expires_at: Some(now + Duration::hours(48)),
            appointment_id: None,
            removal_reason: None,
            added_at: now,
            updated_at: now,
            row_version: 0,
        }
    }

    #[tokio::test]
    async fn test_note_survives_round_trip_and_versions_bump() {
        let (store, _dir) = store().await;
        let mut content = NoteContent::new();
        content.insert("plan".into(), json!({"frequency": "weekly"}));
        let note = ClinicalNote::new_draft(
            NewNote {
                client_id: Uuid::new_v4(),
                clinician_id: Uuid::new_v4(),
                note_type: "Progress Note".into(),
                session_date: NaiveDate::from_ymd_opt(2026, 6, 3),
                content,
                ..Default::default()
            },
            Utc.with_ymd_and_hms(2026, 6, 3, 17, 30, 0).unwrap(),
            3,
        );
        store.insert_note(&note).await.unwrap();
        assert_eq!(store.get_note(note.id).await.unwrap(), Some(note.clone()));

        let mut edited = note.clone();
        edited.status = NoteStatus::Signed;
        store.update_note(&edited).await.unwrap();

        let err = store.update_note(&note).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let stored = store.get_note(note.id).await.unwrap().unwrap();
        assert_eq!(stored.row_version, 1);
        assert_eq!(
            store.notes_with_status(NoteStatus::Signed).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_overlapping_insert_is_refused() {
        let (store, _dir) = store().await;
        let clinician = Uuid::new_v4();
        store.insert_appointment(&appointment(clinician, 10)).await.unwrap();

        let mut same_start = appointment(clinician, 10);
        let err = store.insert_appointment(&same_start).await.unwrap_err();
        assert!(matches!(err, StoreError::SlotTaken { .. }));

        same_start.start_time += Duration::minutes(20);
        same_start.end_time += Duration::minutes(20);
        let err = store.insert_appointment(&same_start).await.unwrap_err();
        assert!(matches!(err, StoreError::SlotTaken { .. }));

        store.insert_appointment(&appointment(clinician, 11)).await.unwrap();
        assert_eq!(
            store
                .overlapping_appointments(clinician, at(9), at(12))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_commit_booking_is_all_or_nothing() {
        let (store, _dir) = store().await;
        let clinician = Uuid::new_v4();
        store.insert_appointment(&appointment(clinician, 10)).await.unwrap();

        let waiting = entry();
        store.insert_waitlist_entry(&waiting).await.unwrap();

        let clash = appointment(clinician, 10);
        let mut booked = waiting.clone();
        booked.status = WaitlistStatus::Booked;
        booked.appointment_id = Some(clash.id);

        let err = store.commit_booking(&clash, &booked).await.unwrap_err();
        assert!(matches!(err, StoreError::SlotTaken { .. }));

        let untouched = store.get_waitlist_entry(waiting.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, WaitlistStatus::Offered);
        assert_eq!(untouched.row_version, 0);
        assert!(store.get_appointment(clash.id).await.unwrap().is_none());

        let free = appointment(clinician, 14);
        booked.appointment_id = Some(free.id);
        store.commit_booking(&free, &booked).await.unwrap();
        let stored = store.get_waitlist_entry(waiting.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WaitlistStatus::Booked);
        assert_eq!(stored.row_version, 1);
    }

    #[tokio::test]
    async fn test_cancelled_appointment_frees_slot() {
        let (store, _dir) = store().await;
        let clinician = Uuid::new_v4();
        let mut first = appointment(clinician, 10);
        store.insert_appointment(&first).await.unwrap();

        first.status = AppointmentStatus::Cancelled;
        store.update_appointment(&first).await.unwrap();

        store.insert_appointment(&appointment(clinician, 10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_attestation_upsert_keeps_one_row_per_key() {
        let (store, _dir) = store().await;
        let first = SignatureAttestation {
            id: Uuid::new_v4(),
            role: "ADMIN".into(),
            note_type: "Progress Note".into(),
            jurisdiction: "GA".into(),
            attestation_text: "v1".into(),
            is_active: true,
            created_at: Utc::now(),
        };
        store.upsert_attestation(&first).await.unwrap();

        let second = SignatureAttestation {
            id: Uuid::new_v4(),
            note_type: "progress note".into(),
            attestation_text: "v2".into(),
            ..first.clone()
        };
        let stored = store.upsert_attestation(&second).await.unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.attestation_text, "v2");

        let found = store
            .find_active_attestation(&AttestationKey::new("ADMIN", "PROGRESS NOTE", "GA"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.attestation_text, "v2");
        assert_eq!(store.list_attestations().await.unwrap().len(), 1);
    }
}
