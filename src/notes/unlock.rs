// Post-signature corrections: unlock request, approval window, revision
// and re-signing. Windows close lazily on access and through
// `expire_unlock_windows`.

use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

use super::lifecycle::NoteLifecycleManager;
use super::types::*;

impl NoteLifecycleManager {
    pub async fn request_unlock(
        &self,
        note_id: Uuid,
        requester_id: Uuid,
        reason: &str,
    ) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        if note.unlock_requested || note.status == NoteStatus::PendingUnlock {
            return Err(WorkflowError::Conflict(format!(
                "note {} already has a pending unlock request",
                note.id
            )));
        }
        let next = note.status.apply(NoteAction::RequestUnlock)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::validation("an unlock reason is required"));
        }

        let now = self.clock.now();
        let from = note.status;
        note.status = next;
        note.unlock_requested = true;
        note.unlock_reason = Some(reason.to_string());
        note.unlock_requested_by = Some(requester_id);
        note.unlock_request_date = Some(now);
        note.unlock_approved_by = None;
        note.unlock_until = None;
        note.updated_at = now;

        self.persist(&mut note).await?;
        self.metrics.record_unlock_requested();
        info!(
            note_id = %note.id,
            requester_id = %requester_id,
            from = %from,
            "Unlock requested"
        );
        Ok(note)
    }

    pub async fn approve_unlock(
        &self,
        note_id: Uuid,
        approver_id: Uuid,
        window_hours: u32,
    ) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        let next = note.status.apply(NoteAction::ApproveUnlock)?;

        let max = self.policy.max_unlock_window_hours;
        if window_hours == 0 || window_hours > max {
            return Err(WorkflowError::validation(format!(
                "unlock window must be between 1 and {max} hours, got {window_hours}"
            )));
        }
        if note.unlock_requested_by == Some(approver_id) {
            return Err(WorkflowError::Forbidden(
                "an unlock request cannot be approved by its requester".to_string(),
            ));
        }

        let now = self.clock.now();
        note.status = next;
        note.unlock_requested = false;
        note.unlock_approved_by = Some(approver_id);
        note.unlock_until = Some(now + Duration::hours(i64::from(window_hours)));
        note.is_locked = false;
        note.updated_at = now;

        self.persist(&mut note).await?;
        self.metrics.record_unlock_approved();
        info!(
            note_id = %note.id,
            approver_id = %approver_id,
            window_hours,
            unlock_until = ?note.unlock_until,
            "Unlock approved"
        );
        Ok(note)
    }

    pub async fn deny_unlock(
        &self,
        note_id: Uuid,
        approver_id: Uuid,
        reason: &str,
    ) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        let next = note.status.apply(NoteAction::DenyUnlock)?;
        if note.unlock_requested_by == Some(approver_id) {
            return Err(WorkflowError::Forbidden(
                "an unlock request cannot be denied by its requester".to_string(),
            ));
        }

        note.status = next;
        note.clear_unlock_request();
        note.close_unlock_window();
        note.updated_at = self.clock.now();

        self.persist(&mut note).await?;
        info!(
            note_id = %note.id,
            approver_id = %approver_id,
            reason = reason.trim(),
            "Unlock denied"
        );
        Ok(note)
    }

    /// Applies changes during an open window, snapshotting the prior content.
    pub async fn revise_note(
        &self,
        note_id: Uuid,
        editor_id: Uuid,
        changes: NoteChanges,
    ) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        note.status.apply(NoteAction::Revise)?;

        let now = self.clock.now();
        if !note.has_active_unlock_window(now) {
            return Err(WorkflowError::invalid_transition(
                "note",
                note.status,
                NoteAction::Revise,
            ));
        }
        if editor_id != note.clinician_id {
            return Err(WorkflowError::Forbidden(
                "only the authoring clinician may revise a note".to_string(),
            ));
        }
        if changes.content.is_empty() {
            return Err(WorkflowError::validation("revision contains no changes"));
        }

        let revision_number = note.revision_count + 1;
        note.revision_history.push(RevisionSnapshot {
            revision_number,
            previous_content: note.content.clone(),
            change_comment: changes.comment.trim().to_string(),
            revised_by: editor_id,
            revised_at: now,
        });
        note.revision_count = revision_number;
        note.merge_content(&changes.content);
        note.updated_at = now;

        self.persist(&mut note).await?;
        self.metrics.record_revision();
        info!(
            note_id = %note.id,
            editor_id = %editor_id,
            revision = revision_number,
            "Note revised"
        );
        Ok(note)
    }

    /// Signs revised content and closes the unlock window.
    pub async fn resign_note(
        &self,
        note_id: Uuid,
        signer_id: Uuid,
        credential: &str,
    ) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        let next = note.status.apply(NoteAction::Resign)?;
        if signer_id != note.clinician_id {
            return Err(WorkflowError::Forbidden(
                "only the authoring clinician may re-sign a note".to_string(),
            ));
        }
        self.verify_signer(signer_id, credential).await?;
        let attestation_text = self.signing_attestation(signer_id, &note.note_type).await?;

        let now = self.clock.now();
        note.status = next;
        note.signed_at = Some(now);
        note.signed_by = Some(signer_id);
        if attestation_text.is_some() {
            note.attestation_text = attestation_text;
        }
        // A co-signature covers one signed version only.
        note.cosigner_id = None;
        note.cosigned_at = None;
        note.versions.push(NoteVersion {
            version_number: note.versions.len() as u32 + 1,
            content: note.content.clone(),
            signed_by: signer_id,
            signed_at: now,
        });
        note.close_unlock_window();
        note.updated_at = now;

        self.persist(&mut note).await?;
        self.metrics.record_note_signed();
        info!(
            note_id = %note.id,
            signer_id = %signer_id,
            version = note.versions.len(),
            "Revised note re-signed"
        );
        Ok(note)
    }

    pub async fn pending_unlock_requests(&self) -> WorkflowResult<Vec<ClinicalNote>> {
        let mut pending = self.notes.notes_with_status(NoteStatus::PendingUnlock).await?;
        pending.sort_by_key(|n| n.unlock_request_date);
        Ok(pending)
    }

    /// Relocks every note whose window has elapsed. Returns how many closed.
    pub async fn expire_unlock_windows(&self) -> WorkflowResult<usize> {
        let candidates = self.notes.notes_with_status(NoteStatus::UnderRevision).await?;
        let mut expired = 0;
        for mut note in candidates {
            match self.relock_if_elapsed(&mut note).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(WorkflowError::Conflict(_)) => {
                    warn!(note_id = %note.id, "Note changed during expiry sweep, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        if expired > 0 {
            info!(expired, "Unlock windows expired");
        }
        Ok(expired)
    }

    pub(super) async fn relock_if_elapsed(&self, note: &mut ClinicalNote) -> WorkflowResult<bool> {
        let now = self.clock.now();
        if !note.unlock_window_elapsed(now) {
            return Ok(false);
        }

        let mut relocked = note.clone();
        relocked.status = relocked.status.apply(NoteAction::ExpireUnlock)?;
        // Unsigned revisions are dropped; revision_history keeps them for audit.
        if let Some(signed) = relocked.versions.last() {
            relocked.content = signed.content.clone();
        }
        relocked.close_unlock_window();
        relocked.updated_at = now;
        self.persist(&mut relocked).await?;

        self.metrics.record_unlock_expired();
        info!(note_id = %note.id, "Unlock window elapsed, note relocked");
        *note = relocked;
        Ok(true)
    }
}
