// Clinical note lifecycle: draft -> signed -> co-signed, plus locking.
// Post-signature unlock and revision operations live in `unlock.rs`.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::attestation::AttestationResolver;
use crate::clock::Clock;
use crate::config::NotesConfig;
use crate::directory::{CredentialVerifier, StaffDirectory};
use crate::error::{WorkflowError, WorkflowResult};
use crate::observability::WorkflowMetrics;
use crate::store::NoteStore;

use super::types::*;

impl NoteStatus {
    /// The transition table. Anything not listed is rejected.
    pub fn apply(self, action: NoteAction) -> WorkflowResult<NoteStatus> {
        use NoteAction::*;
        use NoteStatus::*;

        let next = match (self, action) {
            (Draft, EditDraft) => Draft,
            (Draft, Sign) => Signed,
            (Signed | Locked, CoSign) => self,
            (Signed, Lock) => Locked,
            (Signed | Locked, RequestUnlock) => PendingUnlock,
            (PendingUnlock, ApproveUnlock) => UnderRevision,
            (PendingUnlock, DenyUnlock) => Locked,
            (UnderRevision, Revise) => UnderRevision,
            (UnderRevision, Resign) => Signed,
            (UnderRevision, ExpireUnlock) => Locked,
            _ => return Err(WorkflowError::invalid_transition("note", self, action)),
        };
        Ok(next)
    }
}

pub struct NoteLifecycleManager {
    pub(super) notes: Arc<dyn NoteStore>,
    pub(super) attestations: Arc<AttestationResolver>,
    pub(super) staff: Arc<dyn StaffDirectory>,
    pub(super) credentials: Arc<dyn CredentialVerifier>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) policy: NotesConfig,
    pub(super) metrics: Arc<WorkflowMetrics>,
}

impl NoteLifecycleManager {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        attestations: Arc<AttestationResolver>,
        staff: Arc<dyn StaffDirectory>,
        credentials: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
        policy: NotesConfig,
    ) -> Self {
        Self {
            notes,
            attestations,
            staff,
            credentials,
            clock,
            policy,
            metrics: Arc::new(WorkflowMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<WorkflowMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> &NotesConfig {
        &self.policy
    }

    pub async fn create_note(&self, input: NewNote) -> WorkflowResult<ClinicalNote> {
        if input.client_id.is_nil() {
            return Err(WorkflowError::validation("client_id is required"));
        }
        if input.clinician_id.is_nil() {
            return Err(WorkflowError::validation("clinician_id is required"));
        }

        let note = ClinicalNote::new_draft(
            input,
            self.clock.now(),
            self.policy.documentation_due_days,
        );
        self.notes.insert_note(&note).await?;
        self.metrics.record_note_created();

        info!(
            note_id = %note.id,
            client_id = %note.client_id,
            clinician_id = %note.clinician_id,
            note_type = %note.note_type,
            "Draft note created"
        );
        Ok(note)
    }

    /// Reads a note, relocking it first if its unlock window has run out.
    pub async fn get_note(&self, note_id: Uuid) -> WorkflowResult<ClinicalNote> {
        self.load(note_id).await
    }

    pub async fn update_draft(
        &self,
        note_id: Uuid,
        editor_id: Uuid,
        update: DraftUpdate,
    ) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        note.status.apply(NoteAction::EditDraft)?;
        if editor_id != note.clinician_id {
            return Err(WorkflowError::Forbidden(
                "only the authoring clinician may edit a draft".to_string(),
            ));
        }
        if update.is_empty() {
            return Err(WorkflowError::validation("draft update contains no changes"));
        }

        if let Some(note_type) = update.note_type {
            note.note_type = note_type.trim().to_string();
        }
        if let Some(session_date) = update.session_date {
            note.session_date = Some(session_date);
            if update.due_date.is_none() && note.due_date.is_none() {
                note.due_date = Some(
                    session_date + chrono::Duration::days(self.policy.documentation_due_days),
                );
            }
        }
        if let Some(appointment_id) = update.appointment_id {
            note.appointment_id = Some(appointment_id);
        }
        if let Some(due_date) = update.due_date {
            note.due_date = Some(due_date);
        }
        note.merge_content(&update.content);
        note.updated_at = self.clock.now();

        self.persist(&mut note).await?;
        Ok(note)
    }

    pub async fn sign_note(
        &self,
        note_id: Uuid,
        signer_id: Uuid,
        credential: &str,
    ) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        let next = note.status.apply(NoteAction::Sign)?;

        let missing = note.missing_required_fields(&self.policy.standalone_note_types);
        if !missing.is_empty() {
            return Err(WorkflowError::validation(format!(
                "cannot sign note {}: missing {}",
                note.id,
                missing.join(", ")
            )));
        }
        if signer_id != note.clinician_id {
            return Err(WorkflowError::Forbidden(
                "only the authoring clinician may sign a note".to_string(),
            ));
        }
        self.verify_signer(signer_id, credential).await?;
        let attestation_text = self.signing_attestation(signer_id, &note.note_type).await?;

        let now = self.clock.now();
        let from = note.status;
        note.status = next;
        note.signed_at = Some(now);
        note.signed_by = Some(signer_id);
        note.attestation_text = attestation_text;
        note.is_locked = true;
        note.versions.push(NoteVersion {
            version_number: note.versions.len() as u32 + 1,
            content: note.content.clone(),
            signed_by: signer_id,
            signed_at: now,
        });
        note.updated_at = now;

        self.persist(&mut note).await?;
        self.metrics.record_note_signed();
        info!(
            note_id = %note.id,
            signer_id = %signer_id,
            from = %from,
            to = %note.status,
            version = note.versions.len(),
            "Note signed"
        );
        Ok(note)
    }

    pub async fn cosign_note(
        &self,
        note_id: Uuid,
        cosigner_id: Uuid,
    ) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        note.status.apply(NoteAction::CoSign)?;

        if let Some(existing) = note.cosigner_id.filter(|_| note.is_cosigned()) {
            return Err(WorkflowError::Conflict(format!(
                "note {} is already co-signed by {}",
                note.id, existing
            )));
        }
        if note
            .versions
            .last()
            .is_some_and(|signed| signed.content != note.content)
        {
            return Err(WorkflowError::Conflict(format!(
                "note {} content differs from its last signed version",
                note.id
            )));
        }
        if cosigner_id == note.clinician_id {
            return Err(WorkflowError::Forbidden(
                "the authoring clinician cannot co-sign their own note".to_string(),
            ));
        }
        if !self.staff.supervises(cosigner_id, note.clinician_id).await? {
            return Err(WorkflowError::Forbidden(format!(
                "{} does not supervise clinician {}",
                cosigner_id, note.clinician_id
            )));
        }

        let now = self.clock.now();
        note.cosigner_id = Some(cosigner_id);
        note.cosigned_at = Some(now);
        note.updated_at = now;

        self.persist(&mut note).await?;
        self.metrics.record_note_cosigned();
        info!(note_id = %note.id, cosigner_id = %cosigner_id, "Note co-signed");
        Ok(note)
    }

    pub async fn lock_note(&self, note_id: Uuid) -> WorkflowResult<ClinicalNote> {
        let mut note = self.load(note_id).await?;
        let next = note.status.apply(NoteAction::Lock)?;
        let from = note.status;

        note.status = next;
        note.is_locked = true;
        note.updated_at = self.clock.now();

        self.persist(&mut note).await?;
        info!(note_id = %note.id, from = %from, to = %note.status, "Note locked");
        Ok(note)
    }

    pub(super) async fn load(&self, note_id: Uuid) -> WorkflowResult<ClinicalNote> {
        let mut note = self
            .notes
            .get_note(note_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("clinical note", note_id))?;
        self.relock_if_elapsed(&mut note).await?;
        Ok(note)
    }

    /// Writes `note` conditionally on the version it was read at.
    pub(super) async fn persist(&self, note: &mut ClinicalNote) -> WorkflowResult<()> {
        if let Err(err) = self.notes.update_note(note).await {
            let err = WorkflowError::from(err);
            if matches!(err, WorkflowError::Conflict(_)) {
                warn!(note_id = %note.id, row_version = note.row_version, "Lost update race on note");
            }
            return Err(err);
        }
        note.row_version += 1;
        Ok(())
    }

    pub(super) async fn verify_signer(&self, signer_id: Uuid, credential: &str) -> WorkflowResult<()> {
        if credential.is_empty()
            || !self
                .credentials
                .verify_credential(signer_id, credential)
                .await?
        {
            self.metrics.record_auth_failure();
            warn!(signer_id = %signer_id, "Signing credential rejected");
            return Err(WorkflowError::Authentication(
                "signing credential does not match".to_string(),
            ));
        }
        Ok(())
    }

    /// Attestation text for the signer's role and jurisdiction. When
    /// attestations are optional a missing row signs without one.
    pub(super) async fn signing_attestation(
        &self,
        signer_id: Uuid,
        note_type: &str,
    ) -> WorkflowResult<Option<String>> {
        let profile = self.staff.staff_profile(signer_id).await?;
        let Some(profile) = profile else {
            if self.policy.require_attestation {
                return Err(WorkflowError::Forbidden(format!(
                    "{} has no staff profile to sign under",
                    signer_id
                )));
            }
            return Ok(None);
        };

        match self
            .attestations
            .resolve_attestation(&profile.role, note_type, &profile.jurisdiction)
            .await
        {
            Ok(attestation) => Ok(Some(attestation.attestation_text)),
            Err(WorkflowError::NotFound(_)) if !self.policy.require_attestation => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::NewAttestation;
    use crate::clock::ManualClock;
    use crate::directory::{MockCredentialVerifier, MockStaffDirectory, StaffProfile};
    use crate::store::InMemoryStore;
    use chrono::{NaiveDate, TimeZone, Utc};
    use mockall::predicate::*;
    use serde_json::json;

    const ALL_STATUSES: [NoteStatus; 5] = [
        NoteStatus::Draft,
        NoteStatus::Signed,
        NoteStatus::Locked,
        NoteStatus::PendingUnlock,
        NoteStatus::UnderRevision,
    ];

    struct Harness {
        manager: NoteLifecycleManager,
        clinician: Uuid,
    }

    async fn harness(
        credentials: MockCredentialVerifier,
        staff: MockStaffDirectory,
        clinician: Uuid,
    ) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 15, 0, 0).unwrap(),
        ));
        let resolver = Arc::new(AttestationResolver::new(store.clone(), clock.clone()));
        resolver
            .upsert_attestation(NewAttestation {
                role: "CLINICIAN".into(),
                note_type: "ALL".into(),
                jurisdiction: "US".into(),
                attestation_text: "I attest this note is accurate.".into(),
            })
            .await
            .unwrap();

        let manager = NoteLifecycleManager::new(
            store,
            resolver,
            Arc::new(staff),
            Arc::new(credentials),
            clock,
            NotesConfig::default(),
        );
        Harness { manager, clinician }
    }

    fn clinician_profile(id: Uuid) -> StaffProfile {
        StaffProfile {
            user_id: id,
            role: "CLINICIAN".into(),
            jurisdiction: "GA".into(),
        }
    }

    fn complete_draft(clinician: Uuid) -> NewNote {
        let mut content = NoteContent::new();
        content.insert("assessment".into(), json!("stable mood"));
        NewNote {
            client_id: Uuid::new_v4(),
            clinician_id: clinician,
            note_type: "Progress Note".into(),
            session_date: NaiveDate::from_ymd_opt(2026, 5, 4),
            appointment_id: Some(Uuid::new_v4()),
            due_date: None,
            content,
        }
    }

    #[test]
    fn test_transition_table_accepts_documented_edges() {
        use NoteAction::*;
        use NoteStatus::*;
        assert_eq!(Draft.apply(Sign).unwrap(), Signed);
        assert_eq!(Signed.apply(CoSign).unwrap(), Signed);
        assert_eq!(Locked.apply(CoSign).unwrap(), Locked);
        assert_eq!(Signed.apply(Lock).unwrap(), Locked);
        assert_eq!(Signed.apply(RequestUnlock).unwrap(), PendingUnlock);
        assert_eq!(Locked.apply(RequestUnlock).unwrap(), PendingUnlock);
        assert_eq!(PendingUnlock.apply(ApproveUnlock).unwrap(), UnderRevision);
        assert_eq!(PendingUnlock.apply(DenyUnlock).unwrap(), Locked);
        assert_eq!(UnderRevision.apply(Revise).unwrap(), UnderRevision);
        assert_eq!(UnderRevision.apply(Resign).unwrap(), Signed);
        assert_eq!(UnderRevision.apply(ExpireUnlock).unwrap(), Locked);
    }

    #[test]
    fn test_sign_only_from_draft() {
        for status in ALL_STATUSES {
            let result = status.apply(NoteAction::Sign);
            if status == NoteStatus::Draft {
                assert!(result.is_ok());
            } else {
                let err = result.unwrap_err();
                assert_eq!(
                    err,
                    WorkflowError::InvalidStateTransition {
                        entity: "note",
                        current: status.to_string(),
                        requested: "sign".to_string(),
                    }
                );
            }
        }
    }

    #[test]
    fn test_revise_only_under_revision() {
        for status in ALL_STATUSES {
            assert_eq!(
                status.apply(NoteAction::Revise).is_ok(),
                status == NoteStatus::UnderRevision
            );
        }
    }

    #[tokio::test]
    async fn test_sign_with_valid_credential() {
        let clinician = Uuid::new_v4();
        let mut credentials = MockCredentialVerifier::new();
        credentials
            .expect_verify_credential()
            .with(eq(clinician), eq("2468"))
            .times(1)
            .returning(|_, _| Ok(true));
        let mut staff = MockStaffDirectory::new();
        staff
            .expect_staff_profile()
            .returning(|id| Ok(Some(clinician_profile(id))));

        let h = harness(credentials, staff, clinician).await;
        let draft = h.manager.create_note(complete_draft(h.clinician)).await.unwrap();
        let signed = h.manager.sign_note(draft.id, h.clinician, "2468").await.unwrap();

        assert_eq!(signed.status, NoteStatus::Signed);
        assert!(signed.signed_at.is_some());
        assert!(signed.is_locked);
        assert_eq!(signed.versions.len(), 1);
        assert_eq!(signed.versions[0].content, draft.content);
        assert_eq!(
            signed.attestation_text.as_deref(),
            Some("I attest this note is accurate.")
        );
    }

    #[tokio::test]
    async fn test_sign_with_invalid_credential_leaves_note_untouched() {
        let clinician = Uuid::new_v4();
        let mut credentials = MockCredentialVerifier::new();
        credentials
            .expect_verify_credential()
            .returning(|_, _| Ok(false));
        let staff = MockStaffDirectory::new();

        let h = harness(credentials, staff, clinician).await;
        let draft = h.manager.create_note(complete_draft(h.clinician)).await.unwrap();
        let err = h
            .manager
            .sign_note(draft.id, h.clinician, "0000")
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Authentication(_)));
        let reloaded = h.manager.get_note(draft.id).await.unwrap();
        assert_eq!(reloaded, draft);
    }

    #[tokio::test]
    async fn test_sign_requires_fields_before_checking_credential() {
        let clinician = Uuid::new_v4();
        let mut credentials = MockCredentialVerifier::new();
        credentials.expect_verify_credential().never();
        let staff = MockStaffDirectory::new();

        let h = harness(credentials, staff, clinician).await;
        let mut input = complete_draft(h.clinician);
        input.session_date = None;
        let draft = h.manager.create_note(input).await.unwrap();

        let err = h
            .manager
            .sign_note(draft.id, h.clinician, "2468")
            .await
            .unwrap_err();
        match err {
            WorkflowError::Validation(msg) => assert!(msg.contains("session_date")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_only_author_may_sign() {
        let clinician = Uuid::new_v4();
        let mut credentials = MockCredentialVerifier::new();
        credentials.expect_verify_credential().never();
        let h = harness(credentials, MockStaffDirectory::new(), clinician).await;
        let draft = h.manager.create_note(complete_draft(h.clinician)).await.unwrap();

        let err = h
            .manager
            .sign_note(draft.id, Uuid::new_v4(), "2468")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_cosign_requires_supervision() {
        let clinician = Uuid::new_v4();
        let supervisor = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let mut credentials = MockCredentialVerifier::new();
        credentials.expect_verify_credential().returning(|_, _| Ok(true));
        let mut staff = MockStaffDirectory::new();
        staff
            .expect_staff_profile()
            .returning(|id| Ok(Some(clinician_profile(id))));
        staff
            .expect_supervises()
            .returning(move |sup, _| Ok(sup == supervisor));

        let h = harness(credentials, staff, clinician).await;
        let draft = h.manager.create_note(complete_draft(h.clinician)).await.unwrap();

        let err = h.manager.cosign_note(draft.id, supervisor).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStateTransition { .. }));

        h.manager.sign_note(draft.id, h.clinician, "1").await.unwrap();

        let err = h.manager.cosign_note(draft.id, stranger).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));

        let cosigned = h.manager.cosign_note(draft.id, supervisor).await.unwrap();
        assert_eq!(cosigned.cosigner_id, Some(supervisor));
        assert!(cosigned.cosigned_at.is_some());
        assert_eq!(cosigned.status, NoteStatus::Signed);

        let err = h.manager.cosign_note(draft.id, supervisor).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_draft_updates_only_while_draft() {
        let clinician = Uuid::new_v4();
        let mut credentials = MockCredentialVerifier::new();
        credentials.expect_verify_credential().returning(|_, _| Ok(true));
        let mut staff = MockStaffDirectory::new();
        staff
            .expect_staff_profile()
            .returning(|id| Ok(Some(clinician_profile(id))));

        let h = harness(credentials, staff, clinician).await;
        let mut input = complete_draft(h.clinician);
        input.session_date = None;
        let draft = h.manager.create_note(input).await.unwrap();
        assert_eq!(draft.due_date, None);

        let updated = h
            .manager
            .update_draft(
                draft.id,
                h.clinician,
                DraftUpdate {
                    session_date: NaiveDate::from_ymd_opt(2026, 5, 1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.due_date, NaiveDate::from_ymd_opt(2026, 5, 4));

        h.manager.sign_note(draft.id, h.clinician, "1").await.unwrap();
        let mut content = NoteContent::new();
        content.insert("plan".into(), json!("late edit"));
        let err = h
            .manager
            .update_draft(
                draft.id,
                h.clinician,
                DraftUpdate {
                    content,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_only_author_edits_draft() {
        let h = harness(
            MockCredentialVerifier::new(),
            MockStaffDirectory::new(),
            Uuid::new_v4(),
        )
        .await;
        let draft = h.manager.create_note(complete_draft(h.clinician)).await.unwrap();

        let mut content = NoteContent::new();
        content.insert("plan".into(), json!("someone else's plan"));
        let err = h
            .manager
            .update_draft(
                draft.id,
                Uuid::new_v4(),
                DraftUpdate {
                    content,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));

        let stored = h.manager.get_note(draft.id).await.unwrap();
        assert_eq!(stored.content, draft.content);
        assert_eq!(stored.row_version, draft.row_version);
    }

    #[tokio::test]
    async fn test_create_rejects_nil_client() {
        let h = harness(
            MockCredentialVerifier::new(),
            MockStaffDirectory::new(),
            Uuid::new_v4(),
        )
        .await;
        let mut input = complete_draft(h.clinician);
        input.client_id = Uuid::nil();
        let err = h.manager.create_note(input).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }
}
