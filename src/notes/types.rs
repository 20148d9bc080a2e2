use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Free-form clinical note body (assessment, plan, interventions, ...).
pub type NoteContent = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Draft,
    Signed,
    Locked,
    PendingUnlock,
    UnderRevision,
}

impl NoteStatus {
    /// Column representation
    pub fn as_str(self) -> &'static str {
        match self {
            NoteStatus::Draft => "draft",
            NoteStatus::Signed => "signed",
            NoteStatus::Locked => "locked",
            NoteStatus::PendingUnlock => "pending_unlock",
            NoteStatus::UnderRevision => "under_revision",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(NoteStatus::Draft),
            "signed" => Some(NoteStatus::Signed),
            "locked" => Some(NoteStatus::Locked),
            "pending_unlock" => Some(NoteStatus::PendingUnlock),
            "under_revision" => Some(NoteStatus::UnderRevision),
            _ => None,
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NoteStatus::Draft => "Draft",
            NoteStatus::Signed => "Signed",
            NoteStatus::Locked => "Locked",
            NoteStatus::PendingUnlock => "PendingUnlock",
            NoteStatus::UnderRevision => "UnderRevision",
        };
        write!(f, "{}", label)
    }
}

/// Requested lifecycle moves, checked against [`NoteStatus::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteAction {
    EditDraft,
    Sign,
    CoSign,
    Lock,
    RequestUnlock,
    ApproveUnlock,
    DenyUnlock,
    Revise,
    Resign,
    ExpireUnlock,
}

impl fmt::Display for NoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NoteAction::EditDraft => "edit draft",
            NoteAction::Sign => "sign",
            NoteAction::CoSign => "co-sign",
            NoteAction::Lock => "lock",
            NoteAction::RequestUnlock => "request unlock",
            NoteAction::ApproveUnlock => "approve unlock",
            NoteAction::DenyUnlock => "deny unlock",
            NoteAction::Revise => "revise",
            NoteAction::Resign => "re-sign",
            NoteAction::ExpireUnlock => "expire unlock window",
        };
        write!(f, "{}", label)
    }
}

/// Prior full content captured before a post-signature edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionSnapshot {
    pub revision_number: u32,
    pub previous_content: NoteContent,
    pub change_comment: String,
    pub revised_by: Uuid,
    pub revised_at: DateTime<Utc>,
}

/// Content as it stood at a signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteVersion {
    pub version_number: u32,
    pub content: NoteContent,
    pub signed_by: Uuid,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub id: Uuid,
    pub client_id: Uuid,
    pub clinician_id: Uuid,
    pub note_type: String,
    pub status: NoteStatus,
    pub session_date: Option<NaiveDate>,
    pub appointment_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub content: NoteContent,
    pub signed_at: Option<DateTime<Utc>>,
    pub signed_by: Option<Uuid>,
    pub attestation_text: Option<String>,
    pub cosigner_id: Option<Uuid>,
    pub cosigned_at: Option<DateTime<Utc>>,
    pub revision_history: Vec<RevisionSnapshot>,
    pub revision_count: u32,
    pub versions: Vec<NoteVersion>,
    pub is_locked: bool,
    pub unlock_requested: bool,
    pub unlock_reason: Option<String>,
    pub unlock_requested_by: Option<Uuid>,
    pub unlock_request_date: Option<DateTime<Utc>>,
    pub unlock_approved_by: Option<Uuid>,
    pub unlock_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub row_version: i64,
}

/// Input for `create_note`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNote {
    pub client_id: Uuid,
    pub clinician_id: Uuid,
    #[serde(default)]
    pub note_type: String,
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub content: NoteContent,
}

/// Edits to a note that is still a draft.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftUpdate {
    #[serde(default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub content: NoteContent,
}

impl DraftUpdate {
    pub fn is_empty(&self) -> bool {
        self.note_type.is_none()
            && self.session_date.is_none()
            && self.appointment_id.is_none()
            && self.due_date.is_none()
            && self.content.is_empty()
    }
}

/// Post-signature change set applied under an unlock window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteChanges {
    pub content: NoteContent,
    #[serde(default)]
    pub comment: String,
}

impl ClinicalNote {
    pub fn new_draft(input: NewNote, now: DateTime<Utc>, documentation_due_days: i64) -> Self {
        let due_date = input.due_date.or_else(|| {
            input
                .session_date
                .map(|session| session + Duration::days(documentation_due_days))
        });

        Self {
            id: Uuid::new_v4(),
            client_id: input.client_id,
            clinician_id: input.clinician_id,
            note_type: input.note_type.trim().to_string(),
            status: NoteStatus::Draft,
            session_date: input.session_date,
            appointment_id: input.appointment_id,
            due_date,
            content: input.content,
            signed_at: None,
            signed_by: None,
            attestation_text: None,
            cosigner_id: None,
            cosigned_at: None,
            revision_history: Vec::new(),
            revision_count: 0,
            versions: Vec::new(),
            is_locked: false,
            unlock_requested: false,
            unlock_reason: None,
            unlock_requested_by: None,
            unlock_request_date: None,
            unlock_approved_by: None,
            unlock_until: None,
            created_at: now,
            updated_at: now,
            row_version: 0,
        }
    }

    /// Names of fields that must be populated before the note can be signed.
    pub fn missing_required_fields(&self, standalone_note_types: &[String]) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_nil() {
            missing.push("client_id");
        }
        if self.clinician_id.is_nil() {
            missing.push("clinician_id");
        }
        if self.note_type.trim().is_empty() {
            missing.push("note_type");
        }
        if self.session_date.is_none() {
            missing.push("session_date");
        }
        let standalone = standalone_note_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(self.note_type.trim()));
        if self.appointment_id.is_none() && !standalone {
            missing.push("appointment_id");
        }
        missing
    }

    /// An approved window that has not yet elapsed.
    pub fn has_active_unlock_window(&self, now: DateTime<Utc>) -> bool {
        self.status == NoteStatus::UnderRevision
            && self.unlock_until.map(|until| until > now).unwrap_or(false)
    }

    /// Under revision but the window has run out; the note should be relocked.
    pub fn unlock_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == NoteStatus::UnderRevision && !self.has_active_unlock_window(now)
    }

    pub fn is_cosigned(&self) -> bool {
        self.cosigned_at.is_some()
    }

    pub fn merge_content(&mut self, changes: &NoteContent) {
        for (key, value) in changes {
            if value.is_null() {
                self.content.remove(key);
            } else {
                self.content.insert(key.clone(), value.clone());
            }
        }
    }

    pub(crate) fn clear_unlock_request(&mut self) {
        self.unlock_requested = false;
        self.unlock_reason = None;
        self.unlock_requested_by = None;
        self.unlock_request_date = None;
    }

    pub(crate) fn close_unlock_window(&mut self) {
        self.unlock_approved_by = None;
        self.unlock_until = None;
        self.is_locked = true;
    }
}
