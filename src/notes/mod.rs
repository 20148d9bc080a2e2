//! Clinical note lifecycle.
//!
//! A note is drafted, signed with a credential check and an attestation,
//! optionally co-signed by a supervisor, and afterwards only changed through
//! an approved, time-boxed unlock window that records every revision.

mod lifecycle;
mod types;
mod unlock;

pub use lifecycle::NoteLifecycleManager;
pub use types::{
    ClinicalNote, DraftUpdate, NewNote, NoteAction, NoteChanges, NoteContent, NoteStatus,
    NoteVersion, RevisionSnapshot,
};
