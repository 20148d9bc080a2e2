use thiserror::Error;
use uuid::Uuid;

/// Every failure a workflow operation can report to its caller.
///
/// The API layer maps each kind onto an HTTP status; nothing here is retried
/// automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid {entity} transition: cannot {requested} while {current}")]
    InvalidStateTransition {
        entity: &'static str,
        current: String,
        requested: String,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn invalid_transition(
        entity: &'static str,
        current: impl ToString,
        requested: impl ToString,
    ) -> Self {
        WorkflowError::InvalidStateTransition {
            entity,
            current: current.to_string(),
            requested: requested.to_string(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        WorkflowError::Validation(reason.into())
    }

    pub fn not_found(entity: &str, id: Uuid) -> Self {
        WorkflowError::NotFound(format!("{entity} {id}"))
    }

    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "VALIDATION_ERROR",
            WorkflowError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            WorkflowError::Authentication(_) => "AUTHENTICATION_ERROR",
            WorkflowError::Forbidden(_) => "FORBIDDEN",
            WorkflowError::Conflict(_) => "CONFLICT",
            WorkflowError::SlotUnavailable(_) => "SLOT_UNAVAILABLE",
            WorkflowError::NotFound(_) => "NOT_FOUND",
            WorkflowError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Failures raised by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} was modified concurrently (expected row version {expected})")]
    VersionConflict {
        entity: &'static str,
        id: Uuid,
        expected: i64,
    },

    #[error("slot for clinician {clinician_id} starting {start} is already booked")]
    SlotTaken {
        clinician_id: Uuid,
        start: chrono::DateTime<chrono::Utc>,
    },

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: Uuid },

    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: Uuid },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } | StoreError::Duplicate { .. } => {
                WorkflowError::Conflict(err.to_string())
            }
            StoreError::SlotTaken { .. } => WorkflowError::SlotUnavailable(err.to_string()),
            StoreError::Missing { entity, id } => WorkflowError::NotFound(format!("{entity} {id}")),
            other => {
                tracing::error!(error = %other, "Store failure");
                WorkflowError::Storage(other.to_string())
            }
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_workflow_kinds() {
        let id = Uuid::new_v4();
        let conflict: WorkflowError = StoreError::VersionConflict {
            entity: "clinical note",
            id,
            expected: 3,
        }
        .into();
        assert!(matches!(conflict, WorkflowError::Conflict(_)));

        let taken: WorkflowError = StoreError::SlotTaken {
            clinician_id: id,
            start: chrono::Utc::now(),
        }
        .into();
        assert!(matches!(taken, WorkflowError::SlotUnavailable(_)));

        let missing: WorkflowError = StoreError::Missing {
            entity: "appointment",
            id,
        }
        .into();
        assert_eq!(missing.code(), "NOT_FOUND");

        let corrupt: WorkflowError = StoreError::Corrupt("bad status".into()).into();
        assert_eq!(corrupt.code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_invalid_transition_message_names_both_states() {
        let err = WorkflowError::invalid_transition("note", "Locked", "revise");
        assert_eq!(
            err.to_string(),
            "Invalid note transition: cannot revise while Locked"
        );
    }
}
