// EHR Workflows Library - clinical note lifecycle, unlock/revision,
// signature attestations and waitlist scheduling for mental-health practices

pub mod api;
pub mod attestation;
pub mod cli;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod notes;
pub mod observability;
pub mod scheduling;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use attestation::{AttestationKey, AttestationResolver, NewAttestation, SignatureAttestation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EhrConfig;
pub use directory::{CredentialVerifier, StaffDirectory, StaffProfile, StaffRoster};
pub use error::{StoreError, WorkflowError, WorkflowResult};
pub use notes::{ClinicalNote, NoteLifecycleManager, NoteStatus};
pub use observability::{OperationTimer, WorkflowMetrics, WorkflowStats};
pub use scheduling::{
    Appointment, AppointmentBook, AppointmentSlot, AppointmentStatus, Booking, Priority,
    WaitlistEntry, WaitlistManager, WaitlistStatus,
};
pub use shutdown::ShutdownCoordinator;
pub use store::{AttestationStore, InMemoryStore, NoteStore, SchedulingStore};
#[cfg(feature = "database")]
pub use store::SqliteStore;
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use workflows::Workflows;
