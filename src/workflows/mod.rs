// Workflow service wiring.
// One store backs all three workflows; capabilities and the clock are shared.

use std::sync::Arc;

use crate::attestation::AttestationResolver;
use crate::clock::Clock;
use crate::config::EhrConfig;
use crate::directory::{CredentialVerifier, StaffDirectory};
use crate::notes::NoteLifecycleManager;
use crate::observability::WorkflowMetrics;
use crate::scheduling::{AppointmentBook, WaitlistManager};
use crate::store::{AttestationStore, NoteStore, SchedulingStore};

/// Every workflow service, ready to be shared across request handlers.
#[derive(Clone)]
pub struct Workflows {
    pub notes: Arc<NoteLifecycleManager>,
    pub attestations: Arc<AttestationResolver>,
    pub waitlist: Arc<WaitlistManager>,
    pub appointments: Arc<AppointmentBook>,
    pub metrics: Arc<WorkflowMetrics>,
}

impl Workflows {
    pub fn new<S>(
        store: Arc<S>,
        staff: Arc<dyn StaffDirectory>,
        credentials: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
        config: &EhrConfig,
    ) -> Self
    where
        S: NoteStore + AttestationStore + SchedulingStore + 'static,
    {
        let metrics = Arc::new(WorkflowMetrics::new());
        let attestations = Arc::new(AttestationResolver::new(store.clone(), clock.clone()));
        let notes = NoteLifecycleManager::new(
            store.clone(),
            attestations.clone(),
            staff,
            credentials,
            clock.clone(),
            config.notes.clone(),
        )
        .with_metrics(metrics.clone());
        let waitlist = WaitlistManager::new(store.clone(), clock.clone(), config.waitlist.clone())
            .with_metrics(metrics.clone());
        let appointments = AppointmentBook::new(store, clock);

        Self {
            notes: Arc::new(notes),
            attestations,
            waitlist: Arc::new(waitlist),
            appointments: Arc::new(appointments),
            metrics,
        }
    }
}
