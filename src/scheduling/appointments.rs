use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{WorkflowError, WorkflowResult};
use crate::store::SchedulingStore;

use super::types::*;

/// Direct scheduling and the appointment status lifecycle.
pub struct AppointmentBook {
    store: Arc<dyn SchedulingStore>,
    clock: Arc<dyn Clock>,
}

impl AppointmentBook {
    pub fn new(store: Arc<dyn SchedulingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Books a slot outside the waitlist; the store refuses overlaps.
    pub async fn schedule_appointment(&self, request: NewAppointment) -> WorkflowResult<Appointment> {
        if request.client_id.is_nil() {
            return Err(WorkflowError::validation("client_id is required"));
        }
        if request.appointment_type.trim().is_empty() {
            return Err(WorkflowError::validation("appointment_type is required"));
        }
        request.slot.validate()?;

        let appointment = Appointment::new(
            request.client_id,
            request.slot,
            request.appointment_type.trim(),
            self.clock.now(),
        )
        .with_risk(request.no_show_risk);

        self.store.insert_appointment(&appointment).await?;
        info!(
            appointment_id = %appointment.id,
            clinician_id = %appointment.clinician_id,
            start_time = %appointment.start_time,
            "Appointment scheduled"
        );
        Ok(appointment)
    }

    pub async fn get_appointment(&self, id: Uuid) -> WorkflowResult<Appointment> {
        self.store
            .get_appointment(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("appointment", id))
    }

    pub async fn confirm_appointment(&self, id: Uuid, method: &str) -> WorkflowResult<Appointment> {
        let method = method.trim();
        if method.is_empty() {
            return Err(WorkflowError::validation("confirmation method is required"));
        }
        self.transition(id, AppointmentAction::Confirm, |appointment, now| {
            appointment.confirmed_at = Some(now);
            appointment.confirmation_method = Some(method.to_string());
        })
        .await
    }

    pub async fn complete_appointment(&self, id: Uuid) -> WorkflowResult<Appointment> {
        self.transition(id, AppointmentAction::Complete, |_, _| {}).await
    }

    pub async fn cancel_appointment(
        &self,
        id: Uuid,
        reason: Option<String>,
    ) -> WorkflowResult<Appointment> {
        self.transition(id, AppointmentAction::Cancel, |appointment, _| {
            appointment.cancellation_reason = reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty());
        })
        .await
    }

    pub async fn mark_no_show(&self, id: Uuid) -> WorkflowResult<Appointment> {
        self.transition(id, AppointmentAction::MarkNoShow, |_, _| {}).await
    }

    async fn transition<F>(
        &self,
        id: Uuid,
        action: AppointmentAction,
        apply: F,
    ) -> WorkflowResult<Appointment>
    where
        F: FnOnce(&mut Appointment, chrono::DateTime<chrono::Utc>) + Send,
    {
        let mut appointment = self.get_appointment(id).await?;
        let from = appointment.status;
        let next = from.apply(action)?;

        let now = self.clock.now();
        appointment.status = next;
        apply(&mut appointment, now);
        appointment.updated_at = now;

        self.store.update_appointment(&appointment).await?;
        appointment.row_version += 1;
        info!(
            appointment_id = %appointment.id,
            from = %from,
            to = %next,
            "Appointment status changed"
        );
        Ok(appointment)
    }
}
