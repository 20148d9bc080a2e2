//! Waitlist and appointment endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::scheduling::{
    Appointment, AppointmentSlot, Booking, NewAppointment, NewWaitlistEntry, Priority,
    WaitlistEntry,
};
use crate::workflows::Workflows;

type EntryResponse = Result<Json<WaitlistEntry>, ApiError>;
type AppointmentResponse = Result<Json<Appointment>, ApiError>;

/// `POST /waitlist`
pub async fn add(
    State(app): State<Workflows>,
    Json(input): Json<NewWaitlistEntry>,
) -> Result<(StatusCode, Json<WaitlistEntry>), ApiError> {
    let entry = app.waitlist.add_to_waitlist(input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `GET /waitlist/:id`
pub async fn get_entry(State(app): State<Workflows>, Path(id): Path<Uuid>) -> EntryResponse {
    Ok(Json(app.waitlist.get_entry(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub clinician_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// `GET /waitlist/candidates?clinician_id=&start_time=&end_time=`
pub async fn candidates(
    State(app): State<Workflows>,
    Query(q): Query<SlotQuery>,
) -> Result<Json<Vec<WaitlistEntry>>, ApiError> {
    let slot = AppointmentSlot {
        clinician_id: q.clinician_id,
        start_time: q.start_time,
        end_time: q.end_time,
    };
    Ok(Json(app.waitlist.rank_candidates(&slot).await?))
}

/// `POST /waitlist/:id/offer`
pub async fn offer(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(slot): Json<AppointmentSlot>,
) -> EntryResponse {
    Ok(Json(app.waitlist.offer_slot(id, slot).await?))
}

/// `POST /waitlist/:id/book`
pub async fn book(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = app.waitlist.book_from_waitlist(id).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// `POST /waitlist/:id/decline`
pub async fn decline(State(app): State<Workflows>, Path(id): Path<Uuid>) -> EntryResponse {
    Ok(Json(app.waitlist.decline_offer(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: Priority,
}

/// `PATCH /waitlist/:id/priority`
pub async fn reprioritize(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<PriorityRequest>,
) -> EntryResponse {
    Ok(Json(app.waitlist.update_priority(id, req.priority).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveQuery {
    pub reason: Option<String>,
}

/// `DELETE /waitlist/:id?reason=`
pub async fn remove(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Query(q): Query<RemoveQuery>,
) -> EntryResponse {
    Ok(Json(app.waitlist.remove_from_waitlist(id, q.reason).await?))
}

/// `POST /appointments`
pub async fn schedule(
    State(app): State<Workflows>,
    Json(input): Json<NewAppointment>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let appointment = app.appointments.schedule_appointment(input).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// `GET /appointments/:id`
pub async fn get_appointment(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
) -> AppointmentResponse {
    Ok(Json(app.appointments.get_appointment(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub method: String,
}

/// `POST /appointments/:id/confirm`
pub async fn confirm(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> AppointmentResponse {
    Ok(Json(
        app.appointments.confirm_appointment(id, &req.method).await?,
    ))
}

/// `POST /appointments/:id/complete`
pub async fn complete(State(app): State<Workflows>, Path(id): Path<Uuid>) -> AppointmentResponse {
    Ok(Json(app.appointments.complete_appointment(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `POST /appointments/:id/cancel`
pub async fn cancel(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> AppointmentResponse {
    Ok(Json(
        app.appointments.cancel_appointment(id, req.reason).await?,
    ))
}

/// `POST /appointments/:id/no-show`
pub async fn no_show(State(app): State<Workflows>, Path(id): Path<Uuid>) -> AppointmentResponse {
    Ok(Json(app.appointments.mark_no_show(id).await?))
}
