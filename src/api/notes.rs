//! Clinical note endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::notes::{ClinicalNote, DraftUpdate, NewNote, NoteChanges, NoteContent, NoteStatus};
use crate::workflows::Workflows;

type NoteResponse = Result<Json<ClinicalNote>, ApiError>;

/// `POST /notes`
pub async fn create(
    State(app): State<Workflows>,
    Json(input): Json<NewNote>,
) -> Result<(StatusCode, Json<ClinicalNote>), ApiError> {
    let note = app.notes.create_note(input).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// `GET /notes/:id`
pub async fn get(State(app): State<Workflows>, Path(id): Path<Uuid>) -> NoteResponse {
    Ok(Json(app.notes.get_note(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub editor_id: Uuid,
    #[serde(default)]
    pub content: NoteContent,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// `PATCH /notes/:id`: draft edit, or a revision inside an unlock window.
pub async fn edit(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<EditRequest>,
) -> NoteResponse {
    let current = app.notes.get_note(id).await?;
    let note = if current.status == NoteStatus::Draft {
        app.notes
            .update_draft(
                id,
                req.editor_id,
                DraftUpdate {
                    note_type: req.note_type,
                    session_date: req.session_date,
                    appointment_id: req.appointment_id,
                    due_date: req.due_date,
                    content: req.content,
                },
            )
            .await?
    } else {
        app.notes
            .revise_note(
                id,
                req.editor_id,
                NoteChanges {
                    content: req.content,
                    comment: req.comment,
                },
            )
            .await?
    };
    Ok(Json(note))
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub signer_id: Uuid,
    pub credential: String,
}

/// `POST /notes/:id/sign`
pub async fn sign(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<SignRequest>,
) -> NoteResponse {
    Ok(Json(
        app.notes.sign_note(id, req.signer_id, &req.credential).await?,
    ))
}

/// `POST /notes/:id/resign`
pub async fn resign(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<SignRequest>,
) -> NoteResponse {
    Ok(Json(
        app.notes.resign_note(id, req.signer_id, &req.credential).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct CosignRequest {
    pub cosigner_id: Uuid,
}

/// `POST /notes/:id/cosign`
pub async fn cosign(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<CosignRequest>,
) -> NoteResponse {
    Ok(Json(app.notes.cosign_note(id, req.cosigner_id).await?))
}

/// `POST /notes/:id/lock`
pub async fn lock(State(app): State<Workflows>, Path(id): Path<Uuid>) -> NoteResponse {
    Ok(Json(app.notes.lock_note(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub requester_id: Uuid,
    pub reason: String,
}

/// `POST /notes/:id/unlock-request`
pub async fn request_unlock(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<UnlockRequest>,
) -> NoteResponse {
    Ok(Json(
        app.notes
            .request_unlock(id, req.requester_id, &req.reason)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub approver_id: Uuid,
    /// Falls back to the configured default window
    #[serde(default)]
    pub window_hours: Option<u32>,
}

/// `POST /notes/:id/unlock-approve`
pub async fn approve_unlock(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApproveRequest>,
) -> NoteResponse {
    let hours = req
        .window_hours
        .unwrap_or(app.notes.policy().default_unlock_window_hours);
    Ok(Json(
        app.notes.approve_unlock(id, req.approver_id, hours).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct DenyRequest {
    pub approver_id: Uuid,
    #[serde(default)]
    pub reason: String,
}

/// `POST /notes/:id/unlock-deny`
pub async fn deny_unlock(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
    Json(req): Json<DenyRequest>,
) -> NoteResponse {
    Ok(Json(
        app.notes.deny_unlock(id, req.approver_id, &req.reason).await?,
    ))
}

/// `GET /notes/unlock-requests`
pub async fn pending_unlocks(
    State(app): State<Workflows>,
) -> Result<Json<Vec<ClinicalNote>>, ApiError> {
    Ok(Json(app.notes.pending_unlock_requests().await?))
}
