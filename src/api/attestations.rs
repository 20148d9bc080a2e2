//! Attestation lookup and administration endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::attestation::{NewAttestation, SignatureAttestation};
use crate::workflows::Workflows;

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub role: String,
    pub note_type: String,
    pub jurisdiction: String,
}

/// `GET /attestations/resolve?role=&note_type=&jurisdiction=`
pub async fn resolve(
    State(app): State<Workflows>,
    Query(q): Query<ResolveQuery>,
) -> Result<Json<SignatureAttestation>, ApiError> {
    let found = app
        .attestations
        .resolve_attestation(&q.role, &q.note_type, &q.jurisdiction)
        .await?;
    Ok(Json(found))
}

/// `GET /attestations`
pub async fn list(
    State(app): State<Workflows>,
) -> Result<Json<Vec<SignatureAttestation>>, ApiError> {
    Ok(Json(app.attestations.list_attestations().await?))
}

/// `POST /attestations`
pub async fn upsert(
    State(app): State<Workflows>,
    Json(input): Json<NewAttestation>,
) -> Result<(StatusCode, Json<SignatureAttestation>), ApiError> {
    let saved = app.attestations.upsert_attestation(input).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// `DELETE /attestations/:id` deactivates; rows are never removed.
pub async fn deactivate(
    State(app): State<Workflows>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app.attestations.deactivate_attestation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
