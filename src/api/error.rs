use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::WorkflowError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Workflow(err) => match err {
                WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::InvalidStateTransition { .. }
                | WorkflowError::Conflict(_)
                | WorkflowError::SlotUnavailable(_) => StatusCode::CONFLICT,
                WorkflowError::Authentication(_) => StatusCode::UNAUTHORIZED,
                WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
                WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
                WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            ApiError::Workflow(WorkflowError::Storage(detail)) => {
                tracing::error!(detail, "Storage failure while handling request");
                ("STORAGE_ERROR", "An internal error occurred".to_string())
            }
            ApiError::Workflow(err) => (err.code(), err.to_string()),
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn validation_returns_422() {
        let response = ApiError::from(WorkflowError::validation("reason required")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn state_and_slot_conflicts_return_409() {
        for err in [
            WorkflowError::invalid_transition("note", "Locked", "revise"),
            WorkflowError::Conflict("stale".into()),
            WorkflowError::SlotUnavailable("taken".into()),
        ] {
            let code = err.code();
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::CONFLICT);
            assert_eq!(body_json(response).await["error"]["code"], code);
        }
    }

    #[tokio::test]
    async fn auth_and_permission_statuses() {
        let unauthorized = ApiError::from(WorkflowError::Authentication("bad pin".into()));
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
        let forbidden = ApiError::from(WorkflowError::Forbidden("not supervisor".into()));
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn storage_hides_details() {
        let response =
            ApiError::from(WorkflowError::Storage("disk I/O error".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }
}
