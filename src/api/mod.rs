//! REST surface over the workflows.
//!
//! Every handler takes `State<Workflows>` and maps [`WorkflowError`] through
//! [`ApiError`]. Path params use `:param` syntax (axum 0.7).
//!
//! [`WorkflowError`]: crate::error::WorkflowError

pub mod attestations;
pub mod error;
pub mod middleware;
pub mod notes;
pub mod scheduling;

use axum::extract::State;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::observability::WorkflowStats;
use crate::workflows::Workflows;

pub use error::ApiError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stats: WorkflowStats,
}

async fn health(State(app): State<Workflows>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        stats: app.metrics.get_stats(),
    })
}

/// Build the service router.
pub fn router(workflows: Workflows) -> Router {
    let note_routes = Router::new()
        .route("/notes", post(notes::create))
        .route("/notes/unlock-requests", get(notes::pending_unlocks))
        .route("/notes/:id", get(notes::get).patch(notes::edit))
        .route("/notes/:id/sign", post(notes::sign))
        .route("/notes/:id/resign", post(notes::resign))
        .route("/notes/:id/cosign", post(notes::cosign))
        .route("/notes/:id/lock", post(notes::lock))
        .route("/notes/:id/unlock-request", post(notes::request_unlock))
        .route("/notes/:id/unlock-approve", post(notes::approve_unlock))
        .route("/notes/:id/unlock-deny", post(notes::deny_unlock));

    let attestation_routes = Router::new()
        .route(
            "/attestations",
            get(attestations::list).post(attestations::upsert),
        )
        .route("/attestations/resolve", get(attestations::resolve))
        .route(
            "/attestations/:id",
            axum::routing::delete(attestations::deactivate),
        );

    let scheduling_routes = Router::new()
        .route("/waitlist", post(scheduling::add))
        .route("/waitlist/candidates", get(scheduling::candidates))
        .route(
            "/waitlist/:id",
            get(scheduling::get_entry).delete(scheduling::remove),
        )
        .route("/waitlist/:id/offer", post(scheduling::offer))
        .route("/waitlist/:id/book", post(scheduling::book))
        .route("/waitlist/:id/decline", post(scheduling::decline))
        .route("/waitlist/:id/priority", patch(scheduling::reprioritize))
        .route("/appointments", post(scheduling::schedule))
        .route("/appointments/:id", get(scheduling::get_appointment))
        .route("/appointments/:id/confirm", post(scheduling::confirm))
        .route("/appointments/:id/complete", post(scheduling::complete))
        .route("/appointments/:id/cancel", post(scheduling::cancel))
        .route("/appointments/:id/no-show", post(scheduling::no_show));

    Router::new()
        .route("/health", get(health))
        .merge(note_routes)
        .merge(attestation_routes)
        .merge(scheduling_routes)
        .with_state(workflows)
        .layer(axum::middleware::from_fn(middleware::correlate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::attestation::NewAttestation;
    use crate::clock::ManualClock;
    use crate::config::EhrConfig;
    use crate::directory::{StaffProfile, StaffRoster};
    use crate::store::InMemoryStore;

    struct TestApp {
        router: Router,
        clinician: Uuid,
        supervisor: Uuid,
    }

    fn member(id: Uuid) -> StaffProfile {
        StaffProfile {
            user_id: id,
            role: "CLINICIAN".into(),
            jurisdiction: "GA".into(),
        }
    }

    async fn test_app() -> TestApp {
        let clinician = Uuid::new_v4();
        let supervisor = Uuid::new_v4();
        let roster = Arc::new(
            StaffRoster::new()
                .with_member(member(supervisor), "9999", vec![])
                .with_member(member(clinician), "1234", vec![supervisor]),
        );
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        let workflows = Workflows::new(
            Arc::new(InMemoryStore::new()),
            roster.clone(),
            roster,
            clock,
            &EhrConfig::default(),
        );
        workflows
            .attestations
            .upsert_attestation(NewAttestation {
                role: "CLINICIAN".into(),
                note_type: "ALL".into(),
                jurisdiction: "GA".into(),
                attestation_text: "I attest this note is accurate.".into(),
            })
            .await
            .unwrap();

        TestApp {
            router: router(workflows),
            clinician,
            supervisor,
        }
    }

    impl TestApp {
        async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        async fn signed_note(&self) -> String {
            let (status, note) = self
                .send(
                    "POST",
                    "/notes",
                    Some(json!({
                        "client_id": Uuid::new_v4(),
                        "clinician_id": self.clinician,
                        "note_type": "Progress Note",
                        "session_date": "2026-03-02",
                        "appointment_id": Uuid::new_v4(),
                        "content": {"assessment": "stable"}
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            let id = note["id"].as_str().unwrap().to_string();

            let (status, signed) = self
                .send(
                    "POST",
                    &format!("/notes/{id}/sign"),
                    Some(json!({"signer_id": self.clinician, "credential": "1234"})),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(signed["status"], "signed");
            id
        }
    }

    #[tokio::test]
    async fn health_reports_ok_and_echoes_correlation_id() {
        let app = test_app().await;
        let request = Request::builder()
            .uri("/health")
            .header("x-correlation-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-correlation-id").unwrap(),
            "abc-123"
        );
    }

    #[tokio::test]
    async fn wrong_pin_is_unauthorized() {
        let app = test_app().await;
        let (_, note) = app
            .send(
                "POST",
                "/notes",
                Some(json!({
                    "client_id": Uuid::new_v4(),
                    "clinician_id": app.clinician,
                    "note_type": "Contact Note",
                    "session_date": "2026-03-02"
                })),
            )
            .await;
        let id = note["id"].as_str().unwrap();

        let (status, body) = app
            .send(
                "POST",
                &format!("/notes/{id}/sign"),
                Some(json!({"signer_id": app.clinician, "credential": "0000"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");
    }

    #[tokio::test]
    async fn unlock_and_revise_over_http() {
        let app = test_app().await;
        let id = app.signed_note().await;

        let (status, _) = app
            .send(
                "POST",
                &format!("/notes/{id}/unlock-request"),
                Some(json!({"requester_id": app.clinician, "reason": "typo in plan"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, pending) = app.send("GET", "/notes/unlock-requests", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let (status, unlocked) = app
            .send(
                "POST",
                &format!("/notes/{id}/unlock-approve"),
                Some(json!({"approver_id": app.supervisor})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(unlocked["status"], "under_revision");

        let (status, revised) = app
            .send(
                "PATCH",
                &format!("/notes/{id}"),
                Some(json!({
                    "editor_id": app.clinician,
                    "content": {"plan": "follow up in two weeks"},
                    "comment": "corrected plan"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revised["revision_count"], 1);
        assert_eq!(revised["revision_history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revising_a_signed_note_without_unlock_conflicts() {
        let app = test_app().await;
        let id = app.signed_note().await;

        let (status, body) = app
            .send(
                "PATCH",
                &format!("/notes/{id}"),
                Some(json!({
                    "editor_id": app.clinician,
                    "content": {"plan": "sneaky edit"}
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");
    }

    #[tokio::test]
    async fn draft_edit_by_another_clinician_is_forbidden() {
        let app = test_app().await;
        let (_, note) = app
            .send(
                "POST",
                "/notes",
                Some(json!({
                    "client_id": Uuid::new_v4(),
                    "clinician_id": app.clinician,
                    "note_type": "Progress Note",
                    "content": {"plan": "initial"}
                })),
            )
            .await;
        let id = note["id"].as_str().unwrap();

        let (status, body) = app
            .send(
                "PATCH",
                &format!("/notes/{id}"),
                Some(json!({
                    "editor_id": app.supervisor,
                    "content": {"plan": "overwritten"}
                })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, draft) = app
            .send(
                "PATCH",
                &format!("/notes/{id}"),
                Some(json!({
                    "editor_id": app.clinician,
                    "content": {"plan": "revised by author"}
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(draft["status"], "draft");
        assert_eq!(draft["content"]["plan"], "revised by author");
    }

    #[tokio::test]
    async fn unknown_note_is_404() {
        let app = test_app().await;
        let (status, body) = app
            .send("GET", &format!("/notes/{}", Uuid::new_v4()), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn waitlist_offer_then_book() {
        let app = test_app().await;
        let (status, entry) = app
            .send(
                "POST",
                "/waitlist",
                Some(json!({"client_id": Uuid::new_v4(), "priority": "high"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = entry["id"].as_str().unwrap().to_string();

        let slot = json!({
            "clinician_id": app.clinician,
            "start_time": "2026-03-04T15:00:00Z",
            "end_time": "2026-03-04T16:00:00Z"
        });
        let (status, offered) = app
            .send("POST", &format!("/waitlist/{id}/offer"), Some(slot))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(offered["status"], "offered");

        let (status, booking) = app
            .send("POST", &format!("/waitlist/{id}/book"), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(booking["entry"]["status"], "booked");
        assert_eq!(booking["appointment"]["status"], "scheduled");

        let (status, _) = app
            .send("POST", &format!("/waitlist/{id}/book"), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn attestation_resolution_falls_back_to_all_types() {
        let app = test_app().await;
        let (status, found) = app
            .send(
                "GET",
                "/attestations/resolve?role=clinician&note_type=Intake%20Note&jurisdiction=ga",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["note_type"], "ALL");

        let (status, _) = app
            .send(
                "GET",
                "/attestations/resolve?role=INTERN&note_type=Intake%20Note&jurisdiction=GA",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
