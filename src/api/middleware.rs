use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use crate::telemetry::{create_workflow_span, generate_correlation_id};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Wraps each request in a workflow span and echoes the correlation id.
/// A caller-supplied `x-correlation-id` is reused.
pub async fn correlate(req: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = req
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(generate_correlation_id);

    let operation = format!("{} {}", req.method(), req.uri().path());
    let span = create_workflow_span(&operation, &correlation_id);

    let mut response = async move {
        let response = next.run(req).await;
        tracing::debug!(status = response.status().as_u16(), "Request handled");
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }
    response
}
