use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};
use tracing::{error, info, warn};
use uuid::Uuid;

use linehook_core::decode_envelope;

use crate::dispatch::{dispatch_events, DispatchReport};
use crate::router::AppState;

pub const HEADER_SIGNATURE: &str = "X-Line-Signature";
const ACK_BODY: &str = "Ok";

/// Terminal result of one webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Acknowledged,
    InvalidSignature,
    InvalidPayload,
    PersistenceFailed,
}

impl WebhookOutcome {
    fn metric_label(self) -> &'static str {
        match self {
            Self::Acknowledged => "ok",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidPayload => "invalid_payload",
            Self::PersistenceFailed => "persistence_failed",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            Self::Acknowledged => StatusCode::OK,
            Self::InvalidSignature => StatusCode::FORBIDDEN,
            Self::InvalidPayload | Self::PersistenceFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Acknowledged => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                ACK_BODY,
            )
                .into_response(),
            other => other.status().into_response(),
        }
    }
}

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    info!(
        stage = "ingress",
        %request_id,
        content_type,
        size_bytes = body.len(),
        "webhook received"
    );

    let outcome = process(&state, &headers, &body, request_id).await;

    let label = outcome.metric_label();
    counter!("webhook_requests_total", "outcome" => label).increment(1);
    histogram!("webhook_ack_latency_seconds", "outcome" => label)
        .record(start.elapsed().as_secs_f64());

    outcome.into_response()
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    request_id: Uuid,
) -> WebhookOutcome {
    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|value| value.to_str().ok());
    let verified = signature.is_some_and(|token| state.verifier().verify(body, token));
    if !verified {
        warn!(
            stage = "ingress",
            %request_id,
            signature_present = signature.is_some(),
            "signature is not verified"
        );
        counter!("webhook_invalid_signature_total").increment(1);
        return WebhookOutcome::InvalidSignature;
    }

    let envelope = match decode_envelope(body) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!(stage = "decode", %request_id, error = %err, "failed to decode webhook body");
            return WebhookOutcome::InvalidPayload;
        }
    };

    info!(
        stage = "decode",
        %request_id,
        destination = %envelope.destination,
        events = envelope.events.len(),
        "webhook decoded"
    );

    let report = dispatch_events(&state.storage().messages(), envelope.events, request_id).await;
    let outcome = outcome_for(&report);
    if outcome == WebhookOutcome::Acknowledged {
        info!(
            stage = "dispatch",
            %request_id,
            persisted = report.persisted_count(),
            skipped = report.skipped_count(),
            "webhook acknowledged"
        );
    } else {
        let failed = report.failed_ids();
        error!(
            stage = "dispatch",
            %request_id,
            persisted = report.persisted_count(),
            failed_count = failed.len(),
            failed_ids = %failed.join(","),
            "some messages were not persisted"
        );
    }
    outcome
}

/// Any failed event, including a crashed or cancelled task, fails the request.
fn outcome_for(report: &DispatchReport) -> WebhookOutcome {
    if report.is_success() {
        WebhookOutcome::Acknowledged
    } else {
        WebhookOutcome::PersistenceFailed
    }
}
