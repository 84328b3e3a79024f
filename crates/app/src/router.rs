use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use linehook_storage::Database;

use crate::signature::SignatureVerifier;
use crate::{telemetry, webhook};

/// Dependencies handed to the webhook handler. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    storage: Database,
    verifier: SignatureVerifier,
}

impl AppState {
    pub fn new(storage: Database, verifier: SignatureVerifier) -> Self {
        Self { storage, verifier }
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }
}

/// Router of the public listener: the webhook entry point and nothing else.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(webhook::handle))
        .with_state(state)
}

/// Router of the operational listener.
pub fn ops_router(metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> Response {
    let body = telemetry::render_metrics(&handle);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}
