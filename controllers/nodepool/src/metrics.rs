//! Prometheus metrics and the probe server.
//!
//! Serves `/healthz`, `/readyz` and `/metrics` over plain HTTP on the probe
//! address. Readiness flips once every deletion watch has finished its
//! initial list.

use crate::error::ControllerError;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Counters exported by the controller.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    admission_reviews: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reconciliations = IntCounterVec::new(
            Opts::new("nodepool_reconciliations_total", "Reconciliations by controller and result"),
            &["controller", "result"],
        )?;
        let admission_reviews = IntCounterVec::new(
            Opts::new("nodepool_admission_reviews_total", "Pod admission reviews by decision"),
            &["decision"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(admission_reviews.clone()))?;
        Ok(Self { registry, reconciliations, admission_reviews })
    }

    /// `result` is one of `success`, `conflict` or `error`.
    pub fn record_reconciliation(&self, controller: &str, result: &str) {
        self.reconciliations.with_label_values(&[controller, result]).inc();
    }

    /// `decision` is one of `patched`, `allowed` or `denied`.
    pub fn record_admission(&self, decision: &str) {
        self.admission_reviews.with_label_values(&[decision]).inc();
    }

    /// Metrics in Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&self.registry.gather())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ProbeState {
    pub metrics: Arc<Metrics>,
    /// Watches that have not completed their initial list yet
    pending_syncs: AtomicUsize,
}

impl ProbeState {
    pub fn new(metrics: Arc<Metrics>, pending_syncs: usize) -> Self {
        Self { metrics, pending_syncs: AtomicUsize::new(pending_syncs) }
    }

    /// Called once per watch after its first complete list.
    pub fn mark_synced(&self) {
        let _ = self
            .pending_syncs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn is_ready(&self) -> bool {
        self.pending_syncs.load(Ordering::Acquire) == 0
    }
}

pub fn probe_router(state: Arc<ProbeState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn readyz(State(state): State<Arc<ProbeState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<ProbeState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Runs the plain HTTP probe server until it fails.
pub async fn serve_probes(addr: SocketAddr, state: Arc<ProbeState>) -> Result<(), ControllerError> {
    info!("Starting probe server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Server(format!("failed to bind probe server on {}: {}", addr, e)))?;
    axum::serve(listener, probe_router(state))
        .await
        .map_err(|e| ControllerError::Server(format!("probe server: {}", e)))
}
