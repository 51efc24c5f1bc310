//! Mutating admission webhook for Pods
//!
//! Pins new pods to their namespace's pool by injecting the pool's node
//! selector. The selector is generated from the namespace name alone, so the
//! webhook never reads the store.

pub mod mutate;

use crate::config::ExclusionSet;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use axum::{routing::post, Router};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for webhook handlers
#[derive(Debug, Clone)]
pub struct WebhookState {
    pub exclusions: Arc<ExclusionSet>,
    pub metrics: Arc<Metrics>,
}

impl WebhookState {
    pub fn new(exclusions: Arc<ExclusionSet>, metrics: Arc<Metrics>) -> Self {
        Self { exclusions, metrics }
    }
}

/// Create the webhook router
///
/// - POST /mutating - Inject the pool node selector into Pods
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutating", post(mutate::mutate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Loads the serving certificate and key. Missing or invalid material is fatal.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, ControllerError> {
    let cert = tokio::fs::read(cert_path).await.map_err(|e| {
        ControllerError::Tls(format!("failed to read certificate {}: {}", cert_path.display(), e))
    })?;
    let key = tokio::fs::read(key_path).await.map_err(|e| {
        ControllerError::Tls(format!("failed to read private key {}: {}", key_path.display(), e))
    })?;
    RustlsConfig::from_pem(cert, key)
        .await
        .map_err(|e| ControllerError::Tls(format!("invalid TLS material: {}", e)))
}

/// Serves the webhook over TLS until the server fails.
pub async fn serve_webhook(
    addr: SocketAddr,
    tls_config: RustlsConfig,
    state: Arc<WebhookState>,
) -> Result<(), ControllerError> {
    info!("Starting admission webhook on {}", addr);
    axum_server::bind_rustls(addr, tls_config)
        .serve(webhook_router(state).into_make_service())
        .await
        .map_err(|e| ControllerError::Server(format!("webhook server: {}", e)))
}
