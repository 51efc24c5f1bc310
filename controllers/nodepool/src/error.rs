//! Controller-specific error types.
//!
//! Store failures surface as [`ControllerError::Store`] and are handed back
//! to the delivery layer, which requeues the key. The remaining variants are
//! startup or serving failures.

use thiserror::Error;
use kube::Error as KubeError;
use pool_store::StoreError;

/// Errors that can occur in the NodePool Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// TLS material missing or unusable
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP server failed
    #[error("Server error: {0}")]
    Server(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the failure is a lost compare-and-swap race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Store(e) if e.is_conflict())
    }
}
