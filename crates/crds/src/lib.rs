//! NodePool CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the NodePool controller.

pub mod node_pool;

pub use node_pool::*;
