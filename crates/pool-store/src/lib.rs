//! NodePool Object Store
//!
//! Read/write access to the three resource kinds the NodePool controller
//! works on: namespaces and nodes (read-only) and node pools.
//!
//! Reconcilers depend on the [`PoolStore`] trait only. [`KubePoolStore`]
//! implements it against the Kubernetes API; with the `test-util` feature,
//! [`MockPoolStore`] provides an in-memory implementation for unit tests.
//!
//! # Example
//!
//! ```no_run
//! use pool_store::{KubePoolStore, PoolStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubePoolStore::new(client);
//!
//! let pools = store.list_node_pools().await?;
//! for pool in &pools {
//!     println!("{:?}: {:?}", pool.metadata.name, pool.status_nodes());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! Writes of objects previously read from the store carry their
//! `resourceVersion`. A write based on a stale read fails with
//! [`StoreError::Conflict`] instead of overwriting a concurrent change.

pub mod client;
pub mod error;
pub mod key;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubePoolStore;
pub use error::StoreError;
pub use key::ObjectKey;
pub use store_trait::PoolStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockPoolStore, StoreWrite};
