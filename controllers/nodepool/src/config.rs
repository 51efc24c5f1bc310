//! Controller configuration.
//!
//! Read once from environment variables at startup. Nothing here is reloaded
//! while the controller runs; components receive the values they need at
//! construction time.

use crate::error::ControllerError;
use std::collections::BTreeSet;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_EXCLUDED_NAMESPACES: &str = "kube-system,kube-public,kube-node-lease";
const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:8443";
const DEFAULT_WEBHOOK_CERT_PATH: &str = "/etc/nodepool/tls/tls.crt";
const DEFAULT_WEBHOOK_KEY_PATH: &str = "/etc/nodepool/tls/tls.key";
const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REQUEUE_SECONDS: u64 = 60;
const DEFAULT_RECONCILE_CONCURRENCY: u16 = 3;

/// Namespaces that never receive a managed pool and whose pods are never
/// mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    namespaces: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespaces: namespaces.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a comma separated list, ignoring blanks and surrounding spaces.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub excluded_namespaces: ExclusionSet,
    pub webhook_addr: SocketAddr,
    pub webhook_cert_path: PathBuf,
    pub webhook_key_path: PathBuf,
    pub probe_addr: SocketAddr,
    /// Delay before a failed reconciliation is retried
    pub requeue_interval: Duration,
    /// Concurrent reconciliations per resource kind
    pub reconcile_concurrency: u16,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let requeue_seconds: u64 = parse_var("REQUEUE_SECONDS", &var("REQUEUE_SECONDS", &DEFAULT_REQUEUE_SECONDS.to_string()))?;
        if requeue_seconds == 0 {
            return Err(ControllerError::InvalidConfig(
                "REQUEUE_SECONDS must be greater than zero".to_string(),
            ));
        }
        let reconcile_concurrency: u16 = parse_var(
            "RECONCILE_CONCURRENCY",
            &var("RECONCILE_CONCURRENCY", &DEFAULT_RECONCILE_CONCURRENCY.to_string()),
        )?;
        if reconcile_concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            excluded_namespaces: ExclusionSet::parse(&var("EXCLUDED_NAMESPACES", DEFAULT_EXCLUDED_NAMESPACES)),
            webhook_addr: parse_var("WEBHOOK_ADDR", &var("WEBHOOK_ADDR", DEFAULT_WEBHOOK_ADDR))?,
            webhook_cert_path: PathBuf::from(var("WEBHOOK_CERT_PATH", DEFAULT_WEBHOOK_CERT_PATH)),
            webhook_key_path: PathBuf::from(var("WEBHOOK_KEY_PATH", DEFAULT_WEBHOOK_KEY_PATH)),
            probe_addr: parse_var("PROBE_ADDR", &var("PROBE_ADDR", DEFAULT_PROBE_ADDR))?,
            requeue_interval: Duration::from_secs(requeue_seconds),
            reconcile_concurrency,
        })
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ControllerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", key, value, e))
    })
}
