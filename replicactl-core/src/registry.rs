//! Service registry abstraction and the pure catalog diff.
//!
//! The engine never talks HTTP itself; it drives a [`ServiceRegistry`]
//! implementation (Consul in the shipped binary) and computes what to change
//! with [`diff`], which is pure and order-independent.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::HostPort;

/// Default interval between registry health probes.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(15);

/// One registered instance of the database service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Registry-side identity, used for deregistration.
    pub service_id: String,
    /// Address the instance is reachable at.
    pub address: String,
    /// Port the instance listens on.
    pub port: u16,
}

impl RegistryEntry {
    /// The host this entry advertises.
    #[must_use]
    pub fn host(&self) -> HostPort {
        HostPort::new(self.address.clone(), self.port)
    }
}

/// TCP health probe attached to a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// How often the registry probes the instance.
    pub interval: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// Errors surfaced by a registry backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry could not be reached at all.
    #[error("registry transport failed: {0}")]
    Transport(String),
    /// The registry answered with an unexpected status.
    #[error("registry returned status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code of the response.
        status: u16,
        /// Response body, for the log line.
        body: String,
    },
}

/// Backend-neutral view of a service registry.
///
/// Listing an unknown or empty service yields `Ok` with an empty vector, not
/// an error; the cluster bootstrap decision depends on that distinction.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// All registered instances of `service`.
    async fn list_instances(&self, service: &str) -> Result<Vec<RegistryEntry>, RegistryError>;

    /// Register `host` under `service` with the given id and health check.
    ///
    /// Re-registering an existing id overwrites it in place, so the call is
    /// safe to repeat.
    async fn register_instance(
        &self,
        service: &str,
        host: &HostPort,
        service_id: &str,
        check: &HealthCheck,
    ) -> Result<(), RegistryError>;

    /// Remove the instance registered under `service_id`.
    async fn deregister_instance(&self, service_id: &str) -> Result<(), RegistryError>;
}

/// Changes that would bring the registry in line with a member set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistryDelta {
    /// Service ids registered for hosts that are no longer members.
    pub deregister: BTreeSet<String>,
    /// Member hosts with no registration at all.
    pub register: BTreeSet<HostPort>,
}

impl RegistryDelta {
    /// True when the registry already matches the member set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deregister.is_empty() && self.register.is_empty()
    }
}

/// Compare registry contents against the authoritative member set.
///
/// Entries whose host is not a member are marked for deregistration; members
/// with no entry are marked for registration. Input order is irrelevant, and
/// duplicate entries for one host collapse into the sets.
#[must_use]
pub fn diff(entries: &[RegistryEntry], members: &BTreeSet<HostPort>) -> RegistryDelta {
    let mut delta = RegistryDelta::default();
    let mut seen: BTreeSet<HostPort> = BTreeSet::new();
    for entry in entries {
        let host = entry.host();
        if members.contains(&host) {
            seen.insert(host);
        } else {
            delta.deregister.insert(entry.service_id.clone());
        }
    }
    delta.register = members.difference(&seen).cloned().collect();
    delta
}
