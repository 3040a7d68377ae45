//! Consul catalog client implementing the registry seam.
//!
//! Talks to a local agent over its HTTP API: catalog reads for listings,
//! agent endpoints for registration and deregistration. Registrations carry
//! a TCP health check so the catalog notices members that stop answering.

use std::time::Duration;

use async_trait::async_trait;
use replicactl_core::host::HostPort;
use replicactl_core::registry::{HealthCheck, RegistryEntry, RegistryError, ServiceRegistry};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct ConsulCatalog {
    client: Client,
    base: String,
}

impl ConsulCatalog {
    /// A client for the agent at `addr`, with `timeout` applied per request.
    ///
    /// `addr` may be bare (`127.0.0.1:8500`) or carry an explicit scheme.
    pub fn new(addr: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let trimmed = addr.trim_end_matches('/');
        let base = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self { client, base })
    }
}

#[async_trait]
impl ServiceRegistry for ConsulCatalog {
    async fn list_instances(&self, service: &str) -> Result<Vec<RegistryEntry>, RegistryError> {
        let url = format!("{}/v1/catalog/service/{service}", self.base);
        let response = self.client.get(&url).send().await.map_err(transport)?;
        let response = check_status(response).await?;
        let services: Vec<CatalogService> = response.json().await.map_err(transport)?;
        Ok(services.into_iter().map(CatalogService::into_entry).collect())
    }

    async fn register_instance(
        &self,
        service: &str,
        host: &HostPort,
        service_id: &str,
        check: &HealthCheck,
    ) -> Result<(), RegistryError> {
        let url = format!("{}/v1/agent/service/register", self.base);
        let registration = ServiceRegistration {
            name: service,
            id: service_id,
            address: host.address(),
            port: host.port(),
            check: CheckRegistration {
                tcp: host.to_string(),
                interval: go_duration(check.interval),
            },
        };
        let response = self
            .client
            .put(&url)
            .json(&registration)
            .send()
            .await
            .map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }

    async fn deregister_instance(&self, service_id: &str) -> Result<(), RegistryError> {
        let url = format!("{}/v1/agent/service/deregister/{service_id}", self.base);
        let response = self.client.put(&url).send().await.map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }
}

/// One row of a `/v1/catalog/service/<name>` response.
#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "ServiceID")]
    service_id: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "ServiceAddress", default)]
    service_address: String,
    #[serde(rename = "ServicePort")]
    service_port: u16,
}

impl CatalogService {
    /// Consul leaves `ServiceAddress` empty when the service was registered
    /// without one; the node address stands in for it then.
    fn into_entry(self) -> RegistryEntry {
        let address = if self.service_address.is_empty() {
            self.address
        } else {
            self.service_address
        };
        RegistryEntry {
            service_id: self.service_id,
            address,
            port: self.service_port,
        }
    }
}

#[derive(Debug, Serialize)]
struct ServiceRegistration<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Check")]
    check: CheckRegistration,
}

#[derive(Debug, Serialize)]
struct CheckRegistration {
    #[serde(rename = "TCP")]
    tcp: String,
    #[serde(rename = "Interval")]
    interval: String,
}

/// Consul parses Go duration strings, which reject the spaces humantime
/// inserts, so intervals are rendered as whole seconds.
fn go_duration(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

fn transport(error: reqwest::Error) -> RegistryError {
    RegistryError::Transport(error.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RegistryError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    })
}
