//! Resolution of command-line flags against the configuration file.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use replicactl_core::host::HostPort;
use replicactl_core::mutate::MemberDraft;
use replicactl_core::reconciler::Reconciler;
use replicactl_core::registry::{HealthCheck, ServiceRegistry};
use tracing::{debug, warn};

use crate::cli::commands::{Cli, MemberArgs, TargetArgs};
use crate::config::CliConfig;
use crate::consul::ConsulCatalog;
use crate::metadata;
use crate::mongo::{MONGO_PASSWORD_ENV, MongoAdmin, MongoOptions};

/// Everything a command needs, resolved from flags and the config file.
///
/// Flags win over the configuration file. The registry is attached when
/// either side enables Consul, or when an agent address is given explicitly.
pub struct CommandContext {
    mongo_override: Option<HostPort>,
    default_mongo: HostPort,
    registry: Option<Arc<ConsulCatalog>>,
    service: String,
    username: Option<String>,
    connect_timeout: Duration,
    op_timeout: Duration,
    check: HealthCheck,
}

impl CommandContext {
    pub fn resolve(cli: &Cli, config: &CliConfig) -> Result<Self> {
        let consul_enabled = cli.consul || cli.consul_addr.is_some() || config.consul.enabled;
        let registry = if consul_enabled {
            let addr = cli.consul_addr.as_deref().unwrap_or(&config.consul.addr);
            Some(Arc::new(ConsulCatalog::new(addr, config.mongo.op_timeout)?))
        } else {
            None
        };

        Ok(Self {
            mongo_override: cli.mongo.clone(),
            default_mongo: config.mongo.addr.clone(),
            registry,
            service: cli
                .service
                .clone()
                .unwrap_or_else(|| config.consul.service.clone()),
            username: cli.username.clone().or_else(|| config.mongo.username.clone()),
            connect_timeout: config.mongo.connect_timeout,
            op_timeout: config.mongo.op_timeout,
            check: HealthCheck {
                interval: config.consul.check_interval,
            },
        })
    }

    /// The database node to administer.
    ///
    /// An explicit `--mongo` wins. Otherwise the registry's first instance
    /// is used, so commands land on a node that is actually in the cluster;
    /// the configured default covers an empty or unreachable registry.
    pub async fn endpoint(&self) -> HostPort {
        if let Some(host) = &self.mongo_override {
            return host.clone();
        }
        if let Some(registry) = &self.registry {
            match registry.list_instances(&self.service).await {
                Ok(entries) if !entries.is_empty() => {
                    let host = entries[0].host();
                    debug!(host = %host, "resolved database endpoint from registry");
                    return host;
                }
                Ok(_) => {
                    debug!("registry lists no instances; using the configured endpoint");
                }
                Err(error) => {
                    warn!(error = %error, "registry lookup failed; using the configured endpoint");
                }
            }
        }
        self.default_mongo.clone()
    }

    /// Build the engine against the resolved endpoint.
    pub async fn reconciler(&self) -> Result<(Reconciler, HostPort)> {
        let endpoint = self.endpoint().await;
        let admin = MongoAdmin::connect(MongoOptions {
            endpoint: endpoint.clone(),
            username: self.username.clone(),
            password: std::env::var(MONGO_PASSWORD_ENV).ok(),
            connect_timeout: self.connect_timeout,
        })
        .with_context(|| format!("failed to connect to {endpoint}"))?;

        let mut reconciler = Reconciler::new(Arc::new(admin))
            .with_service(self.service.clone())
            .with_op_timeout(self.op_timeout)
            .with_health_check(self.check.clone());
        if let Some(registry) = &self.registry {
            reconciler = reconciler.with_registry(registry.clone());
        }
        Ok((reconciler, endpoint))
    }

    /// The host a command targets, from `--addr` or instance metadata.
    pub async fn member_host(&self, target: &TargetArgs) -> Result<HostPort> {
        if target.ec2 {
            let address = metadata::local_ipv4(metadata::DEFAULT_BASE, self.connect_timeout)
                .await
                .context("failed to resolve the member address from instance metadata")?;
            return Ok(HostPort::new(address, target.port));
        }
        let address = target
            .addr
            .as_deref()
            .context("either --addr or --ec2 is required")?;
        Ok(HostPort::new(address, target.port))
    }

    /// Assemble the member shape a command adds.
    pub async fn member_draft(&self, member: &MemberArgs) -> Result<MemberDraft> {
        let host = self.member_host(&member.target).await?;
        let mut draft = MemberDraft::new(host);
        draft.arbiter_only = member.arbiter;
        draft.hidden = member.hidden;
        draft.priority = member.priority;
        draft.tags = parse_tags(&member.tags)?;
        Ok(draft)
    }

    #[must_use]
    pub fn has_registry(&self) -> bool {
        self.registry.is_some()
    }
}

fn parse_tags(specs: &[String]) -> Result<Option<BTreeMap<String, String>>> {
    if specs.is_empty() {
        return Ok(None);
    }
    let mut tags = BTreeMap::new();
    for spec in specs {
        let (key, value) = spec
            .split_once('=')
            .with_context(|| format!("tag {spec:?} is not of the form KEY=VALUE"))?;
        tags.insert(key.to_string(), value.to_string());
    }
    Ok(Some(tags))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::commands::Commands;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["replicactl"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn flags_win_over_the_config_file() {
        let mut config = CliConfig::default();
        config.consul.service = "mongodb".to_string();
        let cli = cli(&["--service", "mongo-prod", "--consul", "clean"]);

        let context = CommandContext::resolve(&cli, &config).unwrap();
        assert!(context.has_registry());
        assert_eq!(context.service, "mongo-prod");
    }

    #[test]
    fn consul_addr_alone_enables_the_registry() {
        let config = CliConfig::default();
        assert!(!config.consul.enabled);
        let cli = cli(&["--consul-addr", "consul.internal:8500", "status"]);

        let context = CommandContext::resolve(&cli, &config).unwrap();
        assert!(context.has_registry());
    }

    #[test]
    fn registry_stays_off_by_default() {
        let context = CommandContext::resolve(&cli(&["status"]), &CliConfig::default()).unwrap();
        assert!(!context.has_registry());
    }

    #[tokio::test]
    async fn explicit_mongo_flag_overrides_everything() {
        let cli = cli(&["--mongo", "db-9:27019", "status"]);
        let context = CommandContext::resolve(&cli, &CliConfig::default()).unwrap();
        assert_eq!(context.endpoint().await, HostPort::new("db-9", 27019));
    }

    #[tokio::test]
    async fn member_host_combines_addr_and_port() {
        let cli = cli(&["add", "--addr", "db-a.internal", "--port", "27018"]);
        let context = CommandContext::resolve(&cli, &CliConfig::default()).unwrap();
        let Commands::Add { member } = &cli.command else {
            panic!("expected add command");
        };
        let host = context.member_host(&member.target).await.unwrap();
        assert_eq!(host, HostPort::new("db-a.internal", 27018));
    }

    #[test]
    fn tags_parse_into_a_map() {
        let tags = parse_tags(&["dc=fra1".to_string(), "rack=r2".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(tags.get("dc").map(String::as_str), Some("fra1"));
        assert_eq!(tags.get("rack").map(String::as_str), Some("r2"));
    }

    #[test]
    fn empty_tag_list_means_no_tags() {
        assert_eq!(parse_tags(&[]).unwrap(), None);
    }

    #[test]
    fn malformed_tags_are_rejected() {
        assert!(parse_tags(&["dcfra1".to_string()]).is_err());
    }
}
