//! CLI configuration loading and persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use replicactl_core::host::HostPort;
use replicactl_core::reconciler::{DEFAULT_OP_TIMEOUT, DEFAULT_SERVICE};
use replicactl_core::registry::DEFAULT_CHECK_INTERVAL;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub mongo: MongoConfig,
    #[serde(default)]
    pub consul: ConsulConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Database node administered when no flag or registry lookup applies.
    pub addr: HostPort,
    /// Username for authenticated deployments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Budget for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Budget for a single admin operation.
    #[serde(with = "humantime_serde")]
    pub op_timeout: Duration,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            addr: default_mongo_addr(),
            username: None,
            connect_timeout: default_connect_timeout(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulConfig {
    /// Sync membership changes with the catalog without passing --consul.
    pub enabled: bool,
    /// Consul agent address.
    pub addr: String,
    /// Service name members are registered under.
    pub service: String,
    /// Interval between the TCP health probes attached to registrations.
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_consul_addr(),
            service: DEFAULT_SERVICE.to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

fn default_mongo_addr() -> HostPort {
    HostPort::new("127.0.0.1", 27017)
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_consul_addr() -> String {
    "127.0.0.1:8500".to_string()
}

#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    config: CliConfig,
}

impl ConfigManager {
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        Self::load_with_path(path)
    }

    pub fn load_with_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("invalid config at {}", path.display()))?
        } else {
            CliConfig::default()
        };

        Ok(Self { path, config })
    }

    #[must_use]
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }
        let toml = toml::to_string_pretty(&self.config)?;
        fs::write(&self.path, toml)
            .with_context(|| format!("failed to write config to {}", self.path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "mongo.addr" => Some(self.config.mongo.addr.to_string()),
            "mongo.username" => Some(self.config.mongo.username.clone().unwrap_or_default()),
            "mongo.connect_timeout" => Some(
                humantime::format_duration(self.config.mongo.connect_timeout).to_string(),
            ),
            "mongo.op_timeout" => {
                Some(humantime::format_duration(self.config.mongo.op_timeout).to_string())
            }
            "consul.enabled" => Some(self.config.consul.enabled.to_string()),
            "consul.addr" => Some(self.config.consul.addr.clone()),
            "consul.service" => Some(self.config.consul.service.clone()),
            "consul.check_interval" => Some(
                humantime::format_duration(self.config.consul.check_interval).to_string(),
            ),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "mongo.addr" => {
                self.config.mongo.addr = value.parse()?;
                Ok(())
            }
            "mongo.username" => {
                self.config.mongo.username = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
                Ok(())
            }
            "mongo.connect_timeout" => {
                self.config.mongo.connect_timeout = humantime::parse_duration(value)?;
                Ok(())
            }
            "mongo.op_timeout" => {
                self.config.mongo.op_timeout = humantime::parse_duration(value)?;
                Ok(())
            }
            "consul.enabled" => {
                self.config.consul.enabled = parse_bool(value)?;
                Ok(())
            }
            "consul.addr" => {
                self.config.consul.addr = value.to_string();
                Ok(())
            }
            "consul.service" => {
                self.config.consul.service = value.to_string();
                Ok(())
            }
            "consul.check_interval" => {
                self.config.consul.check_interval = humantime::parse_duration(value)?;
                Ok(())
            }
            _ => Err(anyhow!("unknown configuration key: {key}")),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("expected boolean value, received '{value}'")),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base =
        dirs::config_dir().ok_or_else(|| anyhow!("unable to determine configuration directory"))?;
    Ok(base.join("replicactl").join("config.toml"))
}

#[must_use]
pub fn format_mongo(cfg: &MongoConfig) -> Vec<String> {
    vec![
        format!("addr=\"{}\"", cfg.addr),
        format!("username=\"{}\"", cfg.username.as_deref().unwrap_or("")),
        format!(
            "connect_timeout=\"{}\"",
            humantime::format_duration(cfg.connect_timeout)
        ),
        format!(
            "op_timeout=\"{}\"",
            humantime::format_duration(cfg.op_timeout)
        ),
    ]
}

#[must_use]
pub fn format_consul(cfg: &ConsulConfig) -> Vec<String> {
    vec![
        format!("enabled={}", cfg.enabled),
        format!("addr=\"{}\"", cfg.addr),
        format!("service=\"{}\"", cfg.service),
        format!(
            "check_interval=\"{}\"",
            humantime::format_duration(cfg.check_interval)
        ),
    ]
}

#[must_use]
pub fn format_sections(config: &CliConfig) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("[mongo]".to_string());
    lines.extend(format_mongo(&config.mongo));
    lines.push(String::new());
    lines.push("[consul]".to_string());
    lines.extend(format_consul(&config.consul));
    lines
}
