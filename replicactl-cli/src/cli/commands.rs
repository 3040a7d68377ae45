//! CLI command definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use replicactl_core::host::HostPort;

/// Replica set membership administration synced with a service registry
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database node to administer (host:port), bypassing registry lookup
    #[arg(short, long, global = true)]
    pub mongo: Option<HostPort>,

    /// Sync membership changes with the Consul catalog
    #[arg(long, global = true)]
    pub consul: bool,

    /// Consul agent address (implies --consul)
    #[arg(long, global = true, value_name = "ADDR")]
    pub consul_addr: Option<String>,

    /// Service name members are registered under
    #[arg(long, global = true)]
    pub service: Option<String>,

    /// Database username (password is read from REPLICACTL_MONGO_PASSWORD)
    #[arg(short, long, global = true)]
    pub username: Option<String>,

    /// Main command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initiate a new replica set on the target node
    Init,

    /// Add a member to the replica set
    Add {
        #[command(flatten)]
        member: MemberArgs,
    },

    /// Remove a member from the replica set
    Remove {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Add the member, initiating the set first if the registry is empty
    #[command(visible_alias = "initoradd")]
    Ensure {
        #[command(flatten)]
        member: MemberArgs,
    },

    /// Drop dead members and converge the registry on the live ones
    Clean,

    /// Show per-member replica set health
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        /// Configuration action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Identity of the member a command acts on
#[derive(Args)]
pub struct TargetArgs {
    /// Member address (hostname or IP)
    #[arg(long, required_unless_present = "ec2")]
    pub addr: Option<String>,

    /// Member port
    #[arg(long, default_value = "27017")]
    pub port: u16,

    /// Resolve the member address from EC2 instance metadata
    #[arg(long, conflicts_with = "addr")]
    pub ec2: bool,
}

/// Shape of the member a command adds
#[derive(Args)]
pub struct MemberArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Add as a voting arbiter without data
    #[arg(long)]
    pub arbiter: bool,

    /// Hide the member from clients
    #[arg(long)]
    pub hidden: bool,

    /// Election weight for the member
    #[arg(long, default_value = "1.0")]
    pub priority: f64,

    /// Replica set tag as KEY=VALUE (repeatable)
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub tags: Vec<String>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// List configuration settings
    List {
        /// Show only the specified section
        #[arg(long)]
        section: Option<String>,
    },

    /// Show configuration file location
    Path,
}
