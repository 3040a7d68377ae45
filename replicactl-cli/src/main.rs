//! replicactl - replica set membership administration synced with a service registry

use anyhow::Result;
use clap::Parser;
use replicactl_cli::cli::{Cli, CommandContext, Commands, ConfigAction};
use replicactl_cli::config::{self, ConfigManager};
use replicactl_cli::output;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays parseable (status --json).
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_with_path(path.clone())?,
        None => ConfigManager::load()?,
    };
    let context = CommandContext::resolve(&cli, manager.config())?;

    match &cli.command {
        Commands::Init => {
            let (reconciler, endpoint) = context.reconciler().await?;
            let report = reconciler.initiate(&endpoint).await?;
            output::print_report(&report);
        }
        Commands::Add { member } => {
            let draft = context.member_draft(member).await?;
            let (reconciler, _) = context.reconciler().await?;
            let report = reconciler.add(&draft).await?;
            output::print_report(&report);
        }
        Commands::Remove { target } => {
            let host = context.member_host(target).await?;
            let (reconciler, _) = context.reconciler().await?;
            let report = reconciler.remove(&host).await?;
            output::print_report(&report);
        }
        Commands::Ensure { member } => {
            let draft = context.member_draft(member).await?;
            let (reconciler, _) = context.reconciler().await?;
            let report = reconciler.ensure(&draft).await?;
            output::print_report(&report);
        }
        Commands::Clean => {
            let (reconciler, _) = context.reconciler().await?;
            let report = reconciler.prune().await?;
            output::print_report(&report);
        }
        Commands::Status { json } => {
            let (reconciler, _) = context.reconciler().await?;
            let status = reconciler.status().await?;
            if *json {
                println!("{}", output::status_json(&status)?);
            } else {
                output::print_status(&status);
            }
        }
        Commands::Config { action } => handle_config(action, manager)?,
    }

    Ok(())
}

fn handle_config(action: &ConfigAction, mut manager: ConfigManager) -> Result<()> {
    match action {
        ConfigAction::Get { key } => match manager.get(key) {
            Some(value) => println!("{value}"),
            None => anyhow::bail!("unknown configuration key: {key}"),
        },
        ConfigAction::Set { key, value } => {
            manager.set(key, value)?;
            manager.save()?;
            println!("{key} = {}", manager.get(key).unwrap_or_default());
        }
        ConfigAction::List { section } => {
            let lines = match section.as_deref() {
                Some("mongo") => config::format_mongo(&manager.config().mongo),
                Some("consul") => config::format_consul(&manager.config().consul),
                Some(other) => anyhow::bail!("unknown configuration section: {other}"),
                None => config::format_sections(manager.config()),
            };
            for line in lines {
                println!("{line}");
            }
        }
        ConfigAction::Path => println!("{}", manager.path().display()),
    }
    Ok(())
}
