#![allow(missing_docs)]
use std::time::Duration;

use replicactl_cli::config::{CliConfig, ConfigManager};

#[test]
fn defaults_point_at_local_daemons() {
    let config = CliConfig::default();
    assert_eq!(config.mongo.addr.to_string(), "127.0.0.1:27017");
    assert_eq!(config.mongo.connect_timeout, Duration::from_secs(5));
    assert_eq!(config.mongo.op_timeout, Duration::from_secs(10));
    assert!(config.mongo.username.is_none());
    assert!(!config.consul.enabled);
    assert_eq!(config.consul.addr, "127.0.0.1:8500");
    assert_eq!(config.consul.service, "mongodb");
    assert_eq!(config.consul.check_interval, Duration::from_secs(15));
}

#[test]
fn loading_a_missing_file_yields_defaults_without_creating_it() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config_path = temp_dir.path().join("replicactl").join("config.toml");

    let manager = ConfigManager::load_with_path(&config_path).expect("load default config");
    assert_eq!(manager.config().mongo.addr.to_string(), "127.0.0.1:27017");
    assert!(!config_path.exists());
}

#[test]
fn set_values_persist_across_reload() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config_path = temp_dir.path().join("replicactl").join("config.toml");

    let mut manager = ConfigManager::load_with_path(&config_path).expect("load default config");
    manager.set("consul.enabled", "true").expect("set enabled");
    manager
        .set("consul.check_interval", "30s")
        .expect("set interval");
    manager
        .set("mongo.addr", "db-a.internal:27018")
        .expect("set addr");
    manager.save().expect("save config");

    let reloaded = ConfigManager::load_with_path(&config_path).expect("reload config");
    assert!(reloaded.config().consul.enabled);
    assert_eq!(
        reloaded.config().consul.check_interval,
        Duration::from_secs(30)
    );
    assert_eq!(
        reloaded.config().mongo.addr.to_string(),
        "db-a.internal:27018"
    );
    // Untouched keys keep their defaults.
    assert_eq!(reloaded.config().consul.service, "mongodb");
}

#[test]
fn username_round_trips_and_clears() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config_path = temp_dir.path().join("replicactl").join("config.toml");

    let mut manager = ConfigManager::load_with_path(&config_path).expect("load default config");
    manager.set("mongo.username", "admin").expect("set username");
    manager.save().expect("save config");

    let reloaded = ConfigManager::load_with_path(&config_path).expect("reload config");
    assert_eq!(reloaded.config().mongo.username.as_deref(), Some("admin"));

    let mut manager = reloaded;
    manager.set("mongo.username", "").expect("clear username");
    manager.save().expect("save config");

    let reloaded = ConfigManager::load_with_path(&config_path).expect("reload config");
    assert!(reloaded.config().mongo.username.is_none());
}

#[test]
fn get_renders_durations_in_humantime() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config_path = temp_dir.path().join("replicactl").join("config.toml");
    let manager = ConfigManager::load_with_path(&config_path).expect("load default config");

    assert_eq!(manager.get("consul.check_interval").as_deref(), Some("15s"));
    assert_eq!(manager.get("mongo.op_timeout").as_deref(), Some("10s"));
    assert_eq!(manager.get("consul.enabled").as_deref(), Some("false"));
}

#[test]
fn unknown_keys_are_rejected() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config_path = temp_dir.path().join("replicactl").join("config.toml");
    let mut manager = ConfigManager::load_with_path(&config_path).expect("load default config");

    assert!(manager.get("mongo.port").is_none());
    assert!(manager.set("mongo.port", "27017").is_err());
    assert!(manager.set("mongo.op_timeout", "soon").is_err());
    assert!(manager.set("consul.enabled", "maybe").is_err());
}

#[test]
fn invalid_files_are_reported_with_their_path() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "mongo = \"not a table\"").expect("write bad config");

    let err = ConfigManager::load_with_path(&config_path).unwrap_err();
    assert!(err.to_string().contains("invalid config"));
}
