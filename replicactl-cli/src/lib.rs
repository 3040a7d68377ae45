//! replicactl library modules, shared by the binary and its tests.

pub mod cli;
pub mod config;
pub mod consul;
pub mod metadata;
pub mod mongo;
pub mod output;
