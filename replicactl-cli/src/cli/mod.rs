//! CLI module organization

pub mod commands;
pub mod context;

pub use commands::{Cli, Commands, ConfigAction, MemberArgs, TargetArgs};
pub use context::CommandContext;
