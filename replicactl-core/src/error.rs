//! Reconciliation pass failures.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::db::DbError;
use crate::registry::RegistryError;

/// Where in a reconciliation pass a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading current state from the database or registry.
    FetchingConfig,
    /// Computing the new configuration in memory.
    Computing,
    /// Submitting the new configuration to the database.
    ApplyingConfig,
    /// Converging the registry on the applied configuration.
    ApplyingRegistry,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchingConfig => f.write_str("fetching config"),
            Self::Computing => f.write_str("computing"),
            Self::ApplyingConfig => f.write_str("applying config"),
            Self::ApplyingRegistry => f.write_str("applying registry"),
        }
    }
}

/// A reconciliation pass that did not complete.
///
/// Every variant leaves the cluster in a state a fresh pass can repair;
/// in particular [`ReconcileError::Conflict`] means this pass computed
/// against a configuration that changed underneath it, and the only correct
/// reaction is to re-run from a fresh fetch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    /// The database failed during `phase`.
    #[error("database failure while {phase}")]
    Database {
        /// Phase the pass was in.
        phase: Phase,
        /// Underlying database error.
        #[source]
        source: DbError,
    },
    /// The registry failed during `phase`, before any change was applied.
    #[error("registry failure while {phase}")]
    Registry {
        /// Phase the pass was in.
        phase: Phase,
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// An operation exceeded the caller-supplied budget.
    #[error("timed out after {elapsed:?} while {phase}")]
    Timeout {
        /// Phase the pass was in.
        phase: Phase,
        /// The budget that was exhausted.
        elapsed: Duration,
    },
    /// The submitted configuration lost to a concurrent change.
    #[error("configuration changed concurrently (submitted version {submitted}): {message}")]
    Conflict {
        /// Version this pass submitted.
        submitted: i64,
        /// Server-side rejection message.
        message: String,
    },
    /// The requested pass needs a registry but none is configured.
    #[error("the {0} pass requires a service registry and none is configured")]
    RegistryRequired(&'static str),
}
