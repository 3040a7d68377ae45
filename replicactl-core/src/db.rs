//! Database administration seam.
//!
//! The engine speaks to the database through [`ReplicaSetAdmin`]; the shipped
//! binary implements it over the MongoDB driver, tests implement it with
//! in-memory fakes. The command payload types pin the wire shape of the three
//! admin commands the engine issues.

use async_trait::async_trait;
use bson::Document;
use serde::Serialize;
use thiserror::Error;

use crate::replset::{ReplicaSetConfig, ReplicaSetStatus};

/// Errors surfaced by the database backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
    /// The server could not be reached or selected.
    #[error("database connection failed: {0}")]
    Connection(String),
    /// The driver-level operation timed out.
    #[error("database operation timed out: {0}")]
    Timeout(String),
    /// The config collection did not hold exactly one document.
    ///
    /// Zero documents means the node was never initiated; more than one
    /// means the node is in a state this tool refuses to touch.
    #[error("expected exactly one replica set config document, found {count}")]
    UnexpectedConfigShape {
        /// Number of documents found.
        count: u64,
    },
    /// The server rejected a reconfig because its version was stale.
    #[error("reconfig at version {submitted} lost to a concurrent change: {message}")]
    VersionConflict {
        /// Version of the configuration that was submitted.
        submitted: i64,
        /// Server-side rejection message.
        message: String,
    },
    /// Any other command failure.
    #[error("database command failed{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Command {
        /// Server error code, when one was reported.
        code: Option<i32>,
        /// Server error message.
        message: String,
    },
    /// A document failed to cross the BSON boundary in either direction.
    #[error("BSON conversion failed: {0}")]
    Codec(String),
}

/// Admin-command view of a single database node.
///
/// Fetches read the node's own authoritative state; `apply_reconfig` and
/// `initiate` submit cluster-wide changes through it.
#[async_trait]
pub trait ReplicaSetAdmin: Send + Sync {
    /// The node's current replica set configuration document.
    async fn fetch_config(&self) -> Result<ReplicaSetConfig, DbError>;

    /// The node's view of per-member health.
    async fn fetch_status(&self) -> Result<ReplicaSetStatus, DbError>;

    /// Submit a full replacement configuration.
    ///
    /// The server accepts it only if `config.version` is exactly one ahead
    /// of the version it holds; otherwise this fails with
    /// [`DbError::VersionConflict`].
    async fn apply_reconfig(&self, config: &ReplicaSetConfig) -> Result<(), DbError>;

    /// Initiate a brand-new single-member replica set on this node.
    ///
    /// The server derives the initial configuration itself, with this node
    /// as the only member. Fails if the node already belongs to a set.
    async fn initiate(&self) -> Result<(), DbError>;
}

/// Wire shape of the reconfiguration command.
#[derive(Debug, Serialize)]
pub struct ReconfigRequest<'a> {
    /// The replacement configuration document.
    #[serde(rename = "replSetReconfig")]
    pub config: &'a ReplicaSetConfig,
}

/// Wire shape of the initiate command.
///
/// An empty inner document tells the server to generate the initial
/// configuration from its own identity.
#[derive(Debug, Default, Serialize)]
pub struct InitiateRequest {
    #[serde(rename = "replSetInitiate")]
    pub config: Document,
}

/// Wire shape of the status command.
#[derive(Debug, Serialize)]
pub struct StatusRequest {
    #[serde(rename = "replSetGetStatus")]
    pub status: i32,
}

impl Default for StatusRequest {
    fn default() -> Self {
        Self { status: 1 }
    }
}
