//! Replica set membership reconciliation engine.
//!
//! Keeps a MongoDB replica set's member list and a service registry's view
//! of it converged. All decision logic is pure and separately testable; the
//! [`reconciler::Reconciler`] stitches it to a database and registry through
//! the [`db::ReplicaSetAdmin`] and [`registry::ServiceRegistry`] seams.

// Safety-focused Clippy lints to prevent unsafe error handling regression
#![warn(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo
)]
#![deny(clippy::unwrap_in_result, clippy::panic_in_result_fn)]

pub mod bootstrap;
pub mod db;
pub mod error;
pub mod host;
pub mod mutate;
pub mod reconciler;
pub mod registry;
pub mod replset;

pub use bootstrap::ClusterPlan;
pub use db::{DbError, ReplicaSetAdmin};
pub use error::{Phase, ReconcileError};
pub use host::{HostParseError, HostPort};
pub use mutate::{MemberDraft, MutateError, Prune};
pub use reconciler::{
    ReconcileOutcome, ReconcileReport, Reconciler, RegistryAction, RegistryFailure,
    DEFAULT_OP_TIMEOUT, DEFAULT_SERVICE,
};
pub use registry::{
    HealthCheck, RegistryDelta, RegistryEntry, RegistryError, ServiceRegistry,
    DEFAULT_CHECK_INTERVAL,
};
pub use replset::{Member, MemberState, MemberStatus, ReplicaSetConfig, ReplicaSetStatus};
