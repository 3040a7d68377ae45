//! One-pass reconciliation of replica set membership with the registry.
//!
//! A [`Reconciler`] runs a single pass per call: fetch current state, compute
//! the change in memory, apply it to the database, then converge the registry.
//! It never loops or retries internally. A version conflict means another
//! actor changed the configuration between fetch and apply; the pass stops
//! with [`ReconcileError::Conflict`] and the caller re-runs to recompute from
//! fresh state.
//!
//! Failure ordering is deliberate. Anything that fails before the database
//! reconfig aborts the pass with nothing changed. Registry updates come last
//! and are individually non-fatal: once the database holds the new
//! configuration the pass is a success, and leftover registry drift is
//! reported in the [`ReconcileReport`] for the next pass to repair.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::bootstrap::{self, ClusterPlan};
use crate::db::{DbError, ReplicaSetAdmin};
use crate::error::{Phase, ReconcileError};
use crate::host::HostPort;
use crate::mutate::{self, MemberDraft, MutateError};
use crate::registry::{self, HealthCheck, RegistryError, ServiceRegistry};
use crate::replset::ReplicaSetStatus;

/// Service name members are registered under unless overridden.
pub const DEFAULT_SERVICE: &str = "mongodb";

/// Per-operation budget unless overridden.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// What a completed pass did to the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new configuration was applied at this version.
    Applied {
        /// Version of the applied configuration.
        version: i64,
    },
    /// The host was already a member; nothing was applied.
    AlreadyMember {
        /// The host that was to be added.
        host: HostPort,
    },
    /// The host was not a member; nothing was applied.
    NotAMember {
        /// The host that was to be removed.
        host: HostPort,
    },
    /// A brand-new replica set was initiated on this host.
    Bootstrapped {
        /// The first member of the new set.
        host: HostPort,
    },
    /// The configuration was already converged.
    Unchanged,
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied { version } => {
                write!(f, "applied configuration version {version}")
            }
            Self::AlreadyMember { host } => {
                write!(f, "{host} is already a member; nothing to do")
            }
            Self::NotAMember { host } => {
                write!(f, "{host} is not a member; nothing to do")
            }
            Self::Bootstrapped { host } => {
                write!(f, "bootstrapped a new replica set on {host}")
            }
            Self::Unchanged => f.write_str("configuration already converged"),
        }
    }
}

impl From<MutateError> for ReconcileOutcome {
    fn from(err: MutateError) -> Self {
        match err {
            MutateError::AlreadyMember { host } => Self::AlreadyMember { host },
            MutateError::NotAMember { host } => Self::NotAMember { host },
        }
    }
}

/// A registry update the pass attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryAction {
    /// Register `host` under the configured service.
    Register {
        /// Host being registered.
        host: HostPort,
    },
    /// Remove the registration with this id.
    Deregister {
        /// Registry-side id being removed.
        service_id: String,
    },
}

impl std::fmt::Display for RegistryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register { host } => write!(f, "register {host}"),
            Self::Deregister { service_id } => write!(f, "deregister {service_id}"),
        }
    }
}

/// A registry update that failed after the database change succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryFailure {
    /// The update that was attempted.
    pub action: RegistryAction,
    /// Why it failed.
    pub error: RegistryError,
}

/// Result of a completed pass.
///
/// `registry_failures` is non-empty when the database change went through
/// but some registry updates did not; a later pass converges them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// What the pass did to the configuration.
    pub outcome: ReconcileOutcome,
    /// Registry updates that failed, in attempt order.
    pub registry_failures: Vec<RegistryFailure>,
}

impl ReconcileReport {
    /// A report with no registry failures.
    #[must_use]
    pub fn clean(outcome: ReconcileOutcome) -> Self {
        Self {
            outcome,
            registry_failures: Vec::new(),
        }
    }

    /// True when every attempted registry update also succeeded.
    #[must_use]
    pub fn fully_applied(&self) -> bool {
        self.registry_failures.is_empty()
    }
}

/// Drives reconciliation passes against a database and an optional registry.
///
/// Passes that exist to keep the registry truthful (`ensure`, `prune`)
/// refuse to run without one; plain membership changes (`add`, `remove`)
/// simply skip the registry when none is configured.
pub struct Reconciler {
    db: Arc<dyn ReplicaSetAdmin>,
    registry: Option<Arc<dyn ServiceRegistry>>,
    service: String,
    check: HealthCheck,
    op_timeout: Duration,
}

impl Reconciler {
    /// A reconciler over `db` with no registry and default settings.
    #[must_use]
    pub fn new(db: Arc<dyn ReplicaSetAdmin>) -> Self {
        Self {
            db,
            registry: None,
            service: DEFAULT_SERVICE.to_string(),
            check: HealthCheck::default(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Attach a service registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the service name registrations go under.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Override the per-operation budget.
    #[must_use]
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Override the health check attached to registrations.
    #[must_use]
    pub fn with_health_check(mut self, check: HealthCheck) -> Self {
        self.check = check;
        self
    }

    /// Bring `draft.host` into the cluster, creating the cluster if the
    /// registry shows no instance yet.
    ///
    /// The first-node check is registry-presence-based, so two nodes racing
    /// an empty registry can both pick bootstrap; the loser's initiate fails
    /// at the database and a re-run joins normally.
    pub async fn ensure(&self, draft: &MemberDraft) -> Result<ReconcileReport, ReconcileError> {
        let registry = self.require_registry("ensure")?;
        let entries = self
            .registry_call(Phase::FetchingConfig, registry.list_instances(&self.service))
            .await?;
        let plan = bootstrap::decide(&entries);
        info!(host = %draft.host, plan = %plan, registered = entries.len(), "decided cluster entry plan");
        match plan {
            ClusterPlan::Bootstrap => self.initiate(&draft.host).await,
            ClusterPlan::Join => self.add(draft).await,
        }
    }

    /// Initiate a new single-member replica set on `host` and register it.
    pub async fn initiate(&self, host: &HostPort) -> Result<ReconcileReport, ReconcileError> {
        self.db_call(Phase::ApplyingConfig, self.db.initiate()).await?;
        info!(host = %host, "initiated new replica set");

        let mut failures = Vec::new();
        if let Some(registry) = &self.registry {
            self.register_host(registry.as_ref(), host, &mut failures).await;
        }
        Ok(ReconcileReport {
            outcome: ReconcileOutcome::Bootstrapped { host: host.clone() },
            registry_failures: failures,
        })
    }

    /// Add `draft` as a new member and register it.
    pub async fn add(&self, draft: &MemberDraft) -> Result<ReconcileReport, ReconcileError> {
        let config = self
            .db_call(Phase::FetchingConfig, self.db.fetch_config())
            .await?;
        debug!(
            set = %config.id,
            version = config.version,
            members = config.members.len(),
            phase = %Phase::Computing,
            "fetched replica set configuration"
        );
        let next = match mutate::add_member(&config, draft) {
            Ok(next) => next,
            Err(err) => {
                info!(host = %draft.host, "{err}; nothing to apply");
                return Ok(ReconcileReport::clean(err.into()));
            }
        };
        self.db_call(Phase::ApplyingConfig, self.db.apply_reconfig(&next))
            .await?;
        info!(set = %next.id, version = next.version, host = %draft.host, "added member");

        let mut failures = Vec::new();
        if let Some(registry) = &self.registry {
            self.register_host(registry.as_ref(), &draft.host, &mut failures)
                .await;
        }
        Ok(ReconcileReport {
            outcome: ReconcileOutcome::Applied {
                version: next.version,
            },
            registry_failures: failures,
        })
    }

    /// Remove the member carrying `host` and drop its registration.
    pub async fn remove(&self, host: &HostPort) -> Result<ReconcileReport, ReconcileError> {
        let config = self
            .db_call(Phase::FetchingConfig, self.db.fetch_config())
            .await?;
        let next = match mutate::remove_member(&config, host) {
            Ok(next) => next,
            Err(err) => {
                info!(host = %host, "{err}; nothing to apply");
                return Ok(ReconcileReport::clean(err.into()));
            }
        };
        self.db_call(Phase::ApplyingConfig, self.db.apply_reconfig(&next))
            .await?;
        info!(set = %next.id, version = next.version, host = %host, "removed member");

        let mut failures = Vec::new();
        if let Some(registry) = &self.registry {
            self.deregister_host(registry.as_ref(), host, &mut failures)
                .await;
        }
        Ok(ReconcileReport {
            outcome: ReconcileOutcome::Applied {
                version: next.version,
            },
            registry_failures: failures,
        })
    }

    /// Drop every dead member in one reconfiguration round, then converge
    /// the registry on the members the cluster reports live.
    pub async fn prune(&self) -> Result<ReconcileReport, ReconcileError> {
        let registry = self.require_registry("prune")?;
        let status = self
            .db_call(Phase::FetchingConfig, self.db.fetch_status())
            .await?;
        // Listed before any mutation so a registry outage aborts the pass
        // instead of surfacing as post-apply drift.
        let entries = self
            .registry_call(Phase::FetchingConfig, registry.list_instances(&self.service))
            .await?;

        let live = status.live_hosts();
        let dead = status.dead_hosts();
        debug!(
            set = %status.set,
            live = live.len(),
            dead = dead.len(),
            registered = entries.len(),
            phase = %Phase::Computing,
            "partitioned members by liveness"
        );

        let mut outcome = ReconcileOutcome::Unchanged;
        if !dead.is_empty() {
            let config = self
                .db_call(Phase::FetchingConfig, self.db.fetch_config())
                .await?;
            let prune = mutate::prune_dead(&config, &dead);
            if prune.removed.is_empty() {
                debug!("dead hosts are not configured members; nothing to prune");
            } else {
                self.db_call(Phase::ApplyingConfig, self.db.apply_reconfig(&prune.config))
                    .await?;
                info!(
                    set = %prune.config.id,
                    version = prune.config.version,
                    removed = prune.removed.len(),
                    "pruned dead members"
                );
                outcome = ReconcileOutcome::Applied {
                    version: prune.config.version,
                };
            }
        }

        let delta = registry::diff(&entries, &live);
        let mut failures = Vec::new();
        if !delta.is_empty() {
            info!(
                deregister = delta.deregister.len(),
                register = delta.register.len(),
                "reconciling registry with live members"
            );
        }
        for service_id in &delta.deregister {
            self.try_registry(
                RegistryAction::Deregister {
                    service_id: service_id.clone(),
                },
                registry.deregister_instance(service_id),
                &mut failures,
            )
            .await;
        }
        for host in &delta.register {
            self.try_registry(
                RegistryAction::Register { host: host.clone() },
                registry.register_instance(&self.service, host, &host.to_string(), &self.check),
                &mut failures,
            )
            .await;
        }
        Ok(ReconcileReport {
            outcome,
            registry_failures: failures,
        })
    }

    /// The cluster's view of per-member health.
    pub async fn status(&self) -> Result<ReplicaSetStatus, ReconcileError> {
        self.db_call(Phase::FetchingConfig, self.db.fetch_status())
            .await
    }

    fn require_registry(
        &self,
        pass: &'static str,
    ) -> Result<&dyn ServiceRegistry, ReconcileError> {
        self.registry
            .as_deref()
            .ok_or(ReconcileError::RegistryRequired(pass))
    }

    /// Register `host` unless the registry already holds its id.
    ///
    /// Registration overwrites in place, so the pre-listing is only there to
    /// keep converged re-runs quiet; a failed listing falls through to the
    /// registration itself.
    async fn register_host(
        &self,
        registry: &dyn ServiceRegistry,
        host: &HostPort,
        failures: &mut Vec<RegistryFailure>,
    ) {
        let service_id = host.to_string();
        match timeout(self.op_timeout, registry.list_instances(&self.service)).await {
            Ok(Ok(entries)) if entries.iter().any(|e| e.service_id == service_id) => {
                debug!(service_id = %service_id, "instance already registered");
                return;
            }
            Ok(Ok(_)) => {}
            Ok(Err(error)) => {
                debug!(error = %error, "registry listing failed; registering anyway");
            }
            Err(_) => {
                debug!("registry listing timed out; registering anyway");
            }
        }
        self.try_registry(
            RegistryAction::Register { host: host.clone() },
            registry.register_instance(&self.service, host, &service_id, &self.check),
            failures,
        )
        .await;
    }

    /// Drop every registration advertising `host`.
    ///
    /// Matching goes by advertised host rather than assuming the id
    /// convention, so registrations made under older id schemes still get
    /// cleaned up. When the listing itself fails the conventional id is
    /// deregistered blind.
    async fn deregister_host(
        &self,
        registry: &dyn ServiceRegistry,
        host: &HostPort,
        failures: &mut Vec<RegistryFailure>,
    ) {
        let service_ids = match timeout(self.op_timeout, registry.list_instances(&self.service))
            .await
        {
            Ok(Ok(entries)) => {
                let matching: Vec<String> = entries
                    .iter()
                    .filter(|entry| entry.host() == *host)
                    .map(|entry| entry.service_id.clone())
                    .collect();
                if matching.is_empty() {
                    debug!(host = %host, "no registration found for removed member");
                    return;
                }
                matching
            }
            Ok(Err(error)) => {
                debug!(error = %error, "registry listing failed; deregistering by conventional id");
                vec![host.to_string()]
            }
            Err(_) => {
                debug!("registry listing timed out; deregistering by conventional id");
                vec![host.to_string()]
            }
        };
        for service_id in service_ids {
            self.try_registry(
                RegistryAction::Deregister {
                    service_id: service_id.clone(),
                },
                registry.deregister_instance(&service_id),
                failures,
            )
            .await;
        }
    }

    /// Run a database operation under the pass budget.
    ///
    /// Version conflicts are promoted out of the database error so callers
    /// can tell "re-run me" apart from "the backend is unwell".
    async fn db_call<T, F>(&self, phase: Phase, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        match timeout(self.op_timeout, fut).await {
            Err(_) => Err(ReconcileError::Timeout {
                phase,
                elapsed: self.op_timeout,
            }),
            Ok(Err(DbError::VersionConflict { submitted, message })) => {
                Err(ReconcileError::Conflict { submitted, message })
            }
            Ok(Err(source)) => Err(ReconcileError::Database { phase, source }),
            Ok(Ok(value)) => Ok(value),
        }
    }

    /// Run a registry read under the pass budget; failures abort the pass.
    async fn registry_call<T, F>(&self, phase: Phase, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, RegistryError>>,
    {
        match timeout(self.op_timeout, fut).await {
            Err(_) => Err(ReconcileError::Timeout {
                phase,
                elapsed: self.op_timeout,
            }),
            Ok(Err(source)) => Err(ReconcileError::Registry { phase, source }),
            Ok(Ok(value)) => Ok(value),
        }
    }

    /// Run a registry write under the pass budget; failures are recorded,
    /// not fatal.
    async fn try_registry<F>(
        &self,
        action: RegistryAction,
        fut: F,
        failures: &mut Vec<RegistryFailure>,
    ) where
        F: Future<Output = Result<(), RegistryError>>,
    {
        let result = match timeout(self.op_timeout, fut).await {
            Err(_) => Err(RegistryError::Transport(format!(
                "timed out after {:?}",
                self.op_timeout
            ))),
            Ok(result) => result,
        };
        if let Err(error) = result {
            warn!(action = %action, error = %error, "registry update failed; continuing");
            failures.push(RegistryFailure { action, error });
        }
    }
}
