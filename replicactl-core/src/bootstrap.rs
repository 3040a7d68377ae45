//! First-node detection against the service registry.

use std::fmt;

use crate::registry::RegistryEntry;

/// How a node should enter the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPlan {
    /// No instance is registered yet; initiate a new replica set.
    Bootstrap,
    /// The cluster exists; join it as a new member.
    Join,
}

impl fmt::Display for ClusterPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootstrap => f.write_str("bootstrap"),
            Self::Join => f.write_str("join"),
        }
    }
}

/// Decide between bootstrapping and joining from the registry listing.
///
/// The rule is presence-based: an empty listing means first node. Health is
/// deliberately ignored, so a cluster whose members are all unhealthy but
/// still registered reads as Join. Two nodes racing an empty registry can
/// both see Bootstrap; the database rejects the second `replSetInitiate`,
/// which is the backstop this check leans on.
#[must_use]
pub fn decide(entries: &[RegistryEntry]) -> ClusterPlan {
    if entries.is_empty() {
        ClusterPlan::Bootstrap
    } else {
        ClusterPlan::Join
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_means_bootstrap() {
        assert_eq!(decide(&[]), ClusterPlan::Bootstrap);
    }

    #[test]
    fn any_entry_means_join() {
        let entries = vec![RegistryEntry {
            service_id: "db-a:27017".to_string(),
            address: "db-a".to_string(),
            port: 27017,
        }];
        assert_eq!(decide(&entries), ClusterPlan::Join);
    }

    #[test]
    fn stale_entry_still_means_join() {
        // An entry for a long-gone host keeps the decision at Join; cleanup
        // is the prune pass's job, not this check's.
        let entries = vec![RegistryEntry {
            service_id: "decommissioned:27017".to_string(),
            address: "decommissioned".to_string(),
            port: 27017,
        }];
        assert_eq!(decide(&entries), ClusterPlan::Join);
    }

    #[test]
    fn plan_labels() {
        assert_eq!(ClusterPlan::Bootstrap.to_string(), "bootstrap");
        assert_eq!(ClusterPlan::Join.to_string(), "join");
    }
}
