//! Pure replica set configuration transforms.
//!
//! Every operation here takes the current configuration by reference and
//! returns a brand-new one (or a typed refusal), never touching the database.
//! The orchestrator owns applying the result; callers must always recompute
//! from a freshly fetched configuration, since two transforms derived from
//! the same stale snapshot would allocate the same member id and collide at
//! the version check.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::host::HostPort;
use crate::replset::{Member, ReplicaSetConfig};

/// A transform that would not change the configuration.
///
/// These are expected outcomes of idempotent re-runs, not faults: the
/// orchestrator reports them as no-ops and applies nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutateError {
    /// The host is already present in the member list.
    #[error("host {host} is already a member of the replica set")]
    AlreadyMember {
        /// The host that was to be added.
        host: HostPort,
    },
    /// No member carries the host.
    #[error("host {host} is not a member of the replica set")]
    NotAMember {
        /// The host that was to be removed.
        host: HostPort,
    },
}

/// Requested shape of a member to add, before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDraft {
    /// Canonical identity of the new member.
    pub host: HostPort,
    /// Add as a voting arbiter without data.
    pub arbiter_only: bool,
    /// Hide the member from clients.
    pub hidden: bool,
    /// Election weight, defaults to 1.
    pub priority: f64,
    /// Replica set tags to attach.
    pub tags: Option<BTreeMap<String, String>>,
}

impl MemberDraft {
    /// A plain data-bearing member for `host`.
    #[must_use]
    pub fn new(host: HostPort) -> Self {
        Self {
            host,
            arbiter_only: false,
            hidden: false,
            priority: 1.0,
            tags: None,
        }
    }

    fn materialize(&self, member_id: i64) -> Member {
        let mut member = Member::new(member_id, self.host.clone());
        member.arbiter_only = self.arbiter_only;
        member.hidden = self.hidden;
        member.priority = self.priority;
        member.tags = self.tags.clone();
        member
    }
}

/// Next free member id: one past the largest in use, or 0 for an empty list.
///
/// Ids are never reused while the configuration document lives, so a removed
/// member's id stays burned even though the id sequence need not be
/// contiguous.
#[must_use]
pub fn next_member_id(members: &[Member]) -> i64 {
    members
        .iter()
        .map(|member| member.member_id)
        .max()
        .map_or(0, |max| max + 1)
}

/// Append a new member and bump the version.
///
/// Refuses with [`MutateError::AlreadyMember`] when the draft's host is
/// already present; the input configuration is left untouched either way.
pub fn add_member(
    config: &ReplicaSetConfig,
    draft: &MemberDraft,
) -> Result<ReplicaSetConfig, MutateError> {
    if config.contains_host(&draft.host) {
        return Err(MutateError::AlreadyMember {
            host: draft.host.clone(),
        });
    }
    let mut next = config.clone();
    next.members.push(draft.materialize(next_member_id(&config.members)));
    next.version += 1;
    Ok(next)
}

/// Remove the member carrying `host` and bump the version.
///
/// Refuses with [`MutateError::NotAMember`] when no member matches, which is
/// how a repeated removal reports the earlier run already did the work.
pub fn remove_member(
    config: &ReplicaSetConfig,
    host: &HostPort,
) -> Result<ReplicaSetConfig, MutateError> {
    if !config.contains_host(host) {
        return Err(MutateError::NotAMember { host: host.clone() });
    }
    let mut next = config.clone();
    next.members.retain(|member| member.host != *host);
    next.version += 1;
    Ok(next)
}

/// Result of a dead-member prune.
#[derive(Debug, Clone, PartialEq)]
pub struct Prune {
    /// The configuration after pruning. Identical to the input (same
    /// version) when nothing was removed.
    pub config: ReplicaSetConfig,
    /// Hosts removed by this prune, in member order.
    pub removed: Vec<HostPort>,
}

/// Drop every member whose host is in `dead`, bumping the version exactly
/// once for the whole batch.
///
/// Each reconfiguration round is disruptive to a serving cluster, so a batch
/// of dead members costs one round, and a prune that intersects nothing costs
/// zero (no version bump at all).
#[must_use]
pub fn prune_dead(config: &ReplicaSetConfig, dead: &BTreeSet<HostPort>) -> Prune {
    let removed: Vec<HostPort> = config
        .members
        .iter()
        .filter(|member| dead.contains(&member.host))
        .map(|member| member.host.clone())
        .collect();
    let mut next = config.clone();
    if !removed.is_empty() {
        next.members.retain(|member| !dead.contains(&member.host));
        next.version += 1;
    }
    Prune {
        config: next,
        removed,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use bson::{doc, Document};
    use proptest::prelude::*;

    use super::*;

    fn host(idx: usize) -> HostPort {
        HostPort::new(format!("node-{idx}.internal"), 27017)
    }

    /// Members with deliberately non-contiguous ids (idx * 2).
    fn make_config(count: usize) -> ReplicaSetConfig {
        let members = (0..count)
            .map(|idx| Member::new((idx * 2) as i64, host(idx)))
            .collect();
        ReplicaSetConfig {
            id: "rs0".to_string(),
            version: 1,
            members,
            settings: Some(doc! { "chainingAllowed": true }),
            extra: Document::new(),
        }
    }

    #[test]
    fn next_id_is_zero_for_empty_list() {
        assert_eq!(next_member_id(&[]), 0);
    }

    #[test]
    fn next_id_is_max_plus_one_with_gaps() {
        let config = make_config(3); // ids 0, 2, 4
        assert_eq!(next_member_id(&config.members), 5);
    }

    #[test]
    fn next_id_ignores_member_order() {
        let mut config = make_config(3);
        config.members.reverse();
        assert_eq!(next_member_id(&config.members), 5);
    }

    #[test]
    fn add_appends_with_fresh_id_and_single_bump() {
        let config = make_config(2); // ids 0, 2
        let draft = MemberDraft::new(host(9));
        let next = add_member(&config, &draft).unwrap();

        assert_eq!(next.version, config.version + 1);
        assert_eq!(next.members.len(), 3);
        let added = next.members.last().unwrap();
        assert_eq!(added.member_id, 3);
        assert_eq!(added.host, host(9));
        assert!((added.priority - 1.0).abs() < f64::EPSILON);
        assert!(added.build_indexes);
        // Untouched parts pass through.
        assert_eq!(next.id, config.id);
        assert_eq!(next.settings, config.settings);
        assert_eq!(&next.members[..2], &config.members[..]);
    }

    #[test]
    fn add_carries_draft_role_settings() {
        let config = make_config(1);
        let mut draft = MemberDraft::new(host(5));
        draft.arbiter_only = true;
        draft.hidden = true;
        draft.priority = 0.0;
        draft.tags = Some(BTreeMap::from([(
            "dc".to_string(),
            "fra1".to_string(),
        )]));

        let next = add_member(&config, &draft).unwrap();
        let added = next.members.last().unwrap();
        assert!(added.arbiter_only);
        assert!(added.hidden);
        assert!(added.priority.abs() < f64::EPSILON);
        assert_eq!(
            added.tags.as_ref().unwrap().get("dc").map(String::as_str),
            Some("fra1")
        );
    }

    #[test]
    fn add_refuses_present_host_and_leaves_input_alone() {
        let config = make_config(2);
        let err = add_member(&config, &MemberDraft::new(host(1))).unwrap_err();
        assert_eq!(err, MutateError::AlreadyMember { host: host(1) });
        assert_eq!(config.version, 1);
        assert_eq!(config.members.len(), 2);
    }

    #[test]
    fn remove_drops_single_member_and_bumps_once() {
        let config = make_config(3);
        let next = remove_member(&config, &host(1)).unwrap();
        assert_eq!(next.version, config.version + 1);
        assert_eq!(next.members.len(), 2);
        assert!(!next.contains_host(&host(1)));
        assert!(next.contains_host(&host(0)));
        assert!(next.contains_host(&host(2)));
    }

    #[test]
    fn remove_twice_reports_not_a_member() {
        let config = make_config(2);
        let once = remove_member(&config, &host(0)).unwrap();
        let err = remove_member(&once, &host(0)).unwrap_err();
        assert_eq!(err, MutateError::NotAMember { host: host(0) });
        // The second call mutated nothing.
        assert_eq!(once.version, config.version + 1);
        assert_eq!(once.members.len(), 1);
    }

    #[test]
    fn removed_id_is_not_reallocated_within_the_config() {
        let config = make_config(3); // ids 0, 2, 4
        let without_last = remove_member(&config, &host(2)).unwrap(); // drops id 4
        // The next add does not resurrect id 4's slot semantics; it allocates
        // past the ids still present.
        let next = add_member(&without_last, &MemberDraft::new(host(7))).unwrap();
        assert_eq!(next.members.last().unwrap().member_id, 3);
    }

    #[test]
    fn prune_of_disjoint_set_is_a_noop_without_bump() {
        let config = make_config(2);
        let dead: BTreeSet<HostPort> = [host(8), host(9)].into_iter().collect();
        let prune = prune_dead(&config, &dead);
        assert!(prune.removed.is_empty());
        assert_eq!(prune.config, config);
    }

    #[test]
    fn prune_of_empty_set_is_a_noop() {
        let config = make_config(2);
        let prune = prune_dead(&config, &BTreeSet::new());
        assert!(prune.removed.is_empty());
        assert_eq!(prune.config, config);
    }

    #[test]
    fn prune_batch_removes_all_dead_with_one_bump() {
        let config = make_config(4);
        let dead: BTreeSet<HostPort> = [host(1), host(3), host(9)].into_iter().collect();
        let prune = prune_dead(&config, &dead);

        assert_eq!(prune.removed, vec![host(1), host(3)]);
        assert_eq!(prune.config.version, config.version + 1);
        assert_eq!(prune.config.members.len(), 2);
        assert!(prune.config.contains_host(&host(0)));
        assert!(prune.config.contains_host(&host(2)));
    }

    proptest! {
        /// Adding a fresh host always appends exactly one member with id
        /// `max + 1` and bumps the version exactly once.
        #[test]
        fn add_always_appends_max_plus_one(count in 0usize..6) {
            let config = make_config(count);
            let draft = MemberDraft::new(host(100));
            let next = add_member(&config, &draft).unwrap();

            let expected_id = config
                .members
                .iter()
                .map(|m| m.member_id)
                .max()
                .map_or(0, |max| max + 1);
            prop_assert_eq!(next.members.len(), count + 1);
            prop_assert_eq!(next.members.last().unwrap().member_id, expected_id);
            prop_assert_eq!(next.version, config.version + 1);
        }

        /// Pruning any subset of members removes exactly that subset and
        /// bumps the version exactly once, regardless of subset size.
        #[test]
        fn prune_removes_exactly_the_subset(
            count in 1usize..7,
            mask in prop::collection::vec(any::<bool>(), 7),
        ) {
            let config = make_config(count);
            let dead: BTreeSet<HostPort> = config
                .members
                .iter()
                .enumerate()
                .filter(|(idx, _)| mask[*idx])
                .map(|(_, m)| m.host.clone())
                .collect();
            let prune = prune_dead(&config, &dead);

            let expected: Vec<HostPort> = config
                .members
                .iter()
                .filter(|m| dead.contains(&m.host))
                .map(|m| m.host.clone())
                .collect();
            prop_assert_eq!(&prune.removed, &expected);
            prop_assert_eq!(
                prune.config.members.len(),
                config.members.len() - expected.len()
            );
            if expected.is_empty() {
                prop_assert_eq!(prune.config.version, config.version);
            } else {
                prop_assert_eq!(prune.config.version, config.version + 1);
            }
            for member in &prune.config.members {
                prop_assert!(!dead.contains(&member.host));
            }
        }

        /// Add then remove of the same host restores the member set (ids and
        /// version move forward, membership is restored).
        #[test]
        fn add_then_remove_restores_membership(count in 0usize..5) {
            let config = make_config(count);
            let draft = MemberDraft::new(host(50));
            let added = add_member(&config, &draft).unwrap();
            let removed = remove_member(&added, &host(50)).unwrap();

            prop_assert_eq!(removed.members.len(), config.members.len());
            prop_assert_eq!(removed.version, config.version + 2);
            prop_assert!(!removed.contains_host(&host(50)));
        }
    }
}
