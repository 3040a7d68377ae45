//! Logical replica set document model.
//!
//! These types mirror the administrative documents the database reads and
//! writes (`local.system.replset`, `replSetGetStatus`) closely enough that a
//! fetched configuration can be mutated and resubmitted without a parallel
//! wire model. Fields this engine does not interpret ride along untouched in
//! `settings` and the flattened `extra` documents, so a reconfig never strips
//! server-managed state like `protocolVersion` or `term`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use bson::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host::HostPort;

/// The replica set membership configuration document.
///
/// `version` is the optimistic concurrency token: every applied mutation
/// increments it by exactly one, and the database rejects a reconfig whose
/// base version is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSetConfig {
    /// Cluster identifier, immutable once assigned.
    #[serde(rename = "_id")]
    pub id: String,
    /// Monotonically increasing configuration version.
    pub version: i64,
    /// Current members, unique by id and by host.
    pub members: Vec<Member>,
    /// Opaque replication settings, passed through unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Document>,
    /// Top-level fields this engine does not interpret.
    #[serde(flatten)]
    pub extra: Document,
}

impl ReplicaSetConfig {
    /// Whether any member claims `host` as its identity.
    #[must_use]
    pub fn contains_host(&self, host: &HostPort) -> bool {
        self.members.iter().any(|member| member.host == *host)
    }

    /// The set of member hosts, for joining against status and registry data.
    #[must_use]
    pub fn member_hosts(&self) -> BTreeSet<HostPort> {
        self.members
            .iter()
            .map(|member| member.host.clone())
            .collect()
    }
}

/// One member entry inside a [`ReplicaSetConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Unique, non-negative member id. Assigned once and never reused while
    /// the configuration document lives.
    #[serde(rename = "_id")]
    pub member_id: i64,
    /// Canonical `address:port` identity.
    pub host: HostPort,
    /// Member holds no data and only votes.
    #[serde(default)]
    pub arbiter_only: bool,
    /// Member builds secondary indexes (server default true).
    #[serde(default = "default_true")]
    pub build_indexes: bool,
    /// Member is invisible to clients.
    #[serde(default)]
    pub hidden: bool,
    /// Election weight. The server stores this as a double.
    #[serde(default = "default_priority")]
    pub priority: f64,
    /// Replica set tags, passed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    /// Replication delay in seconds, passed through; absent stays absent so
    /// servers that dropped the field never see it reintroduced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slave_delay: Option<i64>,
    /// Election votes, passed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<i64>,
    /// Per-member fields this engine does not interpret.
    #[serde(flatten)]
    pub extra: Document,
}

impl Member {
    /// A data-bearing member with server-default role settings.
    #[must_use]
    pub fn new(member_id: i64, host: HostPort) -> Self {
        Self {
            member_id,
            host,
            arbiter_only: false,
            build_indexes: true,
            hidden: false,
            priority: default_priority(),
            tags: None,
            slave_delay: None,
            votes: None,
            extra: Document::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_priority() -> f64 {
    1.0
}

/// Replication member states as reported by `replSetGetStatus`.
///
/// Only [`MemberState::Down`] carries semantics for this engine (it marks a
/// member eligible for pruning); the remaining states are kept for reporting.
/// Codes outside the documented table are preserved in `Other` rather than
/// rejected, since newer servers may add states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum MemberState {
    /// Parsing configuration (0).
    Startup,
    /// Elected primary (1).
    Primary,
    /// Replicating from the primary (2).
    Secondary,
    /// Performing startup self-checks or rollback recovery (3).
    Recovering,
    /// Initial sync in progress (5).
    Startup2,
    /// Never communicated with this node (6).
    Unknown,
    /// Arbiter (7).
    Arbiter,
    /// Unreachable from this node (8).
    Down,
    /// Actively rolling back writes (9).
    Rollback,
    /// Removed from the configuration (10).
    Removed,
    /// A state code outside the documented table.
    Other(i32),
}

impl MemberState {
    /// The database itself considers this member unreachable.
    #[must_use]
    pub const fn is_down(self) -> bool {
        matches!(self, Self::Down)
    }
}

impl From<i32> for MemberState {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Startup,
            1 => Self::Primary,
            2 => Self::Secondary,
            3 => Self::Recovering,
            5 => Self::Startup2,
            6 => Self::Unknown,
            7 => Self::Arbiter,
            8 => Self::Down,
            9 => Self::Rollback,
            10 => Self::Removed,
            other => Self::Other(other),
        }
    }
}

impl From<MemberState> for i32 {
    fn from(state: MemberState) -> Self {
        match state {
            MemberState::Startup => 0,
            MemberState::Primary => 1,
            MemberState::Secondary => 2,
            MemberState::Recovering => 3,
            MemberState::Startup2 => 5,
            MemberState::Unknown => 6,
            MemberState::Arbiter => 7,
            MemberState::Down => 8,
            MemberState::Rollback => 9,
            MemberState::Removed => 10,
            MemberState::Other(other) => other,
        }
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Startup => "STARTUP",
            Self::Primary => "PRIMARY",
            Self::Secondary => "SECONDARY",
            Self::Recovering => "RECOVERING",
            Self::Startup2 => "STARTUP2",
            Self::Unknown => "UNKNOWN",
            Self::Arbiter => "ARBITER",
            Self::Down => "DOWN",
            Self::Rollback => "ROLLBACK",
            Self::Removed => "REMOVED",
            Self::Other(code) => return write!(f, "STATE({code})"),
        };
        f.write_str(label)
    }
}

/// Read-only health report for one member, as the database sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    /// Member identity, equal to the config entry's `host`.
    pub name: HostPort,
    /// Current replication state code.
    pub state: MemberState,
    /// Server-rendered state label.
    pub state_str: String,
    /// Reported health flag (1.0 healthy, 0.0 not), absent for the node
    /// answering the status command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<f64>,
    /// Last heartbeat received from this member, absent for self.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// The typed `replSetGetStatus` report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSetStatus {
    /// Replica set name.
    pub set: String,
    /// Per-member health reports.
    pub members: Vec<MemberStatus>,
}

impl ReplicaSetStatus {
    /// Hosts of every member the database does not report as down.
    ///
    /// This is the liveness ground truth a reconciliation pass diffs the
    /// registry against.
    #[must_use]
    pub fn live_hosts(&self) -> BTreeSet<HostPort> {
        self.members
            .iter()
            .filter(|member| !member.state.is_down())
            .map(|member| member.name.clone())
            .collect()
    }

    /// Hosts of every member currently reported as down.
    #[must_use]
    pub fn dead_hosts(&self) -> BTreeSet<HostPort> {
        self.members
            .iter()
            .filter(|member| member.state.is_down())
            .map(|member| member.name.clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use bson::doc;

    use super::*;

    fn make_member(id: i64, host: &str) -> Member {
        Member::new(id, host.parse().unwrap())
    }

    fn make_status(name: &str, state: MemberState) -> MemberStatus {
        MemberStatus {
            name: name.parse().unwrap(),
            state,
            state_str: state.to_string(),
            health: None,
            last_heartbeat: None,
        }
    }

    #[test]
    fn member_serializes_with_wire_field_names() {
        let member = make_member(3, "db-1.internal:27017");
        let value = serde_json::to_value(&member).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["_id"], 3);
        assert_eq!(object["host"], "db-1.internal:27017");
        assert_eq!(object["arbiterOnly"], false);
        assert_eq!(object["buildIndexes"], true);
        assert_eq!(object["hidden"], false);
        assert!((object["priority"].as_f64().unwrap() - 1.0).abs() < f64::EPSILON);
        // Absent pass-through fields stay absent.
        assert!(!object.contains_key("slaveDelay"));
        assert!(!object.contains_key("votes"));
        assert!(!object.contains_key("tags"));
    }

    #[test]
    fn config_preserves_unknown_fields_through_round_trip() {
        let raw = doc! {
            "_id": "rs0",
            "version": 4_i64,
            "protocolVersion": 1_i64,
            "term": 7_i64,
            "members": [
                { "_id": 0_i64, "host": "a.internal:27017", "secondaryDelaySecs": 0_i64 },
            ],
            "settings": { "chainingAllowed": true },
        };
        let config: ReplicaSetConfig = bson::from_document(raw).unwrap();
        assert_eq!(config.id, "rs0");
        assert_eq!(config.version, 4);
        assert_eq!(config.extra.get_i64("protocolVersion").unwrap(), 1);
        assert_eq!(config.extra.get_i64("term").unwrap(), 7);
        assert_eq!(
            config.members[0].extra.get_i64("secondaryDelaySecs").unwrap(),
            0
        );

        let back = bson::to_document(&config).unwrap();
        assert_eq!(back.get_i64("protocolVersion").unwrap(), 1);
        assert_eq!(back.get_i64("term").unwrap(), 7);
        assert!(back.get_document("settings").unwrap().get_bool("chainingAllowed").unwrap());
    }

    #[test]
    fn config_decodes_double_priority_and_int32_version() {
        // Real servers store priority as a double and may store version as
        // an int32; both must decode.
        let raw = doc! {
            "_id": "rs0",
            "version": 2_i32,
            "members": [
                { "_id": 0_i32, "host": "a.internal:27017", "priority": 1.0_f64 },
            ],
        };
        let config: ReplicaSetConfig = bson::from_document(raw).unwrap();
        assert_eq!(config.version, 2);
        assert_eq!(config.members[0].member_id, 0);
        assert!((config.members[0].priority - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn member_state_codes_map_both_directions() {
        assert_eq!(MemberState::from(8), MemberState::Down);
        assert_eq!(MemberState::from(1), MemberState::Primary);
        assert_eq!(MemberState::from(42), MemberState::Other(42));
        assert_eq!(i32::from(MemberState::Down), 8);
        assert_eq!(i32::from(MemberState::Other(42)), 42);
        assert!(MemberState::Down.is_down());
        assert!(!MemberState::Secondary.is_down());
    }

    #[test]
    fn member_state_displays_server_labels() {
        assert_eq!(MemberState::Primary.to_string(), "PRIMARY");
        assert_eq!(MemberState::Down.to_string(), "DOWN");
        assert_eq!(MemberState::Other(42).to_string(), "STATE(42)");
    }

    #[test]
    fn status_partitions_members_by_liveness() {
        let status = ReplicaSetStatus {
            set: "rs0".to_string(),
            members: vec![
                make_status("a.internal:27017", MemberState::Primary),
                make_status("b.internal:27017", MemberState::Down),
                make_status("c.internal:27017", MemberState::Secondary),
            ],
        };
        let live = status.live_hosts();
        let dead = status.dead_hosts();
        assert_eq!(live.len(), 2);
        assert!(live.contains(&"a.internal:27017".parse().unwrap()));
        assert!(live.contains(&"c.internal:27017".parse().unwrap()));
        assert_eq!(dead.len(), 1);
        assert!(dead.contains(&"b.internal:27017".parse().unwrap()));
    }

    #[test]
    fn contains_host_matches_exact_identity() {
        let config = ReplicaSetConfig {
            id: "rs0".to_string(),
            version: 1,
            members: vec![make_member(0, "a.internal:27017")],
            settings: None,
            extra: Document::new(),
        };
        assert!(config.contains_host(&"a.internal:27017".parse().unwrap()));
        assert!(!config.contains_host(&"a.internal:27018".parse().unwrap()));
    }
}
