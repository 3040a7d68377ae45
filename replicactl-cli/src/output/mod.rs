//! Output formatting for command results.

pub mod table;

pub use table::TableBuilder;

use anyhow::Result;
use replicactl_core::reconciler::ReconcileReport;
use replicactl_core::replset::ReplicaSetStatus;

/// One line per outcome on stdout; registry failures go to stderr so a
/// partially applied pass is visible without failing the command.
pub fn print_report(report: &ReconcileReport) {
    println!("{}", report.outcome);
    for failure in &report.registry_failures {
        eprintln!("warning: {} failed: {}", failure.action, failure.error);
    }
}

/// Render the member health table for `status`.
#[must_use]
pub fn render_status(status: &ReplicaSetStatus) -> String {
    let mut table = TableBuilder::new(&["MEMBER", "STATE", "HEALTH", "LAST HEARTBEAT"]);
    for member in &status.members {
        table.add_row(vec![
            member.name.to_string(),
            member.state_str.clone(),
            member
                .health
                .map_or_else(|| "-".to_string(), |health| format!("{health:.0}")),
            member.last_heartbeat.map_or_else(
                || "-".to_string(),
                |ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
        ]);
    }
    format!("replica set: {}\n{}", status.set, table.render())
}

pub fn print_status(status: &ReplicaSetStatus) {
    print!("{}", render_status(status));
}

/// Machine-readable payload for `status --json`.
pub fn status_json(status: &ReplicaSetStatus) -> Result<String> {
    Ok(serde_json::to_string_pretty(status)?)
}
