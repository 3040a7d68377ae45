//! EC2 instance metadata lookups.

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Metadata endpoint every EC2 instance exposes.
pub const DEFAULT_BASE: &str = "http://169.254.169.254";

/// The instance's private IPv4 address, from the metadata service.
///
/// Used when a member is added with `--ec2` so hosts register under the
/// address the rest of the VPC reaches them at.
pub async fn local_ipv4(base: &str, timeout: Duration) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build metadata client")?;
    let url = format!("{}/latest/meta-data/local-ipv4", base.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("metadata request to {url} failed"))?
        .error_for_status()
        .context("metadata service rejected the request")?;
    let address = response
        .text()
        .await
        .context("failed to read metadata response")?
        .trim()
        .to_string();
    address
        .parse::<IpAddr>()
        .with_context(|| format!("metadata returned {address:?}, which is not an IP address"))?;
    Ok(address)
}
