//! Canonical `address:port` member identity.
//!
//! Replica set members, status entries, and registry instances are all joined
//! on the same key: the address and port a node serves on. `HostPort` is that
//! key as a value type, so a malformed host string is rejected at the edge
//! instead of surfacing as a silent mismatch deep inside a reconciliation
//! pass.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Failure to parse an `address:port` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostParseError {
    /// No `:port` suffix was present.
    #[error("host '{input}' is missing a ':port' suffix")]
    MissingPort {
        /// The rejected input.
        input: String,
    },
    /// The address part before the final colon was empty.
    #[error("host '{input}' has an empty address")]
    EmptyAddress {
        /// The rejected input.
        input: String,
    },
    /// The port part was not a valid 16-bit port number.
    #[error("host '{input}' has an invalid port")]
    InvalidPort {
        /// The rejected input.
        input: String,
    },
}

/// A member's canonical network identity.
///
/// Ordering and equality are derived from `(address, port)`, which makes
/// `BTreeSet<HostPort>` a deterministic set for diffing regardless of the
/// order collaborators list hosts in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostPort {
    address: String,
    port: u16,
}

impl HostPort {
    /// Build an identity from separate address and port parts.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Address part, without the port. IPv6 literals keep their brackets.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Port part.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl FromStr for HostPort {
    type Err = HostParseError;

    /// Split on the last colon so bracketed IPv6 literals (`[::1]:27017`)
    /// parse the same way hostname and IPv4 forms do.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, port) = s.rsplit_once(':').ok_or_else(|| HostParseError::MissingPort {
            input: s.to_string(),
        })?;
        if address.is_empty() {
            return Err(HostParseError::EmptyAddress {
                input: s.to_string(),
            });
        }
        let port = port.parse::<u16>().map_err(|_| HostParseError::InvalidPort {
            input: s.to_string(),
        })?;
        Ok(Self {
            address: address.to_string(),
            port,
        })
    }
}

// Serialized as a plain string so the BSON and JSON shapes stay identical to
// what the database and registry already store.
impl Serialize for HostPort {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}
