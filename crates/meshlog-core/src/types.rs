//! Protocol types for the meshlog notification log
//!
//! All types here are designed for deterministic serialization via postcard.
//! Field order matters for the wire encoding and must not be reordered.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A UTC instant as seconds and nanoseconds since the Unix epoch.
///
/// The derived ordering is lexicographic on `(secs, nanos)`, which matches
/// chronological order because `nanos` is always a non-negative sub-second
/// offset added to `secs`.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct LogInstant {
    pub secs: i64,
    pub nanos: u32,
}

impl LogInstant {
    /// Convert a wall-clock reading into a protocol instant.
    ///
    /// Instants before the Unix epoch or beyond `i64` seconds are not
    /// representable on the wire.
    pub fn from_system_time(t: SystemTime) -> Result<Self> {
        let since_epoch = t
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::TimestampOutOfRange)?;
        let secs = i64::try_from(since_epoch.as_secs()).map_err(|_| Error::TimestampOutOfRange)?;
        Ok(Self {
            secs,
            nanos: since_epoch.subsec_nanos(),
        })
    }

    /// Instant at whole seconds since the epoch.
    pub fn from_unix_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// Offset this instant by a retention duration.
    pub fn checked_add(self, d: Duration) -> Result<Self> {
        let d_secs = i64::try_from(d.as_secs()).map_err(|_| Error::TimestampOutOfRange)?;
        let mut secs = self
            .secs
            .checked_add(d_secs)
            .ok_or(Error::TimestampOutOfRange)?;
        let mut nanos = self.nanos + d.subsec_nanos();
        if nanos >= NANOS_PER_SEC {
            nanos -= NANOS_PER_SEC;
            secs = secs.checked_add(1).ok_or(Error::TimestampOutOfRange)?;
        }
        Ok(Self { secs, nanos })
    }

    /// Check the sub-second component is in range. Called on every decoded
    /// instant so that merge paths never observe a malformed timestamp.
    pub fn validate(&self) -> Result<()> {
        if self.nanos >= NANOS_PER_SEC {
            return Err(Error::TimestampOutOfRange);
        }
        Ok(())
    }
}

/// A fully qualified notification destination: one integration instance
/// within a receiver group of the routing configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Receiver {
    pub group_name: String,
    pub integration: String,
    pub name: String,
}

impl Receiver {
    pub fn new(
        group_name: impl Into<String>,
        integration: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group_name: group_name.into(),
            integration: integration.into(),
            name: name.into(),
        }
    }

    /// Canonical string form used in state-map keys.
    pub fn canonical(&self) -> String {
        format!("{}/{}/{}", self.group_name, self.integration, self.name)
    }
}

impl std::fmt::Display for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// One notification attempt: the most recent send for a (group, receiver)
/// pair as observed by some replica.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    /// Destination the notification went to
    pub receiver: Receiver,
    /// Opaque identifier of the alert group
    pub group_key: Vec<u8>,
    /// Content fingerprint of the alerts that were notified
    pub group_hash: Vec<u8>,
    /// Whether the notification announced resolution
    pub resolved: bool,
    /// When the notification was sent
    pub timestamp: LogInstant,
}

/// A log entry together with its expiration, as replicated across the mesh.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeshEntry {
    pub entry: Entry,
    /// Instant after which the entry is eligible for garbage collection
    pub expires_at: LogInstant,
}
