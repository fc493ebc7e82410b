//! Peer identity and role
//!
//! Every context generates one `PeerId` at startup and stamps it on every
//! protocol message it sends. The role decides which side of the heartbeat
//! protocol the context plays.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, collision-resistant identifier for one context
///
/// Backed by a UUIDv7 so identifiers sort by creation time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// First 8 characters, for compact log lines
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl From<Uuid> for PeerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for PeerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the protocol a context plays
///
/// On the wire these are the host's iframe locations: the primary is the
/// `window` context that embeds the agent desktop, secondaries are `remote`
/// (popped-out) contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "window")]
    Primary,
    #[serde(rename = "remote")]
    Secondary,
}

impl Role {
    /// Map a host-declared iframe location to a role
    pub fn from_location(location: &str) -> Option<Self> {
        match location {
            "window" => Some(Self::Primary),
            "remote" => Some(Self::Secondary),
            _ => None,
        }
    }

    pub fn location(&self) -> &'static str {
        match self {
            Self::Primary => "window",
            Self::Secondary => "remote",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}
