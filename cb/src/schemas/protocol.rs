//! Heartbeat protocol and window state messages
//!
//! Both families travel over same-origin broadcast channels. Protocol messages
//! are always stamped with the sender's role and identifier.

use serde::{Deserialize, Serialize};

use super::{Schema, ValidationError, check_call_sid};
use crate::peer::{PeerId, Role};

/// Discriminant of a protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "PONG")]
    Pong,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Ping => "PING",
            Self::Pong => "PONG",
        }
    }
}

/// READY / PING / PONG envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEvent {
    #[serde(rename = "event")]
    pub kind: ProtocolKind,
    pub source_location: Role,
    pub source_id: PeerId,
}

impl BroadcastEvent {
    pub fn new(kind: ProtocolKind, role: Role, id: PeerId) -> Self {
        Self {
            kind,
            source_location: role,
            source_id: id,
        }
    }

    pub fn ready(role: Role, id: PeerId) -> Self {
        Self::new(ProtocolKind::Ready, role, id)
    }

    pub fn ping(role: Role, id: PeerId) -> Self {
        Self::new(ProtocolKind::Ping, role, id)
    }

    pub fn pong(role: Role, id: PeerId) -> Self {
        Self::new(ProtocolKind::Pong, role, id)
    }

    pub fn tag(&self) -> &'static str {
        self.kind.as_str()
    }
}

impl Schema for BroadcastEvent {
    const FAMILY: &'static str = "protocol";
    const KNOWN_TAGS: &'static [&'static str] = &["READY", "PING", "PONG"];
}

/// Availability of the agent in the primary context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStatus {
    Unavailable,
    Available,
    OnCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Snapshot of the primary's call state, mirrored to secondaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowState {
    pub status: WindowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_direction: Option<CallDirection>,
}

impl WindowState {
    pub fn available() -> Self {
        Self {
            status: WindowStatus::Available,
            call_sid: None,
            call_direction: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            status: WindowStatus::Unavailable,
            call_sid: None,
            call_direction: None,
        }
    }

    pub fn on_call(call_sid: impl Into<String>, direction: CallDirection) -> Self {
        Self {
            status: WindowStatus::OnCall,
            call_sid: Some(call_sid.into()),
            call_direction: Some(direction),
        }
    }
}

/// Messages on the state channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum StateEvent {
    WindowStatusUpdate { info: WindowState },
}

impl StateEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::WindowStatusUpdate { .. } => "WindowStatusUpdate",
        }
    }
}

impl Schema for StateEvent {
    const FAMILY: &'static str = "state";
    const KNOWN_TAGS: &'static [&'static str] = &["WindowStatusUpdate"];

    fn check(&self) -> Result<(), ValidationError> {
        match self {
            Self::WindowStatusUpdate { info } => match &info.call_sid {
                Some(sid) => check_call_sid(Self::FAMILY, "info.callSid", sid),
                None => Ok(()),
            },
        }
    }
}
