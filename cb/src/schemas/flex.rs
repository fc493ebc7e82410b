//! Events exchanged between the host widget and the embedded agent desktop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Schema, ValidationError, check_call_sid, timestamp};

fn default_create_engagement() -> bool {
    true
}

/// Details of a call the agent just accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDetails {
    pub call_sid: String,
    #[serde(with = "timestamp")]
    pub call_start_time: DateTime<Utc>,
    pub from_number: String,
    pub to_number: String,
}

/// Agent desktop -> host events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum FlexEvent {
    /// The plugin finished loading inside its frame
    PluginLoaded,
    UserLoggedIn,
    UserLoggedOut,
    UserAvailable,
    UserUnavailable,
    IncomingCall {
        #[serde(default = "default_create_engagement")]
        create_engagement: bool,
        call_details: CallDetails,
    },
    CallEnded {
        call_sid: String,
        ended_reason: String,
    },
}

impl FlexEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PluginLoaded => "PluginLoaded",
            Self::UserLoggedIn => "UserLoggedIn",
            Self::UserLoggedOut => "UserLoggedOut",
            Self::UserAvailable => "UserAvailable",
            Self::UserUnavailable => "UserUnavailable",
            Self::IncomingCall { .. } => "IncomingCall",
            Self::CallEnded { .. } => "CallEnded",
        }
    }
}

impl Schema for FlexEvent {
    const FAMILY: &'static str = "flex";
    const KNOWN_TAGS: &'static [&'static str] = &[
        "PluginLoaded",
        "UserLoggedIn",
        "UserLoggedOut",
        "UserAvailable",
        "UserUnavailable",
        "IncomingCall",
        "CallEnded",
    ];

    fn check(&self) -> Result<(), ValidationError> {
        match self {
            Self::IncomingCall { call_details, .. } => {
                check_call_sid(Self::FAMILY, "callDetails.callSid", &call_details.call_sid)
            }
            Self::CallEnded { call_sid, .. } => check_call_sid(Self::FAMILY, "callSid", call_sid),
            Self::PluginLoaded
            | Self::UserLoggedIn
            | Self::UserLoggedOut
            | Self::UserAvailable
            | Self::UserUnavailable => Ok(()),
        }
    }
}

/// Host -> agent desktop events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum HostEvent {
    /// Acknowledges `PluginLoaded`
    PluginLoadedEventReceived,
}

impl HostEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PluginLoadedEventReceived => "PluginLoadedEventReceived",
        }
    }
}

impl Schema for HostEvent {
    const FAMILY: &'static str = "host";
    const KNOWN_TAGS: &'static [&'static str] = &["PluginLoadedEventReceived"];
}
