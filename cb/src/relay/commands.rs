//! Host command surface and host notifications

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::schemas::ObjectCoordinates;

/// Commands sent to the CRM host SDK
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCommand {
    /// Widget finished its own setup
    Initialized {
        engagement_id: Option<u64>,
        is_logged_in: bool,
    },
    ResizeWidget {
        width: u32,
        height: u32,
    },
    IncomingCall {
        external_call_id: String,
        from_number: String,
        to_number: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        call_start_time: DateTime<Utc>,
        create_engagement: bool,
    },
    CallCompleted {
        external_call_id: String,
        engagement_id: Option<u64>,
    },
    NavigateToRecord {
        object_coordinates: ObjectCoordinates,
    },
}

impl HostCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::ResizeWidget { .. } => "resizeWidget",
            Self::IncomingCall { .. } => "incomingCall",
            Self::CallCompleted { .. } => "callCompleted",
            Self::NavigateToRecord { .. } => "navigateToRecord",
        }
    }
}

/// Where host commands go
///
/// Dispatch is best-effort: implementations log failures and never retry.
pub trait CommandSink: Send + Sync {
    fn dispatch(&self, command: HostCommand);
}

impl CommandSink for mpsc::UnboundedSender<HostCommand> {
    fn dispatch(&self, command: HostCommand) {
        debug!(command = command.name(), "CommandSink::dispatch: called");
        if let Err(e) = self.send(command) {
            warn!(command = e.0.name(), "Host command surface is gone, command dropped");
        }
    }
}

/// Callbacks fired by the host SDK after the readiness signal
#[derive(Debug, Clone, PartialEq)]
pub enum HostNotification {
    CallerIdMatchSucceeded(Value),
    CallerIdMatchFailed(Value),
    CreateEngagementSucceeded(Value),
    CreateEngagementFailed(Value),
    DialNumber(Value),
}

impl HostNotification {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallerIdMatchSucceeded(_) => "onCallerIdMatchSucceeded",
            Self::CallerIdMatchFailed(_) => "onCallerIdMatchFailed",
            Self::CreateEngagementSucceeded(_) => "onCreateEngagementSucceeded",
            Self::CreateEngagementFailed(_) => "onCreateEngagementFailed",
            Self::DialNumber(_) => "onDialNumber",
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            Self::CallerIdMatchSucceeded(payload)
            | Self::CallerIdMatchFailed(payload)
            | Self::CreateEngagementSucceeded(payload)
            | Self::CreateEngagementFailed(payload)
            | Self::DialNumber(payload) => payload,
        }
    }
}
