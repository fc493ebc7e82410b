//! Agent desktop side of the relay
//!
//! The plugin and its host frame initialize independently, so the plugin
//! announces `PluginLoaded` as soon as it exists and considers the link ready
//! only once the host acknowledges it.

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use super::port::{MessagePort, WindowMessage};
use crate::schemas::{CallDetails, FlexEvent, HostEvent, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    /// Announced, waiting for the host's acknowledgment
    Pending,
    Ready,
}

/// Notifications from the agent desktop's task manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    LoggedIn,
    LoggedOut,
    ActivityChanged {
        available: bool,
    },
    /// The agent accepted a voice task
    TaskAccepted {
        call_sid: String,
        from_number: String,
        to_number: String,
        started_at: DateTime<Utc>,
    },
    /// A voice task wrapped up
    TaskCompleted {
        call_sid: String,
        reason: String,
    },
}

impl TaskEvent {
    fn into_flex_event(self) -> FlexEvent {
        match self {
            Self::LoggedIn => FlexEvent::UserLoggedIn,
            Self::LoggedOut => FlexEvent::UserLoggedOut,
            Self::ActivityChanged { available: true } => FlexEvent::UserAvailable,
            Self::ActivityChanged { available: false } => FlexEvent::UserUnavailable,
            Self::TaskAccepted {
                call_sid,
                from_number,
                to_number,
                started_at,
            } => FlexEvent::IncomingCall {
                create_engagement: true,
                call_details: CallDetails {
                    call_sid,
                    call_start_time: started_at,
                    from_number,
                    to_number,
                },
            },
            Self::TaskCompleted { call_sid, reason } => FlexEvent::CallEnded {
                call_sid,
                ended_reason: reason,
            },
        }
    }
}

/// Relay living inside the agent desktop frame
pub struct PluginRelay {
    host_origin: String,
    parent: MessagePort,
    status: PluginStatus,
}

impl PluginRelay {
    /// Create the relay and immediately announce `PluginLoaded` to the host
    pub fn new(host_origin: impl Into<String>, parent: MessagePort) -> Self {
        let relay = Self {
            host_origin: host_origin.into(),
            parent,
            status: PluginStatus::Pending,
        };
        debug!(host_origin = %relay.host_origin, "PluginRelay::new: announcing");
        relay.outbound(FlexEvent::PluginLoaded);
        relay
    }

    pub fn status(&self) -> PluginStatus {
        self.status
    }

    /// Handle a message delivered to the agent desktop window
    pub fn inbound(&mut self, message: WindowMessage) {
        if message.origin != self.host_origin {
            trace!(origin = %message.origin, "PluginRelay::inbound: ignoring foreign origin");
            return;
        }

        match HostEvent::validate(&message.data) {
            Ok(HostEvent::PluginLoadedEventReceived) => {
                if self.status != PluginStatus::Ready {
                    info!("Host acknowledged plugin, relay ready");
                }
                self.status = PluginStatus::Ready;
            }
            Err(e) => warn!(error = %e, "Dropping invalid host event"),
        }
    }

    /// Send an event to the host frame
    pub fn outbound(&self, event: FlexEvent) -> bool {
        let tag = event.tag();
        if !self.parent.post(&event) {
            warn!(event = tag, "Host window is gone, event dropped");
            return false;
        }
        debug!(event = tag, "PluginRelay::outbound: posted");
        true
    }

    /// Translate a task manager notification and forward it
    pub fn on_task(&self, task: TaskEvent) -> bool {
        debug!(?task, "PluginRelay::on_task: called");
        self.outbound(task.into_flex_event())
    }
}
