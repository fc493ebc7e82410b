//! Host side of the relay (primary context)

use std::collections::HashMap;

use tracing::{debug, info, trace, warn};

use super::commands::{CommandSink, HostCommand};
use super::port::{MessagePort, WindowMessage};
use crate::schemas::{CallDirection, FlexEvent, HostEvent, Schema, WindowState};

/// Relays agent desktop events to the host SDK and back
pub struct HostRelay<C: CommandSink> {
    flex_origin: String,
    frame: Option<MessagePort>,
    commands: C,
    state: Option<WindowState>,
    engagements: HashMap<String, u64>,
    plugin_loaded: bool,
}

impl<C: CommandSink> HostRelay<C> {
    /// `flex_origin` must already be a normalized origin
    pub fn new(flex_origin: impl Into<String>, commands: C) -> Self {
        let flex_origin = flex_origin.into();
        debug!(%flex_origin, "HostRelay::new: called");
        Self {
            flex_origin,
            frame: None,
            commands,
            state: None,
            engagements: HashMap::new(),
            plugin_loaded: false,
        }
    }

    /// Attach the embedded agent desktop frame once it exists
    pub fn attach(&mut self, frame: MessagePort) {
        info!("Agent desktop frame attached");
        self.frame = Some(frame);
    }

    /// True once the plugin has announced itself
    pub fn plugin_loaded(&self) -> bool {
        self.plugin_loaded
    }

    pub fn state(&self) -> Option<&WindowState> {
        self.state.as_ref()
    }

    pub fn commands(&self) -> &C {
        &self.commands
    }

    /// Remember which engagement the host created for a call
    pub fn record_engagement(&mut self, call_sid: impl Into<String>, engagement_id: u64) {
        let call_sid = call_sid.into();
        debug!(%call_sid, engagement_id, "HostRelay::record_engagement: called");
        self.engagements.insert(call_sid, engagement_id);
    }

    /// Handle a message delivered to the host window
    ///
    /// Returns the new window state when the event changed it.
    pub fn inbound(&mut self, message: WindowMessage) -> Option<WindowState> {
        if message.origin != self.flex_origin {
            trace!(origin = %message.origin, "HostRelay::inbound: ignoring foreign origin");
            return None;
        }

        let event = match FlexEvent::validate(&message.data) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping invalid agent desktop event");
                return None;
            }
        };
        debug!(event = event.tag(), "HostRelay::inbound: dispatching");

        match event {
            FlexEvent::PluginLoaded => {
                self.plugin_loaded = true;
                self.outbound(HostEvent::PluginLoadedEventReceived);
                None
            }
            FlexEvent::IncomingCall {
                create_engagement,
                call_details,
            } => {
                info!(call_sid = %call_details.call_sid, "Incoming call");
                let state = WindowState::on_call(call_details.call_sid.clone(), CallDirection::Incoming);
                self.commands.dispatch(HostCommand::IncomingCall {
                    external_call_id: call_details.call_sid,
                    from_number: call_details.from_number,
                    to_number: call_details.to_number,
                    call_start_time: call_details.call_start_time,
                    create_engagement,
                });
                self.set_state(state)
            }
            FlexEvent::UserLoggedIn | FlexEvent::UserAvailable => self.set_state(WindowState::available()),
            FlexEvent::UserLoggedOut | FlexEvent::UserUnavailable => self.set_state(WindowState::unavailable()),
            FlexEvent::CallEnded { call_sid, ended_reason } => {
                info!(%call_sid, %ended_reason, "Call ended");
                let engagement_id = self.engagements.remove(&call_sid);
                if engagement_id.is_none() {
                    debug!(%call_sid, "HostRelay::inbound: no engagement recorded for call");
                }
                self.commands.dispatch(HostCommand::CallCompleted {
                    external_call_id: call_sid,
                    engagement_id,
                });
                self.set_state(WindowState::available())
            }
        }
    }

    /// Send an event to the agent desktop frame
    ///
    /// Dropped with a warning when no frame is attached yet; the next host
    /// state event re-triggers naturally.
    pub fn outbound(&self, event: HostEvent) -> bool {
        match &self.frame {
            Some(frame) => {
                if !frame.post(&event) {
                    warn!(event = event.tag(), "Agent desktop frame is gone, event dropped");
                    return false;
                }
                true
            }
            None => {
                warn!(event = event.tag(), "Agent desktop frame not loaded yet, event dropped");
                false
            }
        }
    }

    fn set_state(&mut self, state: WindowState) -> Option<WindowState> {
        if self.state.as_ref() == Some(&state) {
            return None;
        }
        self.state = Some(state.clone());
        Some(state)
    }
}
