//! Role and lifecycle controller for one widget context
//!
//! Decides primary vs secondary from the host's readiness signal, performs
//! the role-specific host commands and starts the matching heartbeat actor.

use eyre::{Context, Result, eyre};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channel::ChannelHub;
use crate::config::Config;
use crate::heartbeat::{ContextHandle, Phase, ProtocolConfig, spawn_primary, spawn_secondary};
use crate::peer::{PeerId, Role};
use crate::relay::{CommandSink, HostCommand, HostRelay};
use crate::schemas::{OnReadyEvent, Schema};

/// Externally visible status of a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextStatus {
    Pending,
    Ready,
    Error(String),
}

pub struct Controller<C: CommandSink + Clone + 'static> {
    config: Config,
    hub: ChannelHub,
    commands: C,
    peer_id: PeerId,
    phase: Phase,
    status: ContextStatus,
    agent_desktop_url: Option<String>,
    handle: Option<ContextHandle>,
}

impl<C: CommandSink + Clone + 'static> Controller<C> {
    pub fn new(config: Config, hub: ChannelHub, commands: C) -> Self {
        let peer_id = PeerId::generate();
        debug!(peer = %peer_id, "Controller::new: called");
        Self {
            config,
            hub,
            commands,
            peer_id,
            phase: Phase::Unstarted,
            status: ContextStatus::Pending,
            agent_desktop_url: None,
            handle: None,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn status(&self) -> &ContextStatus {
        &self.status
    }

    pub fn phase(&self) -> Phase {
        match &self.handle {
            Some(handle) => handle.phase(),
            None => self.phase,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self.phase {
            Phase::RoleAssigned(role) | Phase::Active(role) => Some(role),
            Phase::Unstarted | Phase::TornDown => None,
        }
    }

    /// URL of the agent desktop frame (primary only)
    pub fn agent_desktop_url(&self) -> Option<&str> {
        self.agent_desktop_url.as_deref()
    }

    pub fn handle(&self) -> Option<&ContextHandle> {
        self.handle.as_ref()
    }

    /// Handle the host's readiness signal
    ///
    /// Must run inside a tokio runtime. Failures never panic: they land in
    /// [`Controller::status`] and are terminal, so the context stays out of
    /// the protocol for good.
    pub fn on_ready(&mut self, raw: &Value) {
        if self.phase != Phase::Unstarted {
            warn!(phase = ?self.phase, "Readiness signal received twice, ignoring");
            return;
        }
        if let ContextStatus::Error(reason) = &self.status {
            warn!(error = %reason, "Readiness signal after a failed start, ignoring");
            return;
        }

        match self.start(raw) {
            Ok(()) => self.status = ContextStatus::Ready,
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(error = %reason, "Context failed to start");
                self.status = ContextStatus::Error(reason);
            }
        }
    }

    fn start(&mut self, raw: &Value) -> Result<()> {
        self.config.validate()?;

        let ready = OnReadyEvent::validate(raw).map_err(|e| {
            warn!(error = %e, "Invalid readiness payload");
            eyre!("error parsing onReady payload")
        })?;

        let role = Role::from_location(&ready.iframe_location)
            .ok_or_else(|| eyre!("unsupported iframe location: {}", ready.iframe_location))?;
        self.phase = Phase::RoleAssigned(role);
        info!(
            peer = %self.peer_id.short(),
            %role,
            portal_id = ready.portal_id,
            user_id = ready.user_id,
            "Role assigned"
        );

        let protocol = ProtocolConfig::from(&self.config);
        let handle = match role {
            Role::Primary => {
                self.commands.dispatch(HostCommand::Initialized {
                    engagement_id: ready.engagement_id,
                    is_logged_in: false,
                });
                let flex_origin = self.config.bridge.flex_origin()?;
                let url = self
                    .config
                    .bridge
                    .agent_desktop_url()
                    .context("Failed to build agent desktop URL")?;
                info!(%url, "Embedding agent desktop");
                self.agent_desktop_url = Some(url);

                let relay = HostRelay::new(flex_origin, self.commands.clone());
                spawn_primary(self.peer_id, &self.hub, protocol, relay)
            }
            Role::Secondary => {
                self.commands.dispatch(HostCommand::ResizeWidget {
                    width: self.config.widget.remote_width,
                    height: self.config.widget.remote_height,
                });
                spawn_secondary(self.peer_id, &self.hub, protocol)
            }
        };

        self.phase = handle.phase();
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the heartbeat actor and close its channels
    ///
    /// No-op for a context that never started.
    pub async fn teardown(&mut self) {
        debug!(peer = %self.peer_id.short(), "Controller::teardown: called");
        if let Some(handle) = self.handle.take() {
            handle.teardown().await;
        }
        if self.phase != Phase::Unstarted {
            self.phase = Phase::TornDown;
        }
    }
}
