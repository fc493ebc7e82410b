//! Heartbeat protocol for peer discovery and liveness
//!
//! Every context runs as one actor task that owns its channels, its timer and
//! (for the primary) the Peer Directory. Handlers for one context therefore
//! never run concurrently and need no locks.
//!
//! ```text
//!  secondary A ──READY/PING──┐                    ┌──PONG──> <prefix>:<A>
//!  secondary B ──READY/PING──┼──> <prefix> ──> primary ──PONG──> <prefix>:<B>
//!                            │                    └──WindowStatusUpdate──> <prefix>:state
//! ```
//!
//! - secondaries announce READY once and PING on every tick
//! - the primary answers on the peer's dedicated channel, never on the shared one
//! - the primary sweeps peers silent for longer than the stale threshold
//! - a secondary that hears no PONG for longer than the threshold reports the
//!   primary as unreachable (advisory only)

mod primary;
mod secondary;

use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::Result;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::ChannelHub;
use crate::config::{Config, HeartbeatConfig};
use crate::peer::{PeerId, Role};
use crate::relay::{CommandSink, HostNotification, HostRelay, MessagePort, WindowMessage};
use crate::schemas::WindowState;

use primary::PrimaryContext;
use secondary::SecondaryContext;

/// Lifecycle of one context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unstarted,
    RoleAssigned(Role),
    Active(Role),
    TornDown,
}

/// A secondary's view of the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// READY sent, no PONG yet
    Connecting,
    Connected,
    /// No PONG for longer than the stale threshold
    PrimaryUnreachable,
}

/// Latest window state mirrored from the primary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub received_at: DateTime<Utc>,
    pub info: WindowState,
}

/// Per-context counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextMetrics {
    pub peers: usize,
    pub messages_received: u64,
    pub validation_failures: u64,
    pub anomalies: u64,
    pub pings_sent: u64,
    pub pongs_sent: u64,
    pub pongs_received: u64,
    pub evictions: u64,
    /// Primary only: time since the least recent READY/PING
    pub stalest_peer_age: Option<Duration>,
}

/// Settings shared by both sides of the protocol
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub prefix: String,
    pub timing: HeartbeatConfig,
}

impl From<&Config> for ProtocolConfig {
    fn from(config: &Config) -> Self {
        Self {
            prefix: config.channel.prefix.clone(),
            timing: config.heartbeat.clone(),
        }
    }
}

/// Requests to a running context
#[derive(Debug)]
pub(crate) enum ContextRequest {
    Window(WindowMessage),
    AttachFrame(MessagePort),
    Host(HostNotification),
    GetMetrics { reply_tx: oneshot::Sender<ContextMetrics> },
    Shutdown,
}

/// Handle to a running context actor
///
/// Dropping the handle stops the actor as well; [`ContextHandle::teardown`]
/// additionally waits until every channel is closed.
#[derive(Debug)]
pub struct ContextHandle {
    role: Role,
    peer_id: PeerId,
    tx: mpsc::UnboundedSender<ContextRequest>,
    task: Option<JoinHandle<()>>,
    phase: watch::Receiver<Phase>,
    link: watch::Receiver<LinkStatus>,
    snapshot: watch::Receiver<Option<WindowSnapshot>>,
}

impl ContextHandle {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Secondary link status; always `Connected` for a primary
    pub fn link_status(&self) -> LinkStatus {
        *self.link.borrow()
    }

    pub fn subscribe_link(&self) -> watch::Receiver<LinkStatus> {
        self.link.clone()
    }

    /// Latest window state a secondary received from the primary
    pub fn window_snapshot(&self) -> Option<WindowSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Deliver a window message to the context
    pub fn deliver(&self, message: WindowMessage) -> bool {
        self.send(ContextRequest::Window(message))
    }

    /// Attach the embedded agent desktop frame (primary only)
    pub fn attach_frame(&self, frame: MessagePort) -> bool {
        self.send(ContextRequest::AttachFrame(frame))
    }

    /// Forward a host SDK notification
    pub fn host_event(&self, notification: HostNotification) -> bool {
        self.send(ContextRequest::Host(notification))
    }

    /// Current counters of the context
    pub async fn metrics(&self) -> Result<ContextMetrics> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if !self.send(ContextRequest::GetMetrics { reply_tx }) {
            return Err(eyre::eyre!("Context has stopped"));
        }
        reply_rx.await.map_err(|_| eyre::eyre!("Context has stopped"))
    }

    /// Stop the actor and wait until it has closed every channel
    pub async fn teardown(mut self) {
        debug!(role = %self.role, peer = %self.peer_id.short(), "ContextHandle::teardown: called");
        let _ = self.tx.send(ContextRequest::Shutdown);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Context task ended abnormally");
        }
    }

    fn send(&self, request: ContextRequest) -> bool {
        if self.tx.send(request).is_err() {
            debug!("ContextHandle::send: context has stopped");
            return false;
        }
        true
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        // Never leave an actor answering PINGs for a context that is gone
        if self.task.is_some() {
            let _ = self.tx.send(ContextRequest::Shutdown);
        }
    }
}

/// Start the primary side of the protocol
///
/// Channels are opened before this returns, so messages posted right after
/// are not missed.
pub fn spawn_primary<C>(id: PeerId, hub: &ChannelHub, config: ProtocolConfig, relay: HostRelay<C>) -> ContextHandle
where
    C: CommandSink + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (phase_tx, phase) = watch::channel(Phase::Active(Role::Primary));
    let (_link_tx, link) = watch::channel(LinkStatus::Connected);
    let (_snapshot_tx, snapshot) = watch::channel(None);

    let context = PrimaryContext::open(id, hub, config, relay);
    let task = tokio::spawn(context.run(rx, phase_tx));

    ContextHandle {
        role: Role::Primary,
        peer_id: id,
        tx,
        task: Some(task),
        phase,
        link,
        snapshot,
    }
}

/// Start the secondary side of the protocol
///
/// READY is announced before this returns.
pub fn spawn_secondary(id: PeerId, hub: &ChannelHub, config: ProtocolConfig) -> ContextHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (phase_tx, phase) = watch::channel(Phase::Active(Role::Secondary));
    let (link_tx, link) = watch::channel(LinkStatus::Connecting);
    let (snapshot_tx, snapshot) = watch::channel(None);

    let context = SecondaryContext::open(id, hub, config, link_tx, snapshot_tx);
    let task = tokio::spawn(context.run(rx, phase_tx));

    ContextHandle {
        role: Role::Secondary,
        peer_id: id,
        tx,
        task: Some(task),
        phase,
        link,
        snapshot,
    }
}
