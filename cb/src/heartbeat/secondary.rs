//! Secondary context actor: announces itself, pings the primary and mirrors
//! its window state

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace, warn};

use super::{ContextMetrics, ContextRequest, LinkStatus, Phase, ProtocolConfig, WindowSnapshot};
use crate::channel::{BroadcastChannel, ChannelHub, dedicated_channel_name, shared_channel_name, state_channel_name};
use crate::config::HeartbeatConfig;
use crate::peer::{PeerId, Role};
use crate::schemas::{BroadcastEvent, ProtocolKind, Schema, StateEvent};

pub(super) struct SecondaryContext {
    id: PeerId,
    timing: HeartbeatConfig,
    shared: BroadcastChannel,
    dedicated: BroadcastChannel,
    state: BroadcastChannel,
    started: Instant,
    last_pong: Option<Instant>,
    link: watch::Sender<LinkStatus>,
    snapshot: watch::Sender<Option<WindowSnapshot>>,
    metrics: ContextMetrics,
}

impl SecondaryContext {
    /// Subscribe to the reply channels, then announce READY
    pub(super) fn open(
        id: PeerId,
        hub: &ChannelHub,
        config: ProtocolConfig,
        link: watch::Sender<LinkStatus>,
        snapshot: watch::Sender<Option<WindowSnapshot>>,
    ) -> Self {
        debug!(peer = %id.short(), prefix = %config.prefix, "SecondaryContext::open: called");
        let dedicated = hub.open(dedicated_channel_name(&config.prefix, &id));
        let state = hub.open(state_channel_name(&config.prefix));
        let shared = hub.open(shared_channel_name(&config.prefix));

        shared.post(&BroadcastEvent::ready(Role::Secondary, id));
        info!(peer = %id.short(), "Announced READY");

        Self {
            id,
            timing: config.timing,
            shared,
            dedicated,
            state,
            started: Instant::now(),
            last_pong: None,
            link,
            snapshot,
            metrics: ContextMetrics::default(),
        }
    }

    pub(super) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ContextRequest>, phase: watch::Sender<Phase>) {
        let period = self.timing.interval();
        let mut ticker = interval_at(self.started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(peer = %self.id.short(), "Secondary context started");

        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(ContextRequest::Shutdown) | None => break,
                    Some(request) => self.handle_request(request),
                },
                Some(raw) = self.dedicated.recv() => self.on_dedicated(raw),
                Some(raw) = self.shared.recv() => self.on_shared(raw),
                Some(raw) = self.state.recv() => self.on_state(raw),
                _ = ticker.tick() => self.tick(),
            }
        }

        self.dedicated.close();
        self.state.close();
        self.shared.close();
        phase.send_replace(Phase::TornDown);
        info!(peer = %self.id.short(), "Secondary context stopped");
    }

    fn handle_request(&mut self, request: ContextRequest) {
        match request {
            ContextRequest::GetMetrics { reply_tx } => {
                let _ = reply_tx.send(self.metrics.clone());
            }
            ContextRequest::Window(_) | ContextRequest::AttachFrame(_) | ContextRequest::Host(_) => {
                debug!("SecondaryContext::handle_request: relay requests go to the primary, ignoring");
            }
            ContextRequest::Shutdown => {}
        }
    }

    fn on_dedicated(&mut self, raw: Value) {
        self.metrics.messages_received += 1;
        let event = match BroadcastEvent::validate(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping invalid message on dedicated channel");
                self.metrics.validation_failures += 1;
                return;
            }
        };

        if event.kind != ProtocolKind::Pong || event.source_location != Role::Primary {
            warn!(
                event = event.tag(),
                role = %event.source_location,
                "Unexpected message on dedicated channel, ignoring"
            );
            self.metrics.anomalies += 1;
            return;
        }

        self.metrics.pongs_received += 1;
        self.last_pong = Some(Instant::now());
        let previous = self.link.send_replace(LinkStatus::Connected);
        match previous {
            LinkStatus::Connecting => info!(primary = %event.source_id.short(), "Connected to primary"),
            LinkStatus::PrimaryUnreachable => info!(primary = %event.source_id.short(), "Primary reachable again"),
            LinkStatus::Connected => trace!("SecondaryContext::on_dedicated: PONG"),
        }
    }

    fn on_shared(&mut self, raw: Value) {
        self.metrics.messages_received += 1;
        match BroadcastEvent::validate(&raw) {
            Ok(event) if event.kind == ProtocolKind::Pong => {
                warn!(from = %event.source_id.short(), "PONG on the shared channel, ignoring");
                self.metrics.anomalies += 1;
            }
            // Other secondaries' heartbeats
            Ok(event) => trace!(event = event.tag(), from = %event.source_id.short(), "SecondaryContext::on_shared"),
            Err(e) => {
                warn!(error = %e, "Dropping invalid message on shared channel");
                self.metrics.validation_failures += 1;
            }
        }
    }

    fn on_state(&mut self, raw: Value) {
        self.metrics.messages_received += 1;
        match StateEvent::validate(&raw) {
            Ok(StateEvent::WindowStatusUpdate { info }) => {
                debug!(status = ?info.status, "SecondaryContext::on_state: window state mirrored");
                self.snapshot.send_replace(Some(WindowSnapshot {
                    received_at: Utc::now(),
                    info,
                }));
            }
            Err(e) => {
                warn!(error = %e, "Dropping invalid window state update");
                self.metrics.validation_failures += 1;
            }
        }
    }

    fn tick(&mut self) {
        self.shared.post(&BroadcastEvent::ping(Role::Secondary, self.id));
        self.metrics.pings_sent += 1;

        let now = Instant::now();
        let silent_for = now.saturating_duration_since(self.last_pong.unwrap_or(self.started));
        if silent_for > self.timing.stale_threshold() && *self.link.borrow() != LinkStatus::PrimaryUnreachable {
            warn!(
                silent_ms = silent_for.as_millis() as u64,
                "No PONG from primary, marking it unreachable"
            );
            self.link.send_replace(LinkStatus::PrimaryUnreachable);
        }
    }
}
