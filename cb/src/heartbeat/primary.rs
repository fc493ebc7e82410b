//! Primary context actor: answers heartbeats, sweeps stale peers and hosts
//! the agent desktop relay

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::{ContextMetrics, ContextRequest, Phase, ProtocolConfig};
use crate::channel::{BroadcastChannel, ChannelHub, shared_channel_name, state_channel_name};
use crate::config::HeartbeatConfig;
use crate::directory::PeerDirectory;
use crate::peer::{PeerId, Role};
use crate::relay::{CommandSink, HostCommand, HostNotification, HostRelay};
use crate::schemas::{BroadcastEvent, CallerIdMatch, EngagementCreated, ProtocolKind, Schema, StateEvent};

pub(super) struct PrimaryContext<C: CommandSink> {
    id: PeerId,
    timing: HeartbeatConfig,
    shared: BroadcastChannel,
    state: BroadcastChannel,
    directory: PeerDirectory,
    relay: HostRelay<C>,
    metrics: ContextMetrics,
}

impl<C: CommandSink + 'static> PrimaryContext<C> {
    pub(super) fn open(id: PeerId, hub: &ChannelHub, config: ProtocolConfig, relay: HostRelay<C>) -> Self {
        debug!(peer = %id.short(), prefix = %config.prefix, "PrimaryContext::open: called");
        Self {
            id,
            shared: hub.open(shared_channel_name(&config.prefix)),
            state: hub.open(state_channel_name(&config.prefix)),
            directory: PeerDirectory::new(hub.clone(), &config.prefix),
            timing: config.timing,
            relay,
            metrics: ContextMetrics::default(),
        }
    }

    pub(super) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ContextRequest>, phase: watch::Sender<Phase>) {
        let period = self.timing.sweep_interval();
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(peer = %self.id.short(), "Primary context started");

        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(ContextRequest::Shutdown) | None => break,
                    Some(request) => self.handle_request(request),
                },
                Some(raw) = self.shared.recv() => self.on_shared(raw),
                _ = sweep.tick() => self.sweep(),
            }
        }

        self.directory.clear();
        self.shared.close();
        self.state.close();
        phase.send_replace(Phase::TornDown);
        info!(peer = %self.id.short(), "Primary context stopped");
    }

    fn handle_request(&mut self, request: ContextRequest) {
        match request {
            ContextRequest::Window(message) => {
                if let Some(info) = self.relay.inbound(message) {
                    debug!(status = ?info.status, "PrimaryContext::handle_request: window state changed");
                    self.state.post(&StateEvent::WindowStatusUpdate { info });
                }
            }
            ContextRequest::AttachFrame(frame) => self.relay.attach(frame),
            ContextRequest::Host(notification) => self.on_host(notification),
            ContextRequest::GetMetrics { reply_tx } => {
                self.metrics.peers = self.directory.len();
                self.metrics.stalest_peer_age = self.directory.stalest_age(Instant::now());
                let _ = reply_tx.send(self.metrics.clone());
            }
            ContextRequest::Shutdown => {}
        }
    }

    fn on_shared(&mut self, raw: Value) {
        self.metrics.messages_received += 1;
        let event = match BroadcastEvent::validate(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping invalid message on shared channel");
                self.metrics.validation_failures += 1;
                return;
            }
        };
        debug!(event = event.tag(), from = %event.source_id.short(), "PrimaryContext::on_shared: called");

        match (event.kind, event.source_location) {
            (ProtocolKind::Ready | ProtocolKind::Ping, Role::Secondary) => self.answer(event),
            (ProtocolKind::Ready | ProtocolKind::Ping, Role::Primary) => {
                warn!(
                    event = event.tag(),
                    from = %event.source_id.short(),
                    "Another context claims the primary role, ignoring"
                );
                self.metrics.anomalies += 1;
            }
            (ProtocolKind::Pong, _) => {
                warn!(from = %event.source_id.short(), "PONG on the shared channel, ignoring");
                self.metrics.anomalies += 1;
            }
        }
    }

    /// Register or refresh the sender, then reply on its dedicated channel
    fn answer(&mut self, event: BroadcastEvent) {
        let now = Instant::now();
        let peer = event.source_id;
        if self.directory.contains(&peer) {
            self.directory.touch(&peer, now);
        } else {
            if event.kind == ProtocolKind::Ping {
                debug!(peer = %peer.short(), "PrimaryContext::answer: PING from unseen peer");
            }
            self.directory.get_or_create(peer, now);
        }

        let Some(record) = self.directory.get(&peer) else {
            return;
        };
        record.channel().post(&BroadcastEvent::pong(Role::Primary, self.id));
        self.metrics.pongs_sent += 1;

        // A newly announced peer has missed every earlier state update
        if event.kind == ProtocolKind::Ready
            && let Some(info) = self.relay.state()
        {
            self.state.post(&StateEvent::WindowStatusUpdate { info: info.clone() });
        }
    }

    fn sweep(&mut self) {
        let evicted = self.directory.evict_stale(self.timing.stale_threshold(), Instant::now());
        self.metrics.evictions += evicted.len() as u64;
    }

    fn on_host(&mut self, notification: HostNotification) {
        debug!(notification = notification.name(), "PrimaryContext::on_host: called");
        match notification {
            HostNotification::CallerIdMatchSucceeded(payload) => match CallerIdMatch::validate(&payload) {
                Ok(found) => match found.caller_id_matches.into_iter().next() {
                    Some(first) => {
                        info!(call_id = found.call_id, object_id = first.object_coordinates.object_id, "Caller identified");
                        self.relay.commands().dispatch(HostCommand::NavigateToRecord {
                            object_coordinates: first.object_coordinates,
                        });
                    }
                    None => warn!(call_id = found.call_id, "Caller-id lookup returned no matches"),
                },
                Err(e) => warn!(error = %e, "Dropping invalid caller-id result"),
            },
            HostNotification::CreateEngagementSucceeded(payload) => match EngagementCreated::validate(&payload) {
                Ok(created) => self.relay.record_engagement(created.external_call_id, created.engagement_id),
                Err(e) => warn!(error = %e, "Dropping invalid engagement confirmation"),
            },
            other => info!(notification = other.name(), payload = %other.payload(), "Host notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::dedicated_channel_name;
    use crate::heartbeat::{ContextHandle, spawn_primary};
    use crate::relay::{MessagePort, WindowMessage};
    use crate::schemas::WindowStatus;
    use serde_json::json;
    use std::time::Duration;

    const PREFIX: &str = "test-bus";
    const FLEX: &str = "https://flex.example.com";

    fn config() -> ProtocolConfig {
        ProtocolConfig {
            prefix: PREFIX.to_string(),
            timing: HeartbeatConfig::default(),
        }
    }

    fn primary(hub: &ChannelHub) -> (ContextHandle, mpsc::UnboundedReceiver<HostCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_primary(PeerId::generate(), hub, config(), HostRelay::new(FLEX, tx));
        (handle, rx)
    }

    /// A hand-driven secondary: shared channel plus its dedicated channel
    fn fake_secondary(hub: &ChannelHub) -> (PeerId, BroadcastChannel, BroadcastChannel) {
        let id = PeerId::generate();
        let dedicated = hub.open(dedicated_channel_name(PREFIX, &id));
        let shared = hub.open(shared_channel_name(PREFIX));
        (id, shared, dedicated)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_gets_pong_on_dedicated_channel() {
        let hub = ChannelHub::default();
        let (handle, _commands) = primary(&hub);
        let (id, shared, mut dedicated) = fake_secondary(&hub);

        shared.post(&BroadcastEvent::ready(Role::Secondary, id));

        let reply = BroadcastEvent::validate(&dedicated.recv().await.unwrap()).unwrap();
        assert_eq!(reply.kind, ProtocolKind::Pong);
        assert_eq!(reply.source_location, Role::Primary);
        assert_eq!(reply.source_id, handle.peer_id());

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.peers, 1);
        assert_eq!(metrics.pongs_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_from_unseen_peer_registers_it() {
        let hub = ChannelHub::default();
        let (handle, _commands) = primary(&hub);
        let (id, shared, mut dedicated) = fake_secondary(&hub);

        shared.post(&BroadcastEvent::ping(Role::Secondary, id));

        let reply = BroadcastEvent::validate(&dedicated.recv().await.unwrap()).unwrap();
        assert_eq!(reply.kind, ProtocolKind::Pong);
        assert_eq!(handle.metrics().await.unwrap().peers, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anomalies_and_garbage_are_counted() {
        let hub = ChannelHub::default();
        let (handle, _commands) = primary(&hub);
        let (id, shared, _dedicated) = fake_secondary(&hub);

        shared.post(&BroadcastEvent::ready(Role::Primary, id));
        shared.post(&BroadcastEvent::pong(Role::Secondary, id));
        shared.post_raw(json!({"event": "HELLO", "sourceLocation": "remote", "sourceId": id}));
        shared.post_raw(json!("just a string"));

        // Let the actor drain the shared channel before asking
        tokio::time::sleep(Duration::from_millis(10)).await;
        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.messages_received, 4);
        assert_eq!(metrics.anomalies, 2);
        assert_eq!(metrics.validation_failures, 2);
        assert_eq!(metrics.peers, 0);
        assert_eq!(metrics.pongs_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_is_evicted() {
        let hub = ChannelHub::default();
        let (handle, _commands) = primary(&hub);
        let (id, shared, mut dedicated) = fake_secondary(&hub);
        let name = dedicated_channel_name(PREFIX, &id);

        shared.post(&BroadcastEvent::ready(Role::Secondary, id));
        dedicated.recv().await.unwrap();
        assert_eq!(hub.listener_count(&name), 2);

        // Sweeps at 5s and 10s keep it, the 15s sweep finds it 15s old
        tokio::time::sleep(Duration::from_millis(15_100)).await;

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.peers, 0);
        assert_eq!(metrics.evictions, 1);
        assert_eq!(hub.listener_count(&name), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_peer_receives_current_window_state() {
        let hub = ChannelHub::default();
        let (handle, _commands) = primary(&hub);
        handle.deliver(WindowMessage::new(FLEX, json!({"event": "UserLoggedIn"})));

        let mut state = hub.open(state_channel_name(PREFIX));
        let (id, shared, mut dedicated) = fake_secondary(&hub);
        shared.post(&BroadcastEvent::ready(Role::Secondary, id));
        dedicated.recv().await.unwrap();

        let update = StateEvent::validate(&state.recv().await.unwrap()).unwrap();
        let StateEvent::WindowStatusUpdate { info } = update;
        assert_eq!(info.status, WindowStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_id_match_navigates_to_first_record() {
        let hub = ChannelHub::default();
        let (handle, mut commands) = primary(&hub);

        handle.host_event(HostNotification::CallerIdMatchSucceeded(json!({
            "callId": 42,
            "callerIdMatches": [
                {
                    "callerIdType": "CONTACT",
                    "firstName": "Ada",
                    "objectCoordinates": {"objectId": 101, "objectTypeId": "0-1", "portalId": 7}
                },
                {
                    "callerIdType": "COMPANY",
                    "objectCoordinates": {"objectId": 202, "objectTypeId": "0-2", "portalId": 7}
                }
            ]
        })));

        match commands.recv().await.unwrap() {
            HostCommand::NavigateToRecord { object_coordinates } => {
                assert_eq!(object_coordinates.object_id, 101);
            }
            other => panic!("Expected NavigateToRecord, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_caller_id_match_dispatches_nothing() {
        let hub = ChannelHub::default();
        let (handle, mut commands) = primary(&hub);

        handle.host_event(HostNotification::CallerIdMatchSucceeded(json!({"callId": 1, "callerIdMatches": []})));
        handle.metrics().await.unwrap();
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_frame_gets_plugin_ack() {
        let hub = ChannelHub::default();
        let (handle, _commands) = primary(&hub);
        let (frame, mut frame_inbox) = MessagePort::pair("https://host.example.com");

        handle.attach_frame(frame);
        handle.deliver(WindowMessage::new(FLEX, json!({"event": "PluginLoaded"})));

        let ack = frame_inbox.recv().await.unwrap();
        assert_eq!(ack.data, json!({"event": "PluginLoadedEventReceived"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_closes_all_channels() {
        let hub = ChannelHub::default();
        let (handle, _commands) = primary(&hub);
        let (id, shared, mut dedicated) = fake_secondary(&hub);
        shared.post(&BroadcastEvent::ready(Role::Secondary, id));
        dedicated.recv().await.unwrap();
        drop(shared);
        drop(dedicated);

        handle.teardown().await;
        assert_eq!(hub.channel_count(), 0);
    }
}
