//! Integration tests for ctibridge
//!
//! These tests run whole contexts over a shared in-process hub with the tokio
//! clock paused, so heartbeat timing is exact and instant.

use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::Instant;

use ctibridge::PeerId;
use ctibridge::channel::ChannelHub;
use ctibridge::config::Config;
use ctibridge::controller::{ContextStatus, Controller};
use ctibridge::heartbeat::{LinkStatus, ProtocolConfig, spawn_primary};
use ctibridge::relay::{
    HostCommand, HostNotification, HostRelay, MessagePort, PluginRelay, PluginStatus, TaskEvent, WindowMessage,
};
use ctibridge::schemas::WindowStatus;

const FLEX_ORIGIN: &str = "https://flex.twilio.com";
const HOST_ORIGIN: &str = "https://app.hubspot.com";
const SID: &str = "CA0123456789abcdef0123456789abcdef";

type Sink = mpsc::UnboundedSender<HostCommand>;

fn ready(location: &str) -> Value {
    json!({"iframeLocation": location, "portalId": 10, "userId": 20})
}

fn context(hub: &ChannelHub, location: &str) -> (Controller<Sink>, mpsc::UnboundedReceiver<HostCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut ctl = Controller::new(Config::default(), hub.clone(), tx);
    ctl.on_ready(&ready(location));
    assert_eq!(ctl.status(), &ContextStatus::Ready);
    (ctl, rx)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =============================================================================
// Heartbeat Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_secondary_is_kept_while_pinging_and_evicted_after_silence() {
    let start = Instant::now();
    let hub = ChannelHub::default();
    let (mut primary, _p_cmds) = context(&hub, "window");
    let (mut secondary, _s_cmds) = context(&hub, "remote");

    settle().await;
    let metrics = primary.handle().unwrap().metrics().await.unwrap();
    assert_eq!(metrics.peers, 1, "READY should register the secondary");
    assert_eq!(metrics.stalest_peer_age, Some(Duration::from_millis(10)));

    // Pings at 5s, 10s and 15s each refresh the record
    for tick in 1..=3u32 {
        tokio::time::sleep_until(start + Duration::from_secs(5) * tick + Duration::from_millis(500)).await;
        let metrics = primary.handle().unwrap().metrics().await.unwrap();
        assert_eq!(metrics.peers, 1);
        assert_eq!(metrics.pongs_sent, 1 + tick as u64);
        assert_eq!(metrics.stalest_peer_age, Some(Duration::from_millis(500)), "tick {}", tick);
    }
    let metrics = primary.handle().unwrap().metrics().await.unwrap();
    assert_eq!(metrics.evictions, 0);
    assert_eq!(secondary.handle().unwrap().link_status(), LinkStatus::Connected);

    // Secondary goes silent; the first sweep that finds it older than 10s drops it
    secondary.teardown().await;
    tokio::time::sleep(Duration::from_secs(16)).await;
    let metrics = primary.handle().unwrap().metrics().await.unwrap();
    assert_eq!(metrics.peers, 0);
    assert_eq!(metrics.evictions, 1);

    primary.teardown().await;
    assert_eq!(hub.channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_secondary_reports_unreachable_primary_and_recovers() {
    let hub = ChannelHub::default();
    let (mut primary, _p_cmds) = context(&hub, "window");
    let (mut secondary, _s_cmds) = context(&hub, "remote");

    settle().await;
    let link = secondary.handle().unwrap().subscribe_link();
    assert_eq!(*link.borrow(), LinkStatus::Connected);

    primary.teardown().await;

    // Last PONG at 0s; ticks at 5s and 10s are within the threshold
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(*link.borrow(), LinkStatus::Connected);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*link.borrow(), LinkStatus::PrimaryUnreachable);

    // A new primary answers the next PING
    let (mut replacement, _r_cmds) = context(&hub, "window");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*link.borrow(), LinkStatus::Connected);
    assert_eq!(replacement.handle().unwrap().metrics().await.unwrap().peers, 1);

    secondary.teardown().await;
    replacement.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_many_secondaries_each_get_their_own_pong() {
    let hub = ChannelHub::default();
    let (mut primary, _p_cmds) = context(&hub, "window");
    let mut secondaries: Vec<_> = (0..5).map(|_| context(&hub, "remote").0).collect();

    tokio::time::sleep(Duration::from_millis(5_500)).await;

    for secondary in &secondaries {
        let metrics = secondary.handle().unwrap().metrics().await.unwrap();
        assert_eq!(metrics.pongs_received, 2, "one PONG for READY and one for the PING");
        assert_eq!(metrics.anomalies, 0);
    }
    assert_eq!(primary.handle().unwrap().metrics().await.unwrap().peers, 5);

    for secondary in &mut secondaries {
        secondary.teardown().await;
    }
    primary.teardown().await;
    assert_eq!(hub.channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_timing_from_config() {
    let hub = ChannelHub::default();
    let mut config = Config::default();
    config.heartbeat.interval_ms = 100;
    config.heartbeat.stale_threshold_ms = 300;
    config.heartbeat.sweep_interval_ms = 50;

    let (tx, _rx) = mpsc::unbounded_channel();
    let mut secondary: Controller<Sink> = Controller::new(config, hub.clone(), tx);
    secondary.on_ready(&ready("remote"));

    // No primary at all: 4 ticks (400ms) exceed the 300ms threshold
    tokio::time::sleep(Duration::from_millis(450)).await;
    let handle = secondary.handle().unwrap();
    assert_eq!(handle.link_status(), LinkStatus::PrimaryUnreachable);
    assert_eq!(handle.metrics().await.unwrap().pings_sent, 4);
    secondary.teardown().await;
}

// =============================================================================
// Relay Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_call_flows_from_plugin_to_host_and_secondaries() {
    let hub = ChannelHub::default();
    let (mut primary, mut commands) = context(&hub, "window");
    let (mut secondary, _s_cmds) = context(&hub, "remote");
    assert!(matches!(commands.recv().await, Some(HostCommand::Initialized { .. })));

    let (to_plugin, mut plugin_inbox) = MessagePort::pair(HOST_ORIGIN);
    let (to_host, mut host_inbox) = MessagePort::pair(FLEX_ORIGIN);
    let handle = primary.handle().unwrap();
    handle.attach_frame(to_plugin);

    // Handshake
    let mut plugin = PluginRelay::new(HOST_ORIGIN, to_host);
    handle.deliver(host_inbox.recv().await.unwrap());
    plugin.inbound(plugin_inbox.recv().await.unwrap());
    assert_eq!(plugin.status(), PluginStatus::Ready);

    // Call accepted in the agent desktop
    plugin.on_task(TaskEvent::TaskAccepted {
        call_sid: SID.to_string(),
        from_number: "+15550001111".to_string(),
        to_number: "+15550002222".to_string(),
        started_at: chrono::Utc::now(),
    });
    handle.deliver(host_inbox.recv().await.unwrap());
    match commands.recv().await.unwrap() {
        HostCommand::IncomingCall { external_call_id, .. } => assert_eq!(external_call_id, SID),
        other => panic!("Expected IncomingCall, got {:?}", other),
    }

    settle().await;
    let snapshot = secondary.handle().unwrap().window_snapshot().unwrap();
    assert_eq!(snapshot.info.status, WindowStatus::OnCall);
    assert_eq!(snapshot.info.call_sid.as_deref(), Some(SID));

    // Host created an engagement, then the call ends
    handle.host_event(HostNotification::CreateEngagementSucceeded(json!({
        "externalCallId": SID,
        "engagementId": "777"
    })));
    plugin.on_task(TaskEvent::TaskCompleted {
        call_sid: SID.to_string(),
        reason: "completed".to_string(),
    });
    handle.deliver(host_inbox.recv().await.unwrap());
    assert_eq!(
        commands.recv().await.unwrap(),
        HostCommand::CallCompleted {
            external_call_id: SID.to_string(),
            engagement_id: Some(777)
        }
    );

    settle().await;
    let snapshot = secondary.handle().unwrap().window_snapshot().unwrap();
    assert_eq!(snapshot.info.status, WindowStatus::Available);

    secondary.teardown().await;
    primary.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_call_sid_never_reports_incoming_call() {
    let hub = ChannelHub::default();
    let (mut primary, mut commands) = context(&hub, "window");
    let _ = commands.recv().await;

    primary.handle().unwrap().deliver(WindowMessage::new(
        FLEX_ORIGIN,
        json!({
            "event": "IncomingCall",
            "callDetails": {
                "callSid": "not-a-real-sid",
                "callStartTime": 1_714_550_400_000_i64,
                "fromNumber": "+1",
                "toNumber": "+2"
            }
        }),
    ));

    settle().await;
    assert!(commands.try_recv().is_err());
    primary.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_foreign_origin_changes_nothing() {
    let hub = ChannelHub::default();
    let (mut primary, mut commands) = context(&hub, "window");
    let (mut secondary, _s_cmds) = context(&hub, "remote");
    let _ = commands.recv().await;

    let handle = primary.handle().unwrap();
    for data in [
        json!({"event": "UserLoggedIn"}),
        json!({"event": "CallEnded", "callSid": SID, "endedReason": "x"}),
        json!({"garbage": true}),
    ] {
        handle.deliver(WindowMessage::new("https://flex.twilio.com.evil.example", data));
    }

    settle().await;
    assert!(commands.try_recv().is_err());
    assert!(secondary.handle().unwrap().window_snapshot().is_none());

    secondary.teardown().await;
    primary.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_primary_driven_directly_with_custom_relay() {
    let hub = ChannelHub::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = ProtocolConfig::from(&Config::default());
    let handle = spawn_primary(PeerId::generate(), &hub, config, HostRelay::new(FLEX_ORIGIN, tx));

    handle.host_event(HostNotification::CallerIdMatchSucceeded(json!({
        "callId": "9",
        "callerIdMatches": [{
            "callerIdType": "CONTACT",
            "objectCoordinates": {"objectId": "31", "objectTypeId": "0-1", "portalId": "10"}
        }]
    })));

    match rx.recv().await.unwrap() {
        HostCommand::NavigateToRecord { object_coordinates } => {
            assert_eq!(object_coordinates.object_id, 31);
            assert_eq!(object_coordinates.portal_id, 10);
        }
        other => panic!("Expected NavigateToRecord, got {:?}", other),
    }
    handle.teardown().await;
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_load_from_explicit_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("ctibridge.yml");
    std::fs::write(
        &path,
        r#"
bridge:
  flex-origin: https://flex.example.com/
heartbeat:
  interval-ms: 250
channel:
  prefix: staging-bus
"#,
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.heartbeat.interval_ms, 250);
    assert_eq!(config.channel.prefix, "staging-bus");
    assert_eq!(config.bridge.flex_origin().unwrap(), "https://flex.example.com");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_load_reports_bad_yaml() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("broken.yml");
    std::fs::write(&path, "heartbeat: [not, a, map").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load config"));
}

#[test]
fn test_config_load_missing_explicit_path_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("absent.yml");
    assert!(Config::load(Some(&path)).is_err());
}
