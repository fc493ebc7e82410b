//! ctibridge - CTI widget peer discovery and call event relay
//!
//! CLI entry point for validating messages and simulating a set of contexts.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use ctibridge::channel::ChannelHub;
use ctibridge::cli::{Cli, Command, MessageKind, generate_after_help};
use ctibridge::config::Config;
use ctibridge::controller::{ContextStatus, Controller};
use ctibridge::heartbeat::LinkStatus;
use ctibridge::relay::{HostCommand, HostNotification, MessagePort, PluginRelay, TaskEvent};

type Sink = mpsc::UnboundedSender<HostCommand>;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ctibridge")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("ctibridge.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Validate { kind, file }) => cmd_validate(kind, file.as_ref()),
        Some(Command::Simulate {
            remotes,
            seconds,
            drop_after,
        }) => cmd_simulate(&config, remotes, seconds, drop_after).await,
        Some(Command::Config) => cmd_config(&config),
        None => {
            Cli::command().after_help(generate_after_help()).print_help()?;
            Ok(())
        }
    }
}

fn cmd_validate(kind: MessageKind, file: Option<&PathBuf>) -> Result<()> {
    debug!(%kind, ?file, "cmd_validate: called");
    let text = match file {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };

    let raw: Value = serde_json::from_str(&text).context("Message is not valid JSON")?;
    let typed = kind
        .validate(&raw)
        .map_err(|e| eyre::Report::new(e).wrap_err(format!("Invalid {} message", kind)))?;

    println!("{} {} message", "valid".green().bold(), kind);
    println!("{}", serde_json::to_string_pretty(&typed)?);
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    config.validate()?;
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize configuration")?);
    Ok(())
}

fn link_label(status: Option<LinkStatus>) -> ColoredString {
    match status {
        Some(LinkStatus::Connected) => "connected".green(),
        Some(LinkStatus::Connecting) => "connecting".yellow(),
        Some(LinkStatus::PrimaryUnreachable) => "unreachable".red(),
        None => "stopped".dimmed(),
    }
}

fn ready_payload(location: &str) -> Value {
    json!({
        "iframeLocation": location,
        "portalId": 1,
        "userId": 1,
        "engagementId": null
    })
}

async fn cmd_simulate(config: &Config, remotes: usize, seconds: u64, drop_after: Option<u64>) -> Result<()> {
    debug!(remotes, seconds, ?drop_after, "cmd_simulate: called");
    config.validate()?;

    let hub = ChannelHub::new(config.channel.capacity);
    let (commands, mut command_rx) = mpsc::unbounded_channel::<HostCommand>();

    let mut primary: Controller<Sink> = Controller::new(config.clone(), hub.clone(), commands.clone());
    primary.on_ready(&ready_payload("window"));
    if let ContextStatus::Error(reason) = primary.status() {
        return Err(eyre::eyre!("Primary failed to start: {}", reason));
    }
    println!(
        "{} primary {} embedding {}",
        "start".cyan(),
        primary.peer_id().short(),
        primary.agent_desktop_url().unwrap_or("-")
    );

    let mut secondaries: Vec<Controller<Sink>> = (0..remotes)
        .map(|_| Controller::new(config.clone(), hub.clone(), commands.clone()))
        .collect();
    for secondary in &mut secondaries {
        secondary.on_ready(&ready_payload("remote"));
        println!("{} secondary {}", "start".cyan(), secondary.peer_id().short());
    }

    // Wire the agent desktop frame to the primary
    let host_origin = config.bridge.host_origin()?;
    let flex_origin = config.bridge.flex_origin()?;
    let (to_plugin, mut plugin_inbox) = MessagePort::pair(host_origin.clone());
    let (to_host, mut host_inbox) = MessagePort::pair(flex_origin);
    if let Some(handle) = primary.handle() {
        handle.attach_frame(to_plugin);
    }
    let mut plugin = PluginRelay::new(host_origin, to_host);

    let call_sid = format!("CA{}", uuid::Uuid::now_v7().simple());
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    let mut elapsed = 0u64;

    while elapsed < seconds {
        tokio::select! {
            Some(message) = host_inbox.recv() => {
                if let Some(handle) = primary.handle() {
                    handle.deliver(message);
                }
            }
            Some(message) = plugin_inbox.recv() => plugin.inbound(message),
            Some(command) = command_rx.recv() => {
                println!("{} {}", "host".magenta(), serde_json::to_string(&command)?);
            }
            _ = ticker.tick() => {
                elapsed += 1;
                match elapsed {
                    1 => {
                        plugin.on_task(TaskEvent::LoggedIn);
                    }
                    2 => {
                        plugin.on_task(TaskEvent::TaskAccepted {
                            call_sid: call_sid.clone(),
                            from_number: "+15550100".to_string(),
                            to_number: "+15550199".to_string(),
                            started_at: chrono::Utc::now(),
                        });
                    }
                    3 => {
                        if let Some(handle) = primary.handle() {
                            handle.host_event(HostNotification::CreateEngagementSucceeded(json!({
                                "externalCallId": call_sid,
                                "engagementId": 1001
                            })));
                        }
                    }
                    4 => {
                        plugin.on_task(TaskEvent::TaskCompleted {
                            call_sid: call_sid.clone(),
                            reason: "completed".to_string(),
                        });
                    }
                    _ => {}
                }

                if drop_after == Some(elapsed) {
                    for secondary in &mut secondaries {
                        secondary.teardown().await;
                    }
                    println!("{} all secondaries", "drop".yellow());
                }

                let peers = match primary.handle() {
                    Some(handle) => handle.metrics().await.map(|m| m.peers).unwrap_or(0),
                    None => 0,
                };
                let links: Vec<String> = secondaries
                    .iter()
                    .map(|s| {
                        let status = s.handle().map(|h| h.link_status());
                        format!("{}={}", s.peer_id().short(), link_label(status))
                    })
                    .collect();
                println!("[{:>3}s] peers={} {}", elapsed, peers, links.join(" "));
            }
        }
    }

    for secondary in &mut secondaries {
        secondary.teardown().await;
    }
    primary.teardown().await;
    println!("{} plugin {:?}", "done".green().bold(), plugin.status());
    Ok(())
}
