//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use crate::schemas::{
    BroadcastEvent, CallerIdMatch, EngagementCreated, FlexEvent, HostEvent, OnReadyEvent, Schema, StateEvent,
    ValidationError,
};

/// ctibridge - CTI widget peer discovery and call event relay
#[derive(Parser)]
#[command(
    name = "cb",
    about = "Peer discovery, heartbeat and call event relay for an embedded CTI widget",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate one JSON message against a message family
    Validate {
        /// Message family (protocol, state, flex, host, ready, caller-id, engagement)
        #[arg(short, long, default_value = "protocol")]
        kind: MessageKind,

        /// File holding the message (stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Run a primary and several secondaries over one in-process hub
    Simulate {
        /// Number of secondary contexts
        #[arg(short, long, default_value = "2")]
        remotes: usize,

        /// How long to run, in seconds
        #[arg(short, long, default_value = "12")]
        seconds: u64,

        /// Tear the secondaries down after this many seconds
        #[arg(short, long)]
        drop_after: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}

/// Message families known to `cb validate`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Protocol,
    State,
    Flex,
    Host,
    Ready,
    CallerId,
    Engagement,
}

impl MessageKind {
    /// Validate `raw` and return its normalized typed form
    pub fn validate(&self, raw: &Value) -> Result<Value, ValidationError> {
        debug!(kind = %self, "MessageKind::validate: called");
        match self {
            Self::Protocol => normalized::<BroadcastEvent>(raw),
            Self::State => normalized::<StateEvent>(raw),
            Self::Flex => normalized::<FlexEvent>(raw),
            Self::Host => normalized::<HostEvent>(raw),
            Self::Ready => normalized::<OnReadyEvent>(raw),
            Self::CallerId => normalized::<CallerIdMatch>(raw),
            Self::Engagement => normalized::<EngagementCreated>(raw),
        }
    }
}

fn normalized<T: Schema + Serialize>(raw: &Value) -> Result<Value, ValidationError> {
    let typed = T::validate(raw)?;
    serde_json::to_value(&typed).map_err(|e| ValidationError::Shape {
        family: T::FAMILY,
        reason: e.to_string(),
    })
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "MessageKind::from_str: called");
        match s.to_lowercase().as_str() {
            "protocol" => Ok(Self::Protocol),
            "state" => Ok(Self::State),
            "flex" => Ok(Self::Flex),
            "host" => Ok(Self::Host),
            "ready" => Ok(Self::Ready),
            "caller-id" | "callerid" => Ok(Self::CallerId),
            "engagement" => Ok(Self::Engagement),
            _ => Err(format!(
                "Unknown kind: {}. Use: protocol, state, flex, host, ready, caller-id, or engagement",
                s
            )),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Protocol => "protocol",
            Self::State => "state",
            Self::Flex => "flex",
            Self::Host => "host",
            Self::Ready => "ready",
            Self::CallerId => "caller-id",
            Self::Engagement => "engagement",
        };
        write!(f, "{}", name)
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ctibridge")
        .join("logs")
        .join("ctibridge.log")
}

/// Generate the after_help text
pub fn generate_after_help() -> String {
    format!("Logs are written to: {}\n", get_log_path().display())
}
