//! ctibridge - peer discovery and call event relay for an embedded CTI widget
//!
//! A CRM may render the calling widget in several browsing contexts at once:
//! one full window that embeds the agent desktop (the primary) and any number
//! of compact remotes (secondaries). The contexts find each other over
//! same-origin broadcast channels, keep each other alive with a READY/PING/PONG
//! heartbeat, and the primary relays call events between the agent desktop
//! and the CRM host.
//!
//! # Modules
//!
//! - [`schemas`] - typed, validated message families
//! - [`channel`] - named broadcast channels shared by one origin
//! - [`relay`] - origin-gated relay between host and agent desktop frames
//! - [`directory`] - the primary's registry of live secondaries
//! - [`heartbeat`] - primary and secondary protocol actors
//! - [`controller`] - role assignment and lifecycle
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod channel;
pub mod cli;
pub mod config;
pub mod controller;
pub mod directory;
pub mod heartbeat;
pub mod peer;
pub mod relay;
pub mod schemas;

// Re-export commonly used types
pub use channel::{BroadcastChannel, ChannelHub};
pub use config::Config;
pub use controller::{ContextStatus, Controller};
pub use directory::{PeerDirectory, PeerRecord};
pub use heartbeat::{ContextHandle, ContextMetrics, LinkStatus, Phase, ProtocolConfig, WindowSnapshot};
pub use peer::{PeerId, Role};
pub use relay::{
    CommandSink, HostCommand, HostNotification, HostRelay, MessagePort, PluginRelay, PluginStatus, TaskEvent,
    WindowMessage,
};
pub use schemas::{Schema, ValidationError};
