//! Origin-gated relay between the host widget and the embedded agent desktop
//!
//! Both sides talk over window messages. A message is only considered if its
//! declared origin matches the configured counterpart origin; anything else is
//! ignored at trace level. Accepted messages are validated before dispatch.
//!
//! - [`HostRelay`] runs in the primary host context, turns agent desktop events
//!   into host commands and tracks the window state
//! - [`PluginRelay`] runs inside the agent desktop and announces itself to the host

mod commands;
mod host;
mod plugin;
mod port;

pub use commands::{CommandSink, HostCommand, HostNotification};
pub use host::HostRelay;
pub use plugin::{PluginRelay, PluginStatus, TaskEvent};
pub use port::{MessagePort, WindowMessage, normalize_origin};
