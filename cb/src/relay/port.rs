//! Window message transport

use eyre::{Result, eyre};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

/// A delivered window message and the origin its sender declared
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub origin: String,
    pub data: Value,
}

impl WindowMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Reduce a URL to its serialized origin (`scheme://host[:port]`)
///
/// Only absolute http(s) URLs are accepted.
pub fn normalize_origin(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim()).map_err(|e| eyre!("`{}` is not a valid URL: {}", raw, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(eyre!("`{}` must use http or https", raw));
    }
    if url.host_str().is_none() {
        return Err(eyre!("`{}` has no host", raw));
    }
    Ok(url.origin().ascii_serialization())
}

/// Sending half of a window: posts messages stamped with its own origin
#[derive(Debug, Clone)]
pub struct MessagePort {
    origin: String,
    tx: mpsc::UnboundedSender<WindowMessage>,
}

impl MessagePort {
    pub fn new(origin: impl Into<String>, tx: mpsc::UnboundedSender<WindowMessage>) -> Self {
        Self {
            origin: origin.into(),
            tx,
        }
    }

    /// Create a port and the inbox of the window it posts into
    pub fn pair(origin: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<WindowMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(origin, tx), rx)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Post a message; returns false if it could not be delivered
    pub fn post<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let data = match serde_json::to_value(message) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "MessagePort::post: failed to serialize message");
                return false;
            }
        };
        debug!(origin = %self.origin, "MessagePort::post: called");
        self.tx.send(WindowMessage::new(self.origin.clone(), data)).is_ok()
    }
}
