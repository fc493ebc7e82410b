//! Same-origin named broadcast channels
//!
//! A [`ChannelHub`] plays the role of the browser origin: every context that
//! opens a channel with the same name on the same hub joins the same bus.
//! Messages are raw JSON; receivers validate them before use. Like the
//! browser primitive, a channel never delivers a message back to the
//! instance that posted it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::peer::PeerId;

/// Default per-channel buffer (messages)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Name of the shared discovery channel
pub fn shared_channel_name(prefix: &str) -> String {
    prefix.to_string()
}

/// Name of the point-to-point channel for one secondary
pub fn dedicated_channel_name(prefix: &str, peer: &PeerId) -> String {
    format!("{}:{}", prefix, peer)
}

/// Name of the channel carrying window state updates
pub fn state_channel_name(prefix: &str) -> String {
    format!("{}:state", prefix)
}

#[derive(Debug, Clone)]
struct Envelope {
    sender: u64,
    data: Value,
}

#[derive(Debug)]
struct HubInner {
    channels: HashMap<String, broadcast::Sender<Envelope>>,
    next_instance: u64,
    capacity: usize,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Registry of named channels shared by every context of one origin
#[derive(Debug, Clone)]
pub struct ChannelHub {
    inner: Arc<Mutex<HubInner>>,
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "ChannelHub::new: called");
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                channels: HashMap::new(),
                next_instance: 0,
                capacity: capacity.max(1),
            })),
        }
    }

    /// Open (join) the channel with the given name
    pub fn open(&self, name: impl Into<String>) -> BroadcastChannel {
        let name = name.into();
        let mut inner = lock(&self.inner);
        inner.channels.retain(|_, tx| tx.receiver_count() > 0);
        let capacity = inner.capacity;
        let tx = inner
            .channels
            .entry(name.clone())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .clone();
        inner.next_instance += 1;
        let instance = inner.next_instance;
        let rx = tx.subscribe();
        drop(inner);

        debug!(%name, instance, "ChannelHub::open: joined channel");
        BroadcastChannel {
            name,
            instance,
            tx,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Number of open instances listening on a channel
    pub fn listener_count(&self, name: &str) -> usize {
        lock(&self.inner)
            .channels
            .get(name)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of channels with at least one open instance
    pub fn channel_count(&self) -> usize {
        lock(&self.inner).channels.len()
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// One open instance of a named channel
///
/// Dropping the instance closes it; [`BroadcastChannel::close`] does the same
/// explicitly and logs it.
#[derive(Debug)]
pub struct BroadcastChannel {
    name: String,
    instance: u64,
    tx: broadcast::Sender<Envelope>,
    rx: broadcast::Receiver<Envelope>,
    hub: Weak<Mutex<HubInner>>,
}

impl BroadcastChannel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a message to every other instance of this channel
    ///
    /// Fire-and-forget: serialization failures are logged and the message
    /// is dropped.
    pub fn post<T: Serialize + ?Sized>(&self, message: &T) {
        match serde_json::to_value(message) {
            Ok(data) => self.post_raw(data),
            Err(e) => warn!(channel = %self.name, error = %e, "BroadcastChannel::post: failed to serialize message"),
        }
    }

    /// Post an already-encoded message
    pub fn post_raw(&self, data: Value) {
        let envelope = Envelope {
            sender: self.instance,
            data,
        };
        // Our own receiver always exists, so this only fails after close
        let _ = self.tx.send(envelope);
    }

    /// Receive the next message posted by another instance
    ///
    /// Returns `None` only if the channel is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.sender == self.instance => continue,
                Ok(envelope) => return Some(envelope.data),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.name, skipped, "BroadcastChannel::recv: lagged, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Close this instance
    pub fn close(self) {
        debug!(channel = %self.name, instance = self.instance, "BroadcastChannel::close: called");
    }
}

impl Drop for BroadcastChannel {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let mut inner = lock(&hub);
        // Our receiver is still alive here, so one listener means it was the last
        if inner
            .channels
            .get(&self.name)
            .is_some_and(|tx| tx.receiver_count() <= 1)
        {
            inner.channels.remove(&self.name);
        }
    }
}
