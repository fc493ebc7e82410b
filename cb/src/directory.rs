//! Peer Directory - the primary's registry of live secondaries
//!
//! Owned by the primary context's actor and mutated only from its handlers
//! (insert, touch) and its sweep timer (evict). Each record owns the
//! dedicated channel used to answer that peer; the directory is the only
//! place that closes it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{BroadcastChannel, ChannelHub, dedicated_channel_name};
use crate::peer::PeerId;

/// One known secondary context
#[derive(Debug)]
pub struct PeerRecord {
    pub id: PeerId,
    pub last_seen: Instant,
    channel: BroadcastChannel,
}

impl PeerRecord {
    /// Point-to-point channel for replies to this peer
    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    /// Time since this peer was last heard from
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Registry of secondaries keyed by peer id
#[derive(Debug)]
pub struct PeerDirectory {
    hub: ChannelHub,
    prefix: String,
    peers: HashMap<PeerId, PeerRecord>,
}

impl PeerDirectory {
    pub fn new(hub: ChannelHub, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        debug!(%prefix, "PeerDirectory::new: called");
        Self {
            hub,
            prefix,
            peers: HashMap::new(),
        }
    }

    /// Return the record for `id`, creating it (and its channel) if unseen
    ///
    /// The boolean is true when the record was created by this call. An
    /// existing record is returned unchanged.
    pub fn get_or_create(&mut self, id: PeerId, now: Instant) -> (&PeerRecord, bool) {
        let mut created = false;
        let record = self.peers.entry(id).or_insert_with(|| {
            created = true;
            let channel = self.hub.open(dedicated_channel_name(&self.prefix, &id));
            info!(peer = %id.short(), "Registered peer");
            PeerRecord {
                id,
                last_seen: now,
                channel,
            }
        });
        (record, created)
    }

    /// Refresh last-seen for a known peer
    ///
    /// Returns false (and warns) for unknown peers.
    pub fn touch(&mut self, id: &PeerId, now: Instant) -> bool {
        match self.peers.get_mut(id) {
            Some(record) => {
                record.last_seen = now;
                debug!(peer = %id.short(), "PeerDirectory::touch: refreshed");
                true
            }
            None => {
                warn!(peer = %id.short(), "PeerDirectory::touch: unknown peer");
                false
            }
        }
    }

    /// Remove every peer silent for longer than `threshold`
    ///
    /// Each removed record's channel is closed before it is discarded.
    pub fn evict_stale(&mut self, threshold: Duration, now: Instant) -> Vec<PeerId> {
        let stale: Vec<PeerId> = self
            .peers
            .values()
            .filter(|record| record.age(now) > threshold)
            .map(|record| record.id)
            .collect();

        for id in &stale {
            if let Some(record) = self.peers.remove(id) {
                info!(
                    peer = %id.short(),
                    age_ms = record.age(now).as_millis() as u64,
                    "Evicting stale peer"
                );
                record.channel.close();
            }
        }

        if !stale.is_empty() {
            debug!(evicted = stale.len(), remaining = self.peers.len(), "PeerDirectory::evict_stale: swept");
        }
        stale
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Age of the least recently heard-from peer
    pub fn stalest_age(&self, now: Instant) -> Option<Duration> {
        self.peers.values().map(|record| record.age(now)).max()
    }

    /// Close every dedicated channel and forget all peers
    pub fn clear(&mut self) {
        debug!(peers = self.peers.len(), "PeerDirectory::clear: called");
        for (_, record) in self.peers.drain() {
            record.channel.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "test-bus";

    fn directory() -> (ChannelHub, PeerDirectory) {
        let hub = ChannelHub::default();
        let directory = PeerDirectory::new(hub.clone(), PREFIX);
        (hub, directory)
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (hub, mut dir) = directory();
        let id = PeerId::generate();
        let start = Instant::now();

        let (_, created) = dir.get_or_create(id, start);
        assert!(created);

        let (record, created) = dir.get_or_create(id, start + Duration::from_secs(3));
        assert!(!created);
        // Existing record is returned unchanged
        assert_eq!(record.last_seen, start);

        assert_eq!(dir.len(), 1);
        assert_eq!(hub.listener_count(&dedicated_channel_name(PREFIX, &id)), 1);
    }

    #[test]
    fn test_repeated_registration_never_duplicates() {
        let (hub, mut dir) = directory();
        let ids: Vec<PeerId> = (0..3).map(|_| PeerId::generate()).collect();
        let now = Instant::now();

        for round in 0..5 {
            for id in &ids {
                dir.get_or_create(*id, now);
                dir.touch(id, now + Duration::from_millis(round));
            }
        }

        assert_eq!(dir.len(), 3);
        for id in &ids {
            assert_eq!(hub.listener_count(&dedicated_channel_name(PREFIX, id)), 1);
        }
    }

    #[test]
    fn test_touch_updates_last_seen() {
        let (_hub, mut dir) = directory();
        let id = PeerId::generate();
        let start = Instant::now();
        dir.get_or_create(id, start);

        let later = start + Duration::from_secs(4);
        assert!(dir.touch(&id, later));
        assert_eq!(dir.get(&id).unwrap().last_seen, later);
    }

    #[test]
    fn test_stalest_age_tracks_least_recent_peer() {
        let (_hub, mut dir) = directory();
        let start = Instant::now();
        assert_eq!(dir.stalest_age(start), None);

        let (a, b) = (PeerId::generate(), PeerId::generate());
        dir.get_or_create(a, start);
        dir.get_or_create(b, start + Duration::from_secs(2));
        assert_eq!(dir.stalest_age(start + Duration::from_secs(3)), Some(Duration::from_secs(3)));

        dir.touch(&a, start + Duration::from_secs(3));
        assert_eq!(dir.stalest_age(start + Duration::from_secs(4)), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_touch_unknown_peer_is_noop() {
        let (_hub, mut dir) = directory();
        assert!(!dir.touch(&PeerId::generate(), Instant::now()));
        assert!(dir.is_empty());
    }

    #[test]
    fn test_evict_stale_removes_and_closes_once() {
        let (hub, mut dir) = directory();
        let id = PeerId::generate();
        let name = dedicated_channel_name(PREFIX, &id);
        let threshold = Duration::from_secs(10);
        let pinged_at = Instant::now();
        dir.get_or_create(id, pinged_at);

        // Exactly at the threshold the peer survives
        assert!(dir.evict_stale(threshold, pinged_at + threshold).is_empty());
        assert_eq!(hub.listener_count(&name), 1);

        let evicted = dir.evict_stale(threshold, pinged_at + threshold + Duration::from_millis(1));
        assert_eq!(evicted, vec![id]);
        assert_eq!(hub.listener_count(&name), 0);
        assert!(dir.is_empty());

        // A second sweep has nothing left to close
        assert!(dir.evict_stale(threshold, pinged_at + threshold * 2).is_empty());
    }

    #[test]
    fn test_evict_keeps_fresh_peers() {
        let (_hub, mut dir) = directory();
        let fresh = PeerId::generate();
        let stale = PeerId::generate();
        let start = Instant::now();
        dir.get_or_create(fresh, start);
        dir.get_or_create(stale, start);

        dir.touch(&fresh, start + Duration::from_secs(8));
        let evicted = dir.evict_stale(Duration::from_secs(10), start + Duration::from_secs(11));

        assert_eq!(evicted, vec![stale]);
        assert!(dir.contains(&fresh));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_reregistration_after_eviction_opens_new_channel() {
        let (hub, mut dir) = directory();
        let id = PeerId::generate();
        let start = Instant::now();
        dir.get_or_create(id, start);
        dir.evict_stale(Duration::from_secs(1), start + Duration::from_secs(2));

        let (_, created) = dir.get_or_create(id, start + Duration::from_secs(3));
        assert!(created);
        assert_eq!(hub.listener_count(&dedicated_channel_name(PREFIX, &id)), 1);
    }

    #[test]
    fn test_clear_closes_everything() {
        let (hub, mut dir) = directory();
        let now = Instant::now();
        for _ in 0..4 {
            dir.get_or_create(PeerId::generate(), now);
        }
        assert_eq!(hub.channel_count(), 4);

        dir.clear();
        assert!(dir.is_empty());
        assert_eq!(hub.channel_count(), 0);
    }
}
