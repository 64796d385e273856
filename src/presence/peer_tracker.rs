use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use super::clock::Clock;
use crate::configuration::types::PresenceSettings;
use crate::network::types::{BusMessage, PeerId};

/// Tracks which instances are alive, judged by heartbeat recency.
///
/// There is no registry to ask, so a peer counts as online while its last
/// heartbeat is at most `liveness_window` old. The local instance is
/// registered at construction and is never evicted.
///
/// The tracker does not schedule anything itself: the owner calls
/// [`tick`](Self::tick) once per heartbeat period and publishes
/// [`heartbeat`](Self::heartbeat) on the bus. The live count is pushed to a
/// `watch` channel whenever the tracked set changes.
pub struct PeerPresenceTracker {
    self_id: PeerId,
    peers: HashMap<PeerId, DateTime<Utc>>,
    liveness_window: Duration,
    clock: Arc<dyn Clock>,
    online_tx: watch::Sender<usize>,
    torn_down: bool,
}

impl PeerPresenceTracker {
    pub fn new(self_id: PeerId, settings: &PresenceSettings, clock: Arc<dyn Clock>) -> Self {
        let mut peers = HashMap::new();
        peers.insert(self_id.clone(), clock.now());
        let (online_tx, _) = watch::channel(1);
        info!("[{}] presence registered", self_id);

        Self {
            self_id,
            peers,
            liveness_window: settings.liveness_window(),
            clock,
            online_tx,
            torn_down: false,
        }
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// The announcement to publish for this instance, until teardown.
    pub fn heartbeat(&self) -> Option<BusMessage> {
        (!self.torn_down).then(|| BusMessage::heartbeat(&self.self_id))
    }

    /// Records a heartbeat from `id`. Returns true when `id` was not tracked yet.
    pub fn on_heartbeat(&mut self, id: &PeerId) -> bool {
        if self.torn_down {
            return false;
        }
        let now = self.clock.now();
        let joined = self.peers.insert(id.clone(), now).is_none();
        if joined {
            info!("[{}] peer {} is online", self.self_id, id);
            self.publish_count();
        }
        joined
    }

    /// Refreshes self and evicts peers silent for longer than the liveness
    /// window. Returns how many peers were evicted.
    pub fn tick(&mut self) -> usize {
        if self.torn_down {
            return 0;
        }
        let now = self.clock.now();
        self.peers.insert(self.self_id.clone(), now);

        let window = self.liveness_window;
        let self_id = &self.self_id;
        let before = self.peers.len();
        self.peers.retain(|id, last_seen| {
            let alive = id == self_id || now - *last_seen <= window;
            if !alive {
                info!("[{}] peer {} went silent, evicting", self_id, id);
            }
            alive
        });
        let evicted = before - self.peers.len();

        if evicted > 0 {
            self.publish_count();
        }
        debug!("[{}] presence tick: {} online", self.self_id, self.peers.len());
        evicted
    }

    /// Number of tracked instances, self included.
    pub fn live_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_tracked(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Watch channel carrying the live count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.online_tx.subscribe()
    }

    /// Stops tracking. Later heartbeats and ticks are ignored.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("[{}] presence torn down", self.self_id);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn publish_count(&self) {
        let count = self.peers.len();
        self.online_tx.send_if_modified(|current| {
            if *current == count {
                false
            } else {
                *current = count;
                true
            }
        });
    }
}
