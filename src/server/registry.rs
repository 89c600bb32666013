use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::store::MetricsStore;
use crate::web::models::websocket_models::{SnapshotPayload, WsMessage};

pub type ConnectionId = Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("send timed out")]
    Timeout,
}

/// Handle through which the fan-out path pushes messages to one client.
/// The WebSocket task drains the queue, so per-connection delivery order
/// is the queue order.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<WsMessage>,
    send_timeout: Duration,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Best-effort push into the connection's outbound queue. A queue that
    /// does not accept the message within the send budget counts as a dead
    /// client and the caller removes it from the registry.
    pub async fn send(&self, message: WsMessage) -> Result<(), SendError> {
        match tokio::time::timeout(self.send_timeout, self.sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => Err(SendError::Timeout),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
    global: HashSet<ConnectionId>,
}

/// Tracks which connection is subscribed to which site room, plus the
/// opt-in global all-sites feed. All mutation happens under one lock; the
/// lock is never held across a send, so a stalled client cannot block
/// join/leave for everyone else.
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
    store: Arc<dyn MetricsStore>,
    send_timeout: Duration,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn MetricsStore>, send_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            store,
            send_timeout,
        }
    }

    /// Registers a new connection and returns its handle. The caller keeps
    /// the receiving half of `sender` and pumps it into the socket.
    pub fn register(&self, sender: mpsc::Sender<WsMessage>) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: Uuid::new_v4(),
            sender,
            send_timeout: self.send_timeout,
        };
        let mut inner = self.lock();
        inner.connections.insert(handle.id, handle.clone());
        debug!(connection_id = %handle.id, "Registered connection.");
        handle
    }

    /// Adds the connection to the site's room. A connection new to the room
    /// is synchronously sent the latest stored snapshot so late joiners are
    /// not starved until the next tick; re-joining is a no-op.
    pub async fn join(&self, connection_id: ConnectionId, site_id: &str) {
        let (handle, newly_joined) = {
            let mut inner = self.lock();
            let Some(handle) = inner.connections.get(&connection_id).cloned() else {
                warn!(connection_id = %connection_id, site_id, "Join from unknown connection.");
                return;
            };
            let newly_joined = inner
                .rooms
                .entry(site_id.to_string())
                .or_default()
                .insert(connection_id);
            (handle, newly_joined)
        };

        if !newly_joined {
            debug!(connection_id = %connection_id, site_id, "Connection already in room.");
            return;
        }

        // Hydrate outside the lock. A store error degrades to an empty
        // metrics map rather than a dropped connection.
        let latest = match self.store.latest_metrics(site_id).await {
            Ok(latest) => latest,
            Err(e) => {
                error!(site_id, error = %e, "Failed to load latest metrics for hydration.");
                HashMap::new()
            }
        };
        let message = WsMessage::SiteData(SnapshotPayload::from_latest(site_id, latest));
        if let Err(e) = handle.send(message).await {
            warn!(connection_id = %connection_id, site_id, error = %e,
                "Initial snapshot delivery failed; dropping connection.");
            self.remove_connection(connection_id);
        }
    }

    /// Removes the connection from the site's room. Idempotent.
    pub fn leave(&self, connection_id: ConnectionId, site_id: &str) {
        let mut inner = self.lock();
        if let Some(room) = inner.rooms.get_mut(site_id) {
            room.remove(&connection_id);
            if room.is_empty() {
                inner.rooms.remove(site_id);
            }
        }
    }

    /// Opts the connection into the all-sites feed.
    pub fn subscribe_global(&self, connection_id: ConnectionId) {
        let mut inner = self.lock();
        if inner.connections.contains_key(&connection_id) {
            inner.global.insert(connection_id);
        }
    }

    /// Drops the connection entirely: all rooms, the global feed, and the
    /// handle. Called on disconnect and on delivery failure. Idempotent.
    pub fn remove_connection(&self, connection_id: ConnectionId) {
        let mut inner = self.lock();
        inner.connections.remove(&connection_id);
        inner.global.remove(&connection_id);
        inner.rooms.retain(|_, room| {
            room.remove(&connection_id);
            !room.is_empty()
        });
    }

    /// Consistent point-in-time view of a room's membership.
    pub fn members(&self, site_id: &str) -> Vec<ConnectionId> {
        let inner = self.lock();
        inner
            .rooms
            .get(site_id)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Handles for everyone a site broadcast must reach: room members plus
    /// global listeners, deduplicated. Cloned snapshot, so the lock is not
    /// held during the sends.
    pub fn recipients_for(&self, site_id: &str) -> Vec<ConnectionHandle> {
        let inner = self.lock();
        let mut ids: HashSet<ConnectionId> = inner.global.iter().copied().collect();
        if let Some(room) = inner.rooms.get(site_id) {
            ids.extend(room.iter().copied());
        }
        ids.into_iter()
            .filter_map(|id| inner.connections.get(&id).cloned())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
