//! Connection registry ("hub").
//!
//! Maps each user to the set of live connections currently open for them
//! (one per device). Delivery is best-effort: a payload is queued on every
//! connection with `try_send`, and a connection whose queue is full or whose
//! socket task has gone away is evicted instead of blocking the caller.
//!
//! Locking is per user bucket (`DashMap` shard), so `register`, `unregister`
//! and `send_to_user` are each atomic with respect to one another, while a
//! fan-out across several users is not.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use courier_shared::protocol::Payload;
use courier_shared::types::{ConnectionId, UserId};

/// Best-effort push to every live connection of one user.
///
/// The message router only depends on this seam, so the hub it pushes
/// through is chosen at construction.
pub trait Deliver: Send + Sync {
    fn send_to_user(&self, user_id: UserId, payload: &Payload);
}

/// Outbound half of one open socket.
#[derive(Debug, Clone)]
pub struct LiveConnection {
    id: ConnectionId,
    outbound: mpsc::Sender<Payload>,
}

impl LiveConnection {
    /// Create a connection handle with a bounded outbound queue. The
    /// receiver is drained by the socket's writer task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                outbound: tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

#[derive(Default)]
pub struct Hub {
    connections: DashMap<UserId, Vec<LiveConnection>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the user's set, creating the set if absent.
    pub fn register(&self, user_id: UserId, connection: LiveConnection) {
        let connection_id = connection.id;
        let count = {
            let mut entry = self.connections.entry(user_id).or_default();
            entry.push(connection);
            entry.len()
        };

        info!(
            user = %user_id,
            connection = %connection_id,
            connections = count,
            "Registered live connection"
        );
    }

    /// Remove a connection. Unknown users or connections are a no-op.
    pub fn unregister(&self, user_id: UserId, connection_id: ConnectionId) {
        let removed = match self.connections.get_mut(&user_id) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|c| c.id != connection_id);
                before != entry.len()
            }
            None => false,
        };
        self.connections.remove_if(&user_id, |_, conns| conns.is_empty());

        if removed {
            info!(user = %user_id, connection = %connection_id, "Unregistered live connection");
        }
    }

    /// Queue `payload` on every connection of `user_id`.
    ///
    /// Returns how many connections accepted it. A user with no connections
    /// is not an error; neither is a failed write, which only evicts the
    /// connection.
    pub fn send_to_user(&self, user_id: UserId, payload: &Payload) -> usize {
        let Some(mut entry) = self.connections.get_mut(&user_id) else {
            debug!(user = %user_id, "Recipient offline, skipping live push");
            return 0;
        };

        let mut delivered = 0;
        entry.retain(|conn| match conn.outbound.try_send(payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    user = %user_id,
                    connection = %conn.id,
                    "Outbound buffer full, dropping slow connection"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(
                    user = %user_id,
                    connection = %conn.id,
                    "Connection closed, removing from hub"
                );
                false
            }
        });
        drop(entry);

        self.connections.remove_if(&user_id, |_, conns| conns.is_empty());
        delivered
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.connections
            .get(&user_id)
            .map(|conns| conns.len())
            .unwrap_or(0)
    }

    /// Users holding at least one live connection.
    pub fn online_users(&self) -> Vec<UserId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }
}

impl Deliver for Hub {
    fn send_to_user(&self, user_id: UserId, payload: &Payload) {
        Hub::send_to_user(self, user_id, payload);
    }
}
