//! Connection registry: RFID rooms for the balance push channel.
//!
//! Maps each subscriber identity to the set of live connections that
//! announced it. An identity is only present while it has at least one
//! connection; the last one leaving removes the entry in the same critical
//! section.
//!
//! Delivery never touches the socket. Each connection owns a bounded queue
//! drained by its own task, so `broadcast` only does `try_send` on a snapshot
//! of the room taken after the map guard is released.

use crate::domain::{BalanceUpdate, ConnectionId, Rfid};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Event name of balance pushes
pub const BALANCE_UPDATE_EVENT: &str = "balanceUpdate";

/// One server-to-client event, serialised as `{"event": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl PushEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Text frame body
    pub fn to_frame(&self) -> String {
        serde_json::json!({ "event": self.event, "data": self.data }).to_string()
    }
}

/// Sending side of one connection's outbound queue
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<PushEvent>>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh id and a queue of `capacity` events
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<PushEvent>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True once the receiving task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn deliver(&self, event: Arc<PushEvent>) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

enum Delivery {
    Queued,
    Full,
    Closed,
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Events queued for delivery
    pub delivered: usize,
    /// Events dropped because a connection's queue was full
    pub dropped: usize,
    /// Handles whose connection had already gone away
    pub closed: usize,
}

impl BroadcastReport {
    /// Number of handles the event was addressed to
    pub fn targeted(&self) -> usize {
        self.delivered + self.dropped + self.closed
    }
}

/// Registry snapshot for the admin endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub identities: usize,
    pub connections: usize,
    pub events_delivered: u64,
    pub events_dropped: u64,
}

/// Identity -> live connections
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: DashMap<Rfid, HashMap<ConnectionId, ConnectionHandle>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle` to the room of `identity`.
    ///
    /// Returns `false` if the handle was already a member (nothing changes).
    pub fn register(&self, identity: &Rfid, handle: ConnectionHandle) -> bool {
        let connection_id = handle.id();
        let mut room = self.rooms.entry(identity.clone()).or_default();
        if room.contains_key(&connection_id) {
            return false;
        }
        room.insert(connection_id, handle);
        let members = room.len();
        drop(room);

        debug!(
            rfid = %identity,
            connection_id = %connection_id,
            members,
            "Registered connection"
        );
        true
    }

    /// Remove the connection from the room of `identity`.
    ///
    /// The identity is dropped when its room becomes empty. Returns `false`
    /// if the connection was not a member.
    pub fn unregister(&self, identity: &str, connection_id: &ConnectionId) -> bool {
        let mut removed = false;
        self.rooms.remove_if_mut(identity, |_, room| {
            removed = room.remove(connection_id).is_some();
            room.is_empty()
        });

        if removed {
            debug!(
                rfid = %identity,
                connection_id = %connection_id,
                "Unregistered connection"
            );
        }
        removed
    }

    /// Deliver `event` with `payload` to every connection in the room of
    /// `identity`.
    ///
    /// A missing room is a no-op. One connection's full or closed queue never
    /// affects the others.
    pub fn broadcast(
        &self,
        identity: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> BroadcastReport {
        let targets: Vec<ConnectionHandle> = match self.rooms.get(identity) {
            Some(room) => room.values().cloned().collect(),
            None => return BroadcastReport::default(),
        };

        let event = Arc::new(PushEvent::new(event, payload));
        let mut report = BroadcastReport::default();

        for handle in targets {
            match handle.deliver(event.clone()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Full => {
                    warn!(
                        rfid = %identity,
                        connection_id = %handle.id(),
                        event = %event.event,
                        "Outbound queue full, dropping event"
                    );
                    report.dropped += 1;
                }
                Delivery::Closed => {
                    debug!(
                        rfid = %identity,
                        connection_id = %handle.id(),
                        "Connection already closed, skipping"
                    );
                    report.closed += 1;
                }
            }
        }

        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        debug!(
            rfid = %identity,
            event = %event.event,
            delivered = report.delivered,
            dropped = report.dropped,
            closed = report.closed,
            "Broadcast complete"
        );
        report
    }

    /// Push a `balanceUpdate` to the room of `update.rfid`
    pub fn broadcast_balance(&self, update: &BalanceUpdate) -> BroadcastReport {
        match serde_json::to_value(update) {
            Ok(payload) => self.broadcast(update.rfid.as_str(), BALANCE_UPDATE_EVENT, payload),
            Err(e) => {
                warn!(rfid = %update.rfid, error = %e, "Failed to encode balance update");
                BroadcastReport::default()
            }
        }
    }

    /// Register and get a guard that unregisters when dropped
    pub fn join(self: &Arc<Self>, identity: Rfid, handle: ConnectionHandle) -> Registration {
        let connection_id = handle.id();
        self.register(&identity, handle);
        Registration {
            registry: Arc::clone(self),
            identity,
            connection_id,
        }
    }

    pub fn is_registered(&self, identity: &str, connection_id: &ConnectionId) -> bool {
        self.rooms
            .get(identity)
            .map(|room| room.contains_key(connection_id))
            .unwrap_or(false)
    }

    /// Connection ids in the room of `identity`, sorted
    pub fn members(&self, identity: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .rooms
            .get(identity)
            .map(|room| room.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.rooms.contains_key(identity)
    }

    /// Number of identities with at least one connection
    pub fn identity_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of registered connections across all identities
    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|room| room.len()).sum()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            identities: self.identity_count(),
            connections: self.connection_count(),
            events_delivered: self.delivered.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Room membership tied to a scope; dropping it unregisters
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    identity: Rfid,
    connection_id: ConnectionId,
}

impl Registration {
    pub fn identity(&self) -> &Rfid {
        &self.identity
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .unregister(self.identity.as_str(), &self.connection_id);
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("identity", &self.identity)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}
