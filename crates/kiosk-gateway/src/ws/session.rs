//! Lifecycle of one push connection.
//!
//! ```text
//! ConnectedUnregistered --announce--> ConnectedRegistered
//!          ^                                |
//!          +------------leave---------------+
//!
//! any live phase --close--> Closed (terminal)
//! ```
//!
//! Re-announcing a different RFID moves the connection: it leaves the old
//! room before joining the new one, so it is never in two rooms at once.

use crate::domain::{ConnectionId, Rfid};
use crate::middleware::metrics::GatewayMetrics;
use crate::ws::registry::{ConnectionHandle, ConnectionRegistry, Registration};
use std::sync::Arc;
use tracing::{debug, info};

/// Phase of a push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    ConnectedUnregistered,
    ConnectedRegistered,
    Closed,
}

/// Result of an identity announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    /// Joined the room for the first time
    Joined,
    /// Already in this room; nothing changed
    Unchanged,
    /// Left `previous` and joined the announced room
    Moved { previous: Rfid },
    /// Session is closed; announcement ignored
    Rejected,
}

/// Registry membership of a single connection
pub struct PushSession {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<GatewayMetrics>,
    handle: ConnectionHandle,
    registration: Option<Registration>,
    closed: bool,
}

impl PushSession {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<GatewayMetrics>,
        handle: ConnectionHandle,
    ) -> Self {
        metrics.record_ws_connect();
        Self {
            registry,
            metrics,
            handle,
            registration: None,
            closed: false,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn phase(&self) -> ConnectionPhase {
        if self.closed {
            ConnectionPhase::Closed
        } else if self.registration.is_some() {
            ConnectionPhase::ConnectedRegistered
        } else {
            ConnectionPhase::ConnectedUnregistered
        }
    }

    /// RFID this connection is currently filed under
    pub fn identity(&self) -> Option<&Rfid> {
        self.registration.as_ref().map(Registration::identity)
    }

    /// File this connection under `rfid`; the latest announcement wins
    pub fn announce(&mut self, rfid: Rfid) -> Announcement {
        if self.closed {
            return Announcement::Rejected;
        }

        let previous = match self.registration.take() {
            Some(current) if current.identity() == &rfid => {
                self.registration = Some(current);
                return Announcement::Unchanged;
            }
            Some(current) => {
                let previous = current.identity().clone();
                drop(current);
                Some(previous)
            }
            None => {
                self.metrics.record_ws_register();
                None
            }
        };

        self.registration = Some(self.registry.join(rfid.clone(), self.handle.clone()));

        match previous {
            Some(previous) => {
                info!(
                    connection_id = %self.handle.id(),
                    from = %previous,
                    to = %rfid,
                    "Connection moved to new RFID"
                );
                Announcement::Moved { previous }
            }
            None => {
                info!(connection_id = %self.handle.id(), rfid = %rfid, "Connection registered");
                Announcement::Joined
            }
        }
    }

    /// Leave the current room but keep the connection open
    pub fn leave(&mut self) -> bool {
        match self.registration.take() {
            Some(registration) => {
                debug!(
                    connection_id = %self.handle.id(),
                    rfid = %registration.identity(),
                    "Connection left room"
                );
                self.metrics.record_ws_unregister();
                true
            }
            None => false,
        }
    }

    /// Terminal transition; removes any registry membership
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.leave();
        self.closed = true;
        self.metrics.record_ws_disconnect();
    }
}

impl Drop for PushSession {
    fn drop(&mut self) {
        self.close();
    }
}
