//! WebSocket module for real-time balance pushes.
//!
//! - `registry`: RFID rooms and fan-out
//! - `session`: per-connection lifecycle
//! - `handler`: socket loop, frame protocol, limits

pub mod handler;
pub mod registry;
pub mod session;

pub use handler::{handle_frame, ClientFrame, WebSocketHandler};
pub use registry::{
    BroadcastReport, ConnectionHandle, ConnectionRegistry, PushEvent, Registration, RegistryStats,
    BALANCE_UPDATE_EVENT,
};
pub use session::{Announcement, ConnectionPhase, PushSession};
