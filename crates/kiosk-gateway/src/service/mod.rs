//! Service layer: kiosk operations and gateway assembly.

pub mod gateway;
pub mod kiosk;

pub use gateway::{AppState, GatewayService, ShutdownHandle};
pub use kiosk::{BalanceChange, KioskService};
