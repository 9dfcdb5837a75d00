//! Kiosk Gateway - REST API and real-time balance push for the recycling kiosk.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       KIOSK GATEWAY                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────┐   ┌─────────────┐          │
//! │  │   REST + push (/ws upgrade)  │   │    Admin    │          │
//! │  │          Port 4000           │   │  Port 4001  │          │
//! │  └──────────────┬───────────────┘   └──────┬──────┘          │
//! │                 │                          │                 │
//! │  ┌──────────────┴───────────────┐          │                 │
//! │  │       Middleware Stack       │          │                 │
//! │  │ CORS → Tracing → Metrics →   │          │                 │
//! │  │          Timeout             │          │                 │
//! │  └──────────────┬───────────────┘          │                 │
//! │                 │                          │                 │
//! │  ┌──────────────┴───────────────┐   ┌──────┴──────────────┐  │
//! │  │         KioskService         │──▶│ ConnectionRegistry  │  │
//! │  │  users · balance · history   │   │  RFID → live sockets │  │
//! │  └──────┬─────────┬─────────┬───┘   └─────────────────────┘  │
//! └─────────┼─────────┼─────────┼────────────────────────────────┘
//!           ▼         ▼         ▼
//!       UserStore  Classifier  VoucherNotifier
//! ```
//!
//! A kiosk client opens the push channel and announces the RFID it is
//! serving. Every successful `POST /update_user_balance` for that RFID is
//! then pushed as a `balanceUpdate` event to each connection in the room.
//!
//! # Usage
//!
//! ```ignore
//! use kiosk_gateway::{GatewayConfig, GatewayService};
//!
//! let config = GatewayConfig::from_env();
//! let service = GatewayService::new(config, store, classifier, notifier)?;
//! service.run().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod rest;
pub mod service;
pub mod ws;

// Re-exports for public API
pub use domain::config::GatewayConfig;
pub use domain::error::{ApiError, ApiResult, GatewayError};
pub use domain::types::*;
pub use middleware::GatewayMetrics;
pub use ports::{BottleClassifier, UserStore, VoucherNotifier};
pub use service::{AppState, GatewayService, KioskService, ShutdownHandle};
pub use ws::{ConnectionRegistry, PushEvent};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
