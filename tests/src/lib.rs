//! # Recycling Kiosk Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── support.rs      # Scripted collaborators and gateway fixtures
//! │   ├── http_flows.rs   # REST endpoints through the full middleware stack
//! │   └── push_flows.rs   # Registry behaviour and live WebSocket sessions
//! └── benches/
//!     └── registry_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p kiosk-tests
//! cargo test -p kiosk-tests integration::push_flows
//! cargo bench -p kiosk-tests
//! ```

pub mod integration;
