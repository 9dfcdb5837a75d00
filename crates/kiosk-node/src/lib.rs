//! # Kiosk Node Library
//!
//! Exposes the adapter container for testing. The main entry point is the
//! `main.rs` binary.

#![warn(clippy::all)]

pub mod container;

pub use container::KioskContainer;
