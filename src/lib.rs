//! Nodeboot library.
//!
//! Exposes the boot core (power gate, OTA controller, boot sequencer,
//! jotter) and its adapters for integration testing.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module; host builds get simulations.

#![deny(unused_must_use)]

pub mod app;
pub mod boot;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod inventory;
pub mod jotter;
pub mod ota;
pub mod pins;
pub mod power;

pub mod adapters;
pub mod drivers;
