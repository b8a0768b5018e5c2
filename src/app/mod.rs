//! Boot core boundary.
//!
//! The decisions made at boot (power veto, update trigger, handoff) live in
//! [`crate::power`], [`crate::ota`] and [`crate::boot`].  All interaction
//! with the board, the radio, the flash filesystem and the main application
//! happens through the **port traits** defined in [`ports`], keeping those
//! decisions fully testable without real peripherals.

pub mod ports;
