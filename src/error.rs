//! Unified error types for the boot controller.
//!
//! Every recoverable fault in the core funnels into [`BootError`], whose
//! variants mirror the recovery policy: each one is handled as close to its
//! source as possible and never propagated past the boot sequencer.  Stages
//! report what happened through [`StageOutcome`] instead of swallowing
//! failures silently.

use core::fmt;

use crate::app::ports::{ConnectivityError, StorageError, UpdateError};

// ---------------------------------------------------------------------------
// Top-level boot error
// ---------------------------------------------------------------------------

/// Every fallible step of a boot cycle reports one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum BootError {
    /// A configuration file does not exist.  Skips the affected module or cycle.
    ConfigMissing { path: String },
    /// A configuration file exists but could not be parsed or validated.
    ConfigMalformed { path: String, reason: String },
    /// No usable network link.  Aborts the OTA cycle (the reset still happens).
    NetworkUnavailable(ConnectivityError),
    /// Download or apply failed for one module.  The loop moves on.
    ModuleUpdateFailed { module: String, reason: UpdateError },
    /// Persistent storage could not be read or written.
    StorageUnavailable(StorageError),
    /// The battery voltage could not be read.  Treated as below threshold.
    HardwareReadingUnavailable(&'static str),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigMissing { path } => write!(f, "config missing: {path}"),
            Self::ConfigMalformed { path, reason } => {
                write!(f, "config malformed: {path} ({reason})")
            }
            Self::NetworkUnavailable(e) => write!(f, "network unavailable: {e}"),
            Self::ModuleUpdateFailed { module, reason } => {
                write!(f, "module update failed: {module} ({reason})")
            }
            Self::StorageUnavailable(e) => write!(f, "storage unavailable: {e}"),
            Self::HardwareReadingUnavailable(what) => {
                write!(f, "hardware reading unavailable: {what}")
            }
        }
    }
}

impl std::error::Error for BootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NetworkUnavailable(e) => Some(e),
            Self::ModuleUpdateFailed { reason, .. } => Some(reason),
            Self::StorageUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectivityError> for BootError {
    fn from(e: ConnectivityError) -> Self {
        Self::NetworkUnavailable(e)
    }
}

impl From<StorageError> for BootError {
    fn from(e: StorageError) -> Self {
        Self::StorageUnavailable(e)
    }
}

// ---------------------------------------------------------------------------
// Stage outcome
// ---------------------------------------------------------------------------

/// Tagged result of one boot or OTA stage.
///
/// `Skipped` is a recoverable condition that only drops the stage's own
/// work; `Fatal` ends the enclosing cycle early.  Neither escapes the
/// sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Ok,
    Skipped(BootError),
    Fatal(BootError),
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// The error carried by a non-`Ok` outcome.
    pub fn error(&self) -> Option<&BootError> {
        match self {
            Self::Ok => None,
            Self::Skipped(e) | Self::Fatal(e) => Some(e),
        }
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skipped(e) => write!(f, "skipped: {e}"),
            Self::Fatal(e) => write!(f, "fatal: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, BootError>;
