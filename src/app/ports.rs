//! Port traits: the hexagonal boundary between the boot core and the board.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ PowerGate / OtaController / BootSequencer
//! ```
//!
//! Driven adapters (battery ADC, watchdog, radio, flash filesystem, module
//! updater, main application) implement these traits.  The core consumes
//! them via generics, so nothing in the boot decisions touches hardware
//! directly and every stage can be exercised with recording mocks.
//!
//! ## Contract notes
//!
//! - **WatchdogPort** has no disarm: once armed, only feeding or expiry.
//! - **BoardPort::hard_reset** never returns.
//! - **ModuleUpdater::apply_pending_updates_if_available** may only touch
//!   on-disk module code, never running state.

use core::fmt;

use crate::config::WifiCredentials;
use crate::pins::BoardPin;

// ───────────────────────────────────────────────────────────────
// Battery port (driven adapter: ADC → power gate)
// ───────────────────────────────────────────────────────────────

/// Battery voltage collaborator.
pub trait BatteryPort {
    /// Read a battery voltage sample in volts.
    fn read_voltage(&mut self) -> Result<f32, ReadingError>;

    /// Switch off the downstream sensor / power sub-module.
    fn disable_output(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Board port (driven adapter: boot core → SoC and carrier board)
// ───────────────────────────────────────────────────────────────

/// Why the SoC came out of reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    /// Fresh power applied (or brownout recovery).
    PowerOn,
    /// Software-requested restart.
    Software,
    /// A watchdog expired.
    Watchdog,
    /// Woke from deep sleep.
    DeepSleep,
    Unknown,
}

/// Board-level control used by the power gate and the sequencer.
pub trait BoardPort {
    /// Stop presenting USB mass storage to a host.
    fn disable_usb_storage(&mut self);

    /// Drive `pin` to its defined low-power state (input, no pulls).
    fn park_pin(&mut self, pin: BoardPin);

    /// Switch the paired startup indicator LEDs on or off.
    fn set_indicators(&mut self, on: bool);

    /// Whether an interactive (USB serial) link is attached.
    /// `None` when the board cannot tell.
    fn interactive_link(&self) -> Option<bool>;

    /// Reason for the most recent reset.
    fn reset_cause(&self) -> ResetCause;

    /// Blocking delay.
    fn delay_ms(&mut self, ms: u32);

    /// One low-power sleep interval.  Returns after the interval elapses.
    fn low_power_sleep(&mut self, ms: u32);

    /// Force a hardware reset.
    fn hard_reset(&mut self) -> !;
}

// ───────────────────────────────────────────────────────────────
// Watchdog port
// ───────────────────────────────────────────────────────────────

/// Hardware deadman timer.
pub trait WatchdogPort {
    /// Start the timer.  Irrevocable.
    fn arm(&mut self, timeout_ms: u32);

    /// Restart the countdown.  A no-op before [`arm`](Self::arm).
    fn feed(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Network port (driven adapter: OTA controller → radio)
// ───────────────────────────────────────────────────────────────

/// Errors from [`NetworkPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    /// No WiFi credentials configured.
    NoCredentials,
    /// SSID empty or longer than 32 bytes.
    InvalidSsid,
    /// Password neither empty nor 8–64 bytes.
    InvalidPassword,
    /// The access point rejected or never answered the association.
    ConnectionFailed,
    /// Associated, but the IP interface never came up.
    Timeout,
    /// The radio driver failed to initialise at startup.
    RadioUnavailable,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::Timeout => write!(f, "WiFi connection timed out"),
            Self::RadioUnavailable => write!(f, "WiFi radio unavailable"),
        }
    }
}

impl std::error::Error for ConnectivityError {}

/// Station-mode network link.
pub trait NetworkPort {
    /// Tear down whatever a previous attempt left half-initialised.
    fn reset_interface(&mut self);

    /// Associate and bring the IP interface up.  Blocking.
    fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), ConnectivityError>;
}

// ───────────────────────────────────────────────────────────────
// Update source (driven adapter: OTA controller ↔ module updater)
// ───────────────────────────────────────────────────────────────

/// Errors from [`ModuleUpdater`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Remote manifest or file could not be fetched.
    Transfer(String),
    /// Remote manifest could not be parsed.
    Manifest(String),
    /// A staged file did not match its declared digest.
    Integrity { path: String },
    /// Local module tree could not be read or written.
    Storage(String),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer(msg) => write!(f, "transfer failed: {msg}"),
            Self::Manifest(msg) => write!(f, "bad manifest: {msg}"),
            Self::Integrity { path } => write!(f, "digest mismatch: {path}"),
            Self::Storage(msg) => write!(f, "module storage: {msg}"),
        }
    }
}

impl std::error::Error for UpdateError {}

/// One module's updater handle.
pub trait ModuleUpdater {
    /// Installed version token.
    fn current_version(&mut self) -> Result<String, UpdateError>;

    /// Stage a newer version if the remote has one.  `Ok(true)` when staged.
    fn download_updates_if_available(&mut self) -> Result<bool, UpdateError>;

    /// Swap a staged version into place.  `Ok(true)` when applied.
    fn apply_pending_updates_if_available(&mut self) -> Result<bool, UpdateError>;
}

/// Factory for [`ModuleUpdater`] handles.
pub trait UpdateSource {
    type Handle: ModuleUpdater;

    /// Construct the updater for `module` hosted at `repository_url`.
    fn open(&mut self, repository_url: &str, module: &str, access_token: Option<&str>) -> Self::Handle;
}

// ───────────────────────────────────────────────────────────────
// Main application entry
// ───────────────────────────────────────────────────────────────

/// Context handed to the main application at handoff.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct AppEnvironment {
    /// Installed module versions, best effort.
    #[serde(rename = "installedModules")]
    pub installed_modules: crate::inventory::ModuleVersionRecord,
}

/// The sensing application the sequencer hands control to.
pub trait MainApplication {
    fn set_environment(&mut self, env: &AppEnvironment);

    /// Blocking.  Not expected to return under normal operation.
    fn run(&mut self) -> anyhow::Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: core ↔ flash filesystem)
// ───────────────────────────────────────────────────────────────

/// Path-keyed persistent storage for config files and the update flag.
///
/// Paths are relative to the adapter's root and use `/` separators.
/// Writes MUST be atomic: a power cut leaves either the old or the new
/// contents, never a torn file.
pub trait StoragePort {
    /// Read a whole file as UTF-8.
    fn read_to_string(&self, path: &str) -> Result<String, StorageError>;

    /// Replace a file's contents atomically.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a file.  Returns `Ok(())` even if it didn't exist.
    fn delete(&mut self, path: &str) -> Result<(), StorageError>;

    /// Check whether a file exists without reading it.
    fn exists(&self, path: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`BatteryPort::read_voltage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingError {
    /// The ADC driver returned an error.
    AdcReadFailed,
    /// The ADC was never initialised.
    NotInitialised,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested file does not exist.
    NotFound,
    /// File exists but is not valid UTF-8.
    InvalidData,
    /// Filesystem is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for ReadingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdcReadFailed => write!(f, "ADC read failed"),
            Self::NotInitialised => write!(f, "ADC not initialised"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::InvalidData => write!(f, "file is not valid UTF-8"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::InvalidData => Self::InvalidData,
            std::io::ErrorKind::StorageFull => Self::Full,
            _ => Self::IoError,
        }
    }
}
