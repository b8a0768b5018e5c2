//! Boot configuration and the persisted per-device config files.
//!
//! Tunables live in [`BootConfig`] and can be overridden by
//! `config/boot_cfg.json`.  WiFi credentials and per-module repository
//! locations are separate JSON files provisioned onto the flash filesystem:
//!
//! ```text
//! config/wifi_cfg.json               { "wifi": {"ssid", "password"}, "github": {"pat"}? }
//! config/<module>_gitrepo_cfg.json   { "gitrepo": {"url"} }
//! ```
//!
//! All file access goes through [`StoragePort`].

use core::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConnectivityError, StorageError, StoragePort};
use crate::error::{BootError, Result};

/// Modules that can be updated over the air, in update order.
pub const OTA_MODULES: &[&str] = &[
    "mainloop",
    "ota_updater",
    "pybd_expansion",
    "sensor_payload",
    "uac_localisation",
    "uac_modem",
    "uac_network",
];

/// Optional boot tunables file, relative to the storage root.
pub const BOOT_CONFIG_PATH: &str = "config/boot_cfg.json";

const WIFI_CONFIG_FILE: &str = "wifi_cfg.json";
const MODULE_CONFIG_SUFFIX: &str = "_gitrepo_cfg.json";

// ---------------------------------------------------------------------------
// Boot tunables
// ---------------------------------------------------------------------------

/// Where the manual-update flag is checked relative to the startup window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualCheckOrder {
    /// Consume the flag straight after the power check.
    #[default]
    BeforeStartupSignal,
    /// Consume the flag after the operator window has elapsed.
    AfterStartupSignal,
}

/// Core boot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    // --- Power gate ---
    /// Battery voltage below which the node halts (volts).
    pub battery_threshold_v: f32,
    /// Wait after power-up before trusting the battery reading (ms).
    pub battery_settle_ms: u32,
    /// Length of one low-power sleep interval in the halt loop (ms).
    pub halt_sleep_ms: u32,

    // --- OTA ---
    /// Hardware watchdog timeout while an update cycle runs (ms).
    pub watchdog_timeout_ms: u32,
    /// Pause before the forced reset so buffered output can drain (ms).
    pub reset_settle_ms: u32,

    // --- Startup signal ---
    /// Operator window with the indicators lit (seconds).
    pub startup_window_secs: u32,
    /// Granularity of the startup wait (ms).
    pub startup_poll_ms: u32,

    // --- Boot sequence variants ---
    /// Also run an update cycle after a power-on reset.
    pub update_on_power_on_reset: bool,
    /// Skip the startup window when no USB serial link is attached.
    pub gate_delay_on_usb_presence: bool,
    /// Ordering of the manual-update flag check.
    pub manual_update_check: ManualCheckOrder,

    // --- Paths (relative to the storage root) ---
    pub config_dir: String,
    pub log_dir: String,
    pub update_flag_path: String,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            // Power gate
            battery_threshold_v: 3.6,
            battery_settle_ms: 2_000,
            halt_sleep_ms: 60_000,

            // OTA
            watchdog_timeout_ms: 30_000,
            reset_settle_ms: 1_000,

            // Startup signal
            startup_window_secs: 30,
            startup_poll_ms: 100,

            // Variants
            update_on_power_on_reset: false,
            gate_delay_on_usb_presence: false,
            manual_update_check: ManualCheckOrder::BeforeStartupSignal,

            // Paths
            config_dir: "config".into(),
            log_dir: "logs".into(),
            update_flag_path: ".USOTA".into(),
        }
    }
}

impl BootConfig {
    /// Range-check every field.  Rejects rather than clamps.
    pub fn validate(&self) -> core::result::Result<(), &'static str> {
        if !(2.5..=4.5).contains(&self.battery_threshold_v) {
            return Err("battery_threshold_v must be 2.5–4.5");
        }
        if self.battery_settle_ms > 10_000 {
            return Err("battery_settle_ms must be at most 10000");
        }
        if self.halt_sleep_ms < 1_000 {
            return Err("halt_sleep_ms must be at least 1000");
        }
        if !(1_000..=120_000).contains(&self.watchdog_timeout_ms) {
            return Err("watchdog_timeout_ms must be 1000–120000");
        }
        if self.reset_settle_ms >= self.watchdog_timeout_ms {
            return Err("reset_settle_ms must be shorter than watchdog_timeout_ms");
        }
        if self.startup_window_secs > 600 {
            return Err("startup_window_secs must be at most 600");
        }
        if !(1..=1_000).contains(&self.startup_poll_ms) {
            return Err("startup_poll_ms must be 1–1000");
        }
        if self.config_dir.is_empty() || self.log_dir.is_empty() || self.update_flag_path.is_empty() {
            return Err("paths must not be empty");
        }
        Ok(())
    }

    pub fn wifi_config_path(&self) -> String {
        format!("{}/{}", self.config_dir, WIFI_CONFIG_FILE)
    }

    pub fn module_config_path(&self, module: &str) -> String {
        format!("{}/{}{}", self.config_dir, module, MODULE_CONFIG_SUFFIX)
    }
}

/// Load `config/boot_cfg.json`.  A missing file yields the defaults.
pub fn load_boot_config(storage: &impl StoragePort) -> Result<BootConfig> {
    let text = match storage.read_to_string(BOOT_CONFIG_PATH) {
        Ok(text) => text,
        Err(StorageError::NotFound) => {
            info!("Config: no {}, using defaults", BOOT_CONFIG_PATH);
            return Ok(BootConfig::default());
        }
        Err(e) => return Err(read_error(BOOT_CONFIG_PATH, e)),
    };
    let cfg: BootConfig = serde_json::from_str(&text).map_err(|e| malformed(BOOT_CONFIG_PATH, e))?;
    cfg.validate().map_err(|reason| malformed(BOOT_CONFIG_PATH, reason))?;
    info!("Config: loaded {}", BOOT_CONFIG_PATH);
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// WiFi credentials
// ---------------------------------------------------------------------------

/// Validated station credentials plus the optional repository access token.
#[derive(Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    access_token: Option<String>,
}

/// 802.11 SSIDs are 1-32 octets; UTF-8 names are legal.
fn validate_ssid(ssid: &str) -> core::result::Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> core::result::Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

impl WifiCredentials {
    pub fn new(
        ssid: &str,
        password: &str,
        access_token: Option<&str>,
    ) -> core::result::Result<Self, ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut s = heapless::String::new();
        s.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        let mut p = heapless::String::new();
        p.push_str(password).map_err(|_| ConnectivityError::InvalidPassword)?;
        Ok(Self {
            ssid: s,
            password: p,
            access_token: access_token.filter(|t| !t.is_empty()).map(str::to_owned),
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

impl fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct WifiConfigFile {
    wifi: WifiSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    github: Option<GithubSection>,
}

#[derive(Serialize, Deserialize)]
struct WifiSection {
    ssid: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
struct GithubSection {
    pat: String,
}

/// Parse the contents of `wifi_cfg.json`.  `path` only labels errors.
pub fn parse_wifi_config(path: &str, text: &str) -> Result<WifiCredentials> {
    let file: WifiConfigFile = serde_json::from_str(text).map_err(|e| malformed(path, e))?;
    let token = file.github.as_ref().map(|g| g.pat.as_str());
    WifiCredentials::new(&file.wifi.ssid, &file.wifi.password, token).map_err(|e| malformed(path, e))
}

pub fn load_wifi_config(storage: &impl StoragePort, config: &BootConfig) -> Result<WifiCredentials> {
    let path = config.wifi_config_path();
    let text = storage.read_to_string(&path).map_err(|e| read_error(&path, e))?;
    parse_wifi_config(&path, &text)
}

pub fn save_wifi_config(
    storage: &mut impl StoragePort,
    config: &BootConfig,
    credentials: &WifiCredentials,
) -> Result<()> {
    let file = WifiConfigFile {
        wifi: WifiSection {
            ssid: credentials.ssid().into(),
            password: credentials.password().into(),
        },
        github: credentials.access_token().map(|pat| GithubSection { pat: pat.into() }),
    };
    write_json(storage, &config.wifi_config_path(), &file)
}

// ---------------------------------------------------------------------------
// Per-module repository config
// ---------------------------------------------------------------------------

/// Where one OTA module's code is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleUpdateConfig {
    pub module_name: String,
    pub repository_url: String,
}

#[derive(Serialize, Deserialize)]
struct GitRepoConfigFile {
    gitrepo: GitRepoSection,
}

#[derive(Serialize, Deserialize)]
struct GitRepoSection {
    url: String,
}

/// Parse the contents of `<module>_gitrepo_cfg.json`.
pub fn parse_module_config(path: &str, module: &str, text: &str) -> Result<ModuleUpdateConfig> {
    let file: GitRepoConfigFile = serde_json::from_str(text).map_err(|e| malformed(path, e))?;
    let url = file.gitrepo.url.trim();
    if url.is_empty() {
        return Err(malformed(path, "gitrepo.url is empty"));
    }
    Ok(ModuleUpdateConfig {
        module_name: module.into(),
        repository_url: url.into(),
    })
}

pub fn load_module_config(
    storage: &impl StoragePort,
    config: &BootConfig,
    module: &str,
) -> Result<ModuleUpdateConfig> {
    let path = config.module_config_path(module);
    let text = storage.read_to_string(&path).map_err(|e| read_error(&path, e))?;
    parse_module_config(&path, module, &text)
}

pub fn save_module_config(
    storage: &mut impl StoragePort,
    config: &BootConfig,
    module: &ModuleUpdateConfig,
) -> Result<()> {
    let path = config.module_config_path(&module.module_name);
    let url = module.repository_url.trim();
    if url.is_empty() {
        return Err(malformed(&path, "gitrepo.url is empty"));
    }
    let file = GitRepoConfigFile {
        gitrepo: GitRepoSection { url: url.into() },
    };
    write_json(storage, &path, &file)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_json<T: Serialize>(storage: &mut impl StoragePort, path: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value).map_err(|e| malformed(path, e))?;
    storage.write(path, json.as_bytes())?;
    Ok(())
}

fn read_error(path: &str, e: StorageError) -> BootError {
    match e {
        StorageError::NotFound => BootError::ConfigMissing { path: path.into() },
        StorageError::InvalidData => malformed(path, e),
        other => BootError::StorageUnavailable(other),
    }
}

fn malformed(path: &str, reason: impl fmt::Display) -> BootError {
    BootError::ConfigMalformed {
        path: path.into(),
        reason: reason.to_string(),
    }
}
