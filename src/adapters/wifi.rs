//! WiFi station-mode adapter.
//!
//! Implements [`NetworkPort`] for the OTA cycle: a blocking connect with the
//! provisioned credentials, preceded by a teardown of whatever radio state a
//! previous (possibly interrupted) attempt left behind.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi<EspWifi>`.
//! - **all other targets**: simulation for host-side tests.
//!
//! A radio that failed to initialise is represented by
//! [`WifiAdapter::unavailable`]: the boot carries on and the OTA cycle sees
//! [`ConnectivityError::RadioUnavailable`] at connect time.

use log::{info, warn};

use crate::app::ports::{ConnectivityError, NetworkPort};
use crate::config::WifiCredentials;

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Idle,
    Connected,
    Failed,
}

pub struct WifiAdapter {
    state: WifiState,
    #[cfg(target_os = "espidf")]
    wifi: Option<BlockingWifi<EspWifi<'static>>>,
    /// Simulation: whether a radio is present at all.
    #[cfg(not(target_os = "espidf"))]
    sim_radio: bool,
    /// Simulation: whether the access point answers.
    #[cfg(not(target_os = "espidf"))]
    sim_reachable: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_resets: u32,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            state: WifiState::Idle,
            wifi: Some(wifi),
        }
    }

    /// Adapter for a radio that could not be brought up.
    #[cfg(target_os = "espidf")]
    pub fn unavailable() -> Self {
        Self {
            state: WifiState::Idle,
            wifi: None,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(sim_reachable: bool) -> Self {
        Self {
            state: WifiState::Idle,
            sim_radio: true,
            sim_reachable,
            sim_resets: 0,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn unavailable() -> Self {
        Self {
            sim_radio: false,
            ..Self::new(false)
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Simulation: number of `reset_interface` calls.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_resets(&self) -> u32 {
        self.sim_resets
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_reset(&mut self) {
        let Some(wifi) = self.wifi.as_mut() else {
            return;
        };
        if wifi.is_started().unwrap_or(false) {
            if let Err(e) = wifi.disconnect() {
                warn!("WiFi: disconnect during reset failed ({})", e);
            }
            if let Err(e) = wifi.stop() {
                warn!("WiFi: stop during reset failed ({})", e);
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_reset(&mut self) {
        self.sim_resets += 1;
    }

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, credentials: &WifiCredentials) -> Result<(), ConnectivityError> {
        let Some(wifi) = self.wifi.as_mut() else {
            warn!("WiFi: no radio");
            return Err(ConnectivityError::RadioUnavailable);
        };
        let auth_method = if credentials.password().is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: credentials
                .password()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        wifi.set_configuration(&config).map_err(|e| {
            warn!("WiFi: set_configuration failed ({})", e);
            ConnectivityError::ConnectionFailed
        })?;
        wifi.start().map_err(|e| {
            warn!("WiFi: start failed ({})", e);
            ConnectivityError::ConnectionFailed
        })?;
        wifi.connect().map_err(|e| {
            warn!("WiFi: association failed ({})", e);
            ConnectivityError::ConnectionFailed
        })?;
        wifi.wait_netif_up().map_err(|e| {
            warn!("WiFi: netif never came up ({})", e);
            ConnectivityError::Timeout
        })?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, credentials: &WifiCredentials) -> Result<(), ConnectivityError> {
        if !self.sim_radio {
            warn!("WiFi(sim): no radio");
            return Err(ConnectivityError::RadioUnavailable);
        }
        if !self.sim_reachable {
            warn!("WiFi(sim): '{}' not reachable", credentials.ssid());
            return Err(ConnectivityError::ConnectionFailed);
        }
        Ok(())
    }
}

impl NetworkPort for WifiAdapter {
    fn reset_interface(&mut self) {
        info!("WiFi: resetting interface");
        self.platform_reset();
        self.state = WifiState::Idle;
    }

    fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), ConnectivityError> {
        info!("WiFi: connecting to '{}'", credentials.ssid());
        match self.platform_connect(credentials) {
            Ok(()) => {
                self.state = WifiState::Connected;
                info!("WiFi: connected");
                Ok(())
            }
            Err(e) => {
                self.state = WifiState::Failed;
                Err(e)
            }
        }
    }
}
