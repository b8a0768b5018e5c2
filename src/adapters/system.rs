//! System adapter: [`BoardPort`] for the ESP32-S3 carrier board.
//!
//! - **`target_os = "espidf"`**: reset reason, USB peripheral control,
//!   light-sleep and restart through ESP-IDF.
//! - **all other targets**: simulation.  `hard_reset` panics with a
//!   [`SimulatedReset`] payload so host tests can catch it.

use embedded_hal::digital::OutputPin;
use log::info;

use crate::app::ports::{BoardPort, ResetCause};
use crate::drivers::hw_init;
use crate::drivers::indicator::IndicatorPair;
use crate::pins::BoardPin;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Panic payload standing in for a hardware reset on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedReset;

pub struct SystemAdapter<R, G> {
    indicators: IndicatorPair<R, G>,
    #[cfg(not(target_os = "espidf"))]
    sim_reset_cause: ResetCause,
    #[cfg(not(target_os = "espidf"))]
    sim_usb_link: Option<bool>,
}

impl<R: OutputPin, G: OutputPin> SystemAdapter<R, G> {
    pub fn new(indicators: IndicatorPair<R, G>) -> Self {
        Self {
            indicators,
            #[cfg(not(target_os = "espidf"))]
            sim_reset_cause: ResetCause::PowerOn,
            #[cfg(not(target_os = "espidf"))]
            sim_usb_link: None,
        }
    }

    /// Simulation: what `reset_cause` and `interactive_link` report.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_sim_state(mut self, cause: ResetCause, usb_link: Option<bool>) -> Self {
        self.sim_reset_cause = cause;
        self.sim_usb_link = usb_link;
        self
    }

    pub fn indicators_lit(&self) -> bool {
        self.indicators.is_lit()
    }
}

impl<R: OutputPin, G: OutputPin> BoardPort for SystemAdapter<R, G> {
    #[cfg(target_os = "espidf")]
    fn disable_usb_storage(&mut self) {
        // The mass-storage class rides on the USB OTG peripheral; gating its
        // clock detaches the drive from any host.
        // SAFETY: peripheral clock gating from the single boot task.
        unsafe {
            periph_module_disable(periph_module_t_PERIPH_USB_MODULE);
        }
        info!("System: USB OTG disabled");
    }

    #[cfg(not(target_os = "espidf"))]
    fn disable_usb_storage(&mut self) {
        info!("System(sim): USB storage off");
    }

    fn park_pin(&mut self, pin: BoardPin) {
        hw_init::park_input(pin);
    }

    fn set_indicators(&mut self, on: bool) {
        self.indicators.set(on);
    }

    #[cfg(target_os = "espidf")]
    fn interactive_link(&self) -> Option<bool> {
        // SAFETY: read-only query of the USB Serial/JTAG controller state.
        Some(unsafe { usb_serial_jtag_is_connected() })
    }

    #[cfg(not(target_os = "espidf"))]
    fn interactive_link(&self) -> Option<bool> {
        self.sim_usb_link
    }

    #[cfg(target_os = "espidf")]
    fn reset_cause(&self) -> ResetCause {
        // SAFETY: esp_reset_reason reads a value latched at boot.
        #[allow(non_upper_case_globals)]
        match unsafe { esp_reset_reason() } {
            esp_reset_reason_t_ESP_RST_POWERON | esp_reset_reason_t_ESP_RST_BROWNOUT => {
                ResetCause::PowerOn
            }
            esp_reset_reason_t_ESP_RST_SW | esp_reset_reason_t_ESP_RST_PANIC => {
                ResetCause::Software
            }
            esp_reset_reason_t_ESP_RST_INT_WDT
            | esp_reset_reason_t_ESP_RST_TASK_WDT
            | esp_reset_reason_t_ESP_RST_WDT => ResetCause::Watchdog,
            esp_reset_reason_t_ESP_RST_DEEPSLEEP => ResetCause::DeepSleep,
            _ => ResetCause::Unknown,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn reset_cause(&self) -> ResetCause {
        self.sim_reset_cause
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }

    #[cfg(target_os = "espidf")]
    fn low_power_sleep(&mut self, ms: u32) {
        // SAFETY: timer wakeup + light sleep from the single boot task.
        unsafe {
            esp_sleep_enable_timer_wakeup(u64::from(ms) * 1_000);
            esp_light_sleep_start();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn low_power_sleep(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }

    #[cfg(target_os = "espidf")]
    fn hard_reset(&mut self) -> ! {
        info!("System: restarting");
        esp_ota::restart();
    }

    #[cfg(not(target_os = "espidf"))]
    fn hard_reset(&mut self) -> ! {
        info!("System(sim): hard reset");
        std::panic::panic_any(SimulatedReset);
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Confirm the running firmware image so the bootloader does not roll it
/// back on the next reset.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("System: firmware marked valid (rollback cancelled)"),
        Err(e) => log::warn!("System: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("System(sim): rollback check skipped");
}
