//! One-shot hardware peripheral initialization and raw pin access.
//!
//! Configures the battery ADC channel and the rail/LED output pins using
//! raw ESP-IDF sys calls.  Called once from `main()` before the boot
//! sequencer runs.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

/// ADC full-scale input at 12 dB attenuation (mV).
pub const ADC_FULL_SCALE_MV: u32 = 3_100;
const ADC_MAX_RAW: u32 = 4_095;

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the sequencer; single-threaded.
    unsafe {
        init_adc()?;
        init_gpio_outputs()?;
    }
    log::info!("hw_init: battery ADC and rail outputs configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── ADC (oneshot) ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
static mut ADC1_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

/// SAFETY: Must be called only from the single-threaded init path or the
/// power gate's read path.
#[cfg(target_os = "espidf")]
unsafe fn adc1_handle() -> adc_oneshot_unit_handle_t {
    unsafe { ADC1_HANDLE }
}

#[cfg(target_os = "espidf")]
unsafe fn init_adc() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC1_HANDLE is only written here, once at boot.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC1_HANDLE) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    let ret = unsafe {
        adc_oneshot_config_channel(adc1_handle(), pins::BATTERY_ADC_CHANNEL, &chan_cfg)
    };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    log::info!("hw_init: ADC1 CH{} configured (battery)", pins::BATTERY_ADC_CHANNEL);
    Ok(())
}

/// Whether `init_adc` succeeded.
#[cfg(target_os = "espidf")]
pub fn adc_ready() -> bool {
    // SAFETY: read-only check of the handle written once at boot.
    !unsafe { adc1_handle() }.is_null()
}

#[cfg(not(target_os = "espidf"))]
pub fn adc_ready() -> bool {
    true
}

/// Raw 12-bit sample of `channel`, or the ESP-IDF error code.
#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> Result<u16, i32> {
    let mut raw: i32 = 0;
    // SAFETY: adc1_handle() contract, single-threaded access only.
    let ret = unsafe { adc_oneshot_read(adc1_handle(), channel, &mut raw) };
    if ret != ESP_OK as i32 {
        return Err(ret);
    }
    Ok(raw.max(0) as u16)
}

#[cfg(not(target_os = "espidf"))]
static SIM_ADC_RAW: AtomicU16 = AtomicU16::new(2_700);

/// Simulation: set the raw value `adc1_read` returns on the host.
#[cfg(not(target_os = "espidf"))]
pub fn set_sim_adc_raw(raw: u16) {
    SIM_ADC_RAW.store(raw, Ordering::Relaxed);
}

#[cfg(not(target_os = "espidf"))]
pub fn adc1_read(_channel: u32) -> Result<u16, i32> {
    Ok(SIM_ADC_RAW.load(Ordering::Relaxed))
}

/// Convert a raw 12-bit sample to millivolts at the ADC pin.
pub fn raw_to_mv(raw: u16) -> u32 {
    u32::from(raw.min(ADC_MAX_RAW as u16)) * ADC_FULL_SCALE_MV / ADC_MAX_RAW
}

// ── GPIO ──────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    let output_pins = [
        pins::RAIL_3V3_EN,
        pins::SENSOR_EN,
        pins::LED_RED,
        pins::LED_GREEN,
    ];
    for pin in output_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin.gpio,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }
    // Rails on for normal operation.
    unsafe {
        gpio_set_level(pins::RAIL_3V3_EN.gpio, 1);
        gpio_set_level(pins::SENSOR_EN.gpio, 1);
    }
    Ok(())
}

/// Drive an output pin.
#[cfg(target_os = "espidf")]
pub fn set_output(pin: pins::BoardPin, high: bool) {
    // SAFETY: gpio_set_level is a register write, valid for configured outputs.
    unsafe {
        gpio_set_level(pin.gpio, u32::from(high));
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn set_output(pin: pins::BoardPin, high: bool) {
    log::debug!("hw_init(sim): {} -> {}", pin.name, u8::from(high));
}

/// Release `pin` to a floating input: the lowest-leakage state.
#[cfg(target_os = "espidf")]
pub fn park_input(pin: pins::BoardPin) {
    // SAFETY: resetting a GPIO to its default input state.
    unsafe {
        gpio_reset_pin(pin.gpio);
        gpio_set_direction(pin.gpio, gpio_mode_t_GPIO_MODE_INPUT);
        gpio_set_pull_mode(pin.gpio, gpio_pull_mode_t_GPIO_FLOATING);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn park_input(pin: pins::BoardPin) {
    log::debug!("hw_init(sim): {} parked", pin.name);
}
