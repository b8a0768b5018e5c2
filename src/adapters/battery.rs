//! Battery monitor: ADC-backed [`BatteryPort`].
//!
//! The battery sits behind a resistive divider on ADC1.  A reading is the
//! mean of a short burst of one-shot samples scaled back up by the divider
//! ratio.  `disable_output` drops the sensor payload's enable line.

use crate::app::ports::{BatteryPort, ReadingError};
use crate::drivers::hw_init;
use crate::pins;

const SAMPLES_PER_READING: u32 = 8;

pub struct BatteryMonitor {
    channel: u32,
    divider_ratio: f32,
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl BatteryMonitor {
    pub fn new() -> Self {
        Self {
            channel: pins::BATTERY_ADC_CHANNEL,
            divider_ratio: pins::BATTERY_DIVIDER_RATIO,
        }
    }
}

impl BatteryPort for BatteryMonitor {
    fn read_voltage(&mut self) -> Result<f32, ReadingError> {
        if !hw_init::adc_ready() {
            return Err(ReadingError::NotInitialised);
        }
        let mut total_mv = 0u32;
        for _ in 0..SAMPLES_PER_READING {
            let raw = hw_init::adc1_read(self.channel).map_err(|rc| {
                log::warn!("Battery: ADC read failed (rc={})", rc);
                ReadingError::AdcReadFailed
            })?;
            total_mv += hw_init::raw_to_mv(raw);
        }
        let pin_mv = total_mv as f32 / SAMPLES_PER_READING as f32;
        Ok(pin_mv / 1_000.0 * self.divider_ratio)
    }

    fn disable_output(&mut self) {
        log::info!("Battery: sensor payload supply off");
        hw_init::set_output(pins::SENSOR_EN, false);
    }
}
