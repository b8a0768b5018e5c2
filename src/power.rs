//! Power gate: refuses to boot on a depleted battery.
//!
//! After a short settle delay the gate samples the battery once.  At or
//! above the threshold it returns [`BootOutcome::Continue`] and touches
//! nothing else.  Below it (or when the reading cannot be trusted) the
//! node is shut down into its lowest-power state and never comes back:
//!
//! ```text
//!   USB storage off ─▶ park LOW_POWER_PINS ─▶ payload off ─▶ sleep forever
//! ```
//!
//! Leaving the node to brown out and power-on-reset in a loop would cycle
//! the cell through deep discharge, so the halt is terminal until an
//! operator restores power.

use std::sync::Arc;

use log::{info, warn};

use crate::app::ports::{BatteryPort, BoardPort, ReadingError};
use crate::boot::BootOutcome;
use crate::config::BootConfig;
use crate::error::BootError;
use crate::jot;
use crate::jotter::Jotter;
use crate::pins::LOW_POWER_PINS;

pub struct PowerGate {
    threshold_v: f32,
    settle_ms: u32,
    halt_sleep_ms: u32,
    jotter: Arc<Jotter>,
}

impl PowerGate {
    pub fn new(config: &BootConfig, jotter: Arc<Jotter>) -> Self {
        Self {
            threshold_v: config.battery_threshold_v,
            settle_ms: config.battery_settle_ms,
            halt_sleep_ms: config.halt_sleep_ms,
            jotter,
        }
    }

    pub fn threshold_v(&self) -> f32 {
        self.threshold_v
    }

    /// Pure decision on one reading.
    ///
    /// An unreadable or non-finite sample halts: without a trustworthy
    /// voltage the gate cannot know the battery is safe.
    pub fn assess(&self, reading: Result<f32, ReadingError>) -> BootOutcome {
        match reading {
            Ok(v) if v.is_finite() && v >= self.threshold_v => BootOutcome::Continue,
            _ => BootOutcome::HaltLowPower,
        }
    }

    /// Settle, sample, and decide.  Only ever returns `Continue`.
    pub fn evaluate(
        &self,
        battery: &mut impl BatteryPort,
        board: &mut impl BoardPort,
    ) -> BootOutcome {
        board.delay_ms(self.settle_ms);
        let reading = battery.read_voltage();

        match (&reading, self.assess(reading)) {
            (Ok(v), BootOutcome::Continue) => {
                info!("Power: battery {:.2} V (threshold {:.2} V)", v, self.threshold_v);
                BootOutcome::Continue
            }
            (Ok(v), _) => {
                warn!("Power: battery {:.2} V below {:.2} V", v, self.threshold_v);
                jot!(self.jotter, "Power: battery {:.2} V below {:.2} V, halting", v, self.threshold_v);
                self.halt(battery, board)
            }
            (Err(e), _) => {
                warn!("Power: battery reading failed ({})", e);
                self.jotter
                    .record_fault(&BootError::HardwareReadingUnavailable("battery voltage"));
                self.halt(battery, board)
            }
        }
    }

    /// Enter the terminal low-power state.
    pub fn halt(&self, battery: &mut impl BatteryPort, board: &mut impl BoardPort) -> ! {
        jot!(self.jotter, "Power: entering low-power halt");

        board.disable_usb_storage();
        for pin in LOW_POWER_PINS {
            board.park_pin(*pin);
        }
        battery.disable_output();

        loop {
            board.low_power_sleep(self.halt_sleep_ms);
        }
    }
}
