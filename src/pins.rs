//! GPIO / peripheral pin assignments for the sensor node carrier board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

/// A named GPIO on the carrier board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardPin {
    pub name: &'static str,
    pub gpio: i32,
}

impl BoardPin {
    pub const fn new(name: &'static str, gpio: i32) -> Self {
        Self { name, gpio }
    }
}

// ---------------------------------------------------------------------------
// Power rails
// ---------------------------------------------------------------------------

/// Enable for the main 3.3 V peripheral rail (SD card, modem, payload). HIGH = on.
pub const RAIL_3V3_EN: BoardPin = BoardPin::new("EN_3V3", 21);
/// Enable for the acoustic modem transceiver supply. HIGH = on.
pub const MODEM_EN: BoardPin = BoardPin::new("MODEM_EN", 38);
/// Enable for the sensor payload power switch. HIGH = on.
pub const SENSOR_EN: BoardPin = BoardPin::new("SENSOR_EN", 39);

// ---------------------------------------------------------------------------
// Battery monitor
// ---------------------------------------------------------------------------

/// Battery voltage through a 2:1 resistive divider.
/// ADC1 channel 3 (GPIO 4 on ESP32-S3).
pub const BATTERY_ADC_GPIO: i32 = 4;
pub const BATTERY_ADC_CHANNEL: u32 = 3;
/// Divider ratio: V_batt = V_adc × this.
pub const BATTERY_DIVIDER_RATIO: f32 = 2.0;

// ---------------------------------------------------------------------------
// Indicator LEDs
// ---------------------------------------------------------------------------

pub const LED_RED: BoardPin = BoardPin::new("LED_RED", 11);
pub const LED_GREEN: BoardPin = BoardPin::new("LED_GREEN", 12);
pub const LED_BLUE: BoardPin = BoardPin::new("LED_BLUE", 13);

// ---------------------------------------------------------------------------
// Buses to the payload and modem
// ---------------------------------------------------------------------------

pub const I2C_SDA: BoardPin = BoardPin::new("I2C_SDA", 14);
pub const I2C_SCL: BoardPin = BoardPin::new("I2C_SCL", 15);
pub const MODEM_UART_TX: BoardPin = BoardPin::new("MODEM_TX", 17);
pub const MODEM_UART_RX: BoardPin = BoardPin::new("MODEM_RX", 18);
pub const SD_CS: BoardPin = BoardPin::new("SD_CS", 10);

// ---------------------------------------------------------------------------
// Low-power halt set
// ---------------------------------------------------------------------------

/// Every non-essential pin, parked as a floating input when the battery is
/// too low to continue.  Rails first so downstream parts lose power before
/// their signal lines are released.
pub const LOW_POWER_PINS: &[BoardPin] = &[
    RAIL_3V3_EN,
    MODEM_EN,
    SENSOR_EN,
    LED_RED,
    LED_GREEN,
    LED_BLUE,
    I2C_SDA,
    I2C_SCL,
    MODEM_UART_TX,
    MODEM_UART_RX,
    SD_CS,
];
