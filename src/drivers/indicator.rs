//! Paired startup indicator LEDs (red + green).
//!
//! Generic over any `embedded-hal` output pin, so the same driver runs on
//! `esp-idf-hal` pin drivers and on [`SimPin`] in host tests.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use log::warn;

pub struct IndicatorPair<R, G> {
    red: Option<R>,
    green: Option<G>,
    lit: bool,
}

impl<R: OutputPin, G: OutputPin> IndicatorPair<R, G> {
    pub fn new(red: R, green: G) -> Self {
        Self {
            red: Some(red),
            green: Some(green),
            lit: false,
        }
    }

    /// A pair whose pins could not be claimed.  `set` only tracks state.
    pub fn detached() -> Self {
        Self {
            red: None,
            green: None,
            lit: false,
        }
    }

    /// Switch both LEDs together.  Pin errors are logged, not returned.
    pub fn set(&mut self, on: bool) {
        if let Some(pin) = self.red.as_mut() {
            if let Err(e) = drive(pin, on) {
                warn!("Indicator: red pin error {:?}", e);
            }
        }
        if let Some(pin) = self.green.as_mut() {
            if let Err(e) = drive(pin, on) {
                warn!("Indicator: green pin error {:?}", e);
            }
        }
        self.lit = on;
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool) -> Result<(), P::Error> {
    if on { pin.set_high() } else { pin.set_low() }
}

/// In-memory output pin for host builds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimPin {
    pub high: bool,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}
