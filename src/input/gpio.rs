//! Hook and dial lines on Raspberry Pi GPIO
//!
//! Interrupt callbacks run on rppal's own thread and only hand the raw
//! level to the debouncers.

use rppal::gpio::{Gpio, InputPin, Level, Trigger};
use tracing::{info, warn};

use super::{DebouncedEdgeSource, InputError};
use crate::config::{GpioConfig, Pull};
use crate::lifecycle::ShutdownToken;

/// Hardware hook and dial lines
pub struct GpioLines {
    hook: InputPin,
    dial: InputPin,
}

impl GpioLines {
    /// Claim both pins as inputs with the configured pull
    pub fn open(config: &GpioConfig) -> Result<Self, InputError> {
        let gpio = Gpio::new().map_err(|e| InputError::Gpio(e.to_string()))?;

        let claim = |number: u8| -> Result<InputPin, InputError> {
            let pin = gpio
                .get(number)
                .map_err(|e| InputError::Gpio(format!("pin {}: {}", number, e)))?;
            Ok(match config.pull {
                Pull::Up => pin.into_input_pullup(),
                Pull::Down => pin.into_input_pulldown(),
                Pull::None => pin.into_input(),
            })
        };

        let hook = claim(config.hook_pin)?;
        let dial = claim(config.dial_pin)?;
        info!(
            hook_pin = config.hook_pin,
            dial_pin = config.dial_pin,
            pull = ?config.pull,
            "GPIO lines claimed"
        );

        Ok(Self { hook, dial })
    }

    /// Current raw level of the hook line
    pub fn hook_level(&self) -> bool {
        self.hook.read() == Level::High
    }

    /// Current raw level of the dial line
    pub fn dial_level(&self) -> bool {
        self.dial.read() == Level::High
    }

    /// Route edges on both lines into their debouncers
    pub fn attach(
        &mut self,
        hook: DebouncedEdgeSource,
        dial: DebouncedEdgeSource,
        _shutdown: ShutdownToken,
    ) -> Result<(), InputError> {
        self.hook
            .set_async_interrupt(Trigger::Both, move |level| {
                hook.on_raw_transition(level == Level::High)
            })
            .map_err(|e| InputError::Gpio(e.to_string()))?;

        self.dial
            .set_async_interrupt(Trigger::Both, move |level| {
                dial.on_raw_transition(level == Level::High)
            })
            .map_err(|e| InputError::Gpio(e.to_string()))?;

        info!("GPIO interrupts registered");
        Ok(())
    }

    /// Stop interrupt delivery and give the pins back
    pub async fn release(mut self) {
        for (name, pin) in [("hook", &mut self.hook), ("dial", &mut self.dial)] {
            if let Err(e) = pin.clear_async_interrupt() {
                warn!(line = name, error = %e, "failed to clear interrupt");
            }
        }
        info!("GPIO lines released");
    }
}
