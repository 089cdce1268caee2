//! PTT output lines.
//!
//! Every line is an `embedded_hal` [`OutputPin`] where high means "transmit".
//! The controller is the only owner of these; capture threads never touch a pin.

use std::convert::Infallible;
use std::path::Path;

use embedded_hal::digital::{ErrorType, OutputPin};
use gpio_cdev::{Chip, LineHandle, LineRequestFlags};

use crate::config::{ChannelConfig, GpioBackend, GpioConfig};
use crate::error::HardwareError;

const CONSUMER: &str = "vox_relay";

/// Physical level for a logical key state.
#[inline]
fn physical_level(keyed: bool, active_low: bool) -> u8 {
    u8::from(keyed != active_low)
}

/// One line of a GPIO character device, addressed by its offset on the chip.
pub struct CdevLine {
    handle: LineHandle,
    offset: u32,
    active_low: bool,
}

impl CdevLine {
    /// Request `offset` on `chip` as an output, driven to the released level.
    pub fn open(chip: &Path, offset: u32, active_low: bool) -> Result<Self, HardwareError> {
        let mut device = Chip::new(chip).map_err(|source| HardwareError::Chip {
            path: chip.to_path_buf(),
            source,
        })?;
        let handle = device
            .get_line(offset)
            .and_then(|line| {
                line.request(
                    LineRequestFlags::OUTPUT,
                    physical_level(false, active_low),
                    CONSUMER,
                )
            })
            .map_err(|source| HardwareError::Line {
                pin: offset,
                source,
            })?;
        Ok(Self {
            handle,
            offset,
            active_low,
        })
    }

    fn write(&mut self, keyed: bool) -> Result<(), HardwareError> {
        self.handle
            .set_value(physical_level(keyed, self.active_low))
            .map_err(|source| HardwareError::Line {
                pin: self.offset,
                source,
            })
    }
}

impl ErrorType for CdevLine {
    type Error = HardwareError;
}

impl OutputPin for CdevLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

/// Logs instead of touching hardware. Useful on a bench without radios wired up.
pub struct DryRunPin {
    pin: u32,
    level: bool,
}

impl DryRunPin {
    pub fn new(pin: u32) -> Self {
        Self { pin, level: false }
    }

    pub fn level(&self) -> bool {
        self.level
    }

    fn write(&mut self, high: bool) {
        if self.level != high {
            log::info!("[dry-run] GPIO {} -> {}", self.pin, if high { "HIGH" } else { "LOW" });
        }
        self.level = high;
    }
}

impl ErrorType for DryRunPin {
    type Error = Infallible;
}

impl OutputPin for DryRunPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true);
        Ok(())
    }
}

/// The PTT line of one radio, whichever backend is configured.
pub enum PttPin {
    Cdev(CdevLine),
    DryRun(DryRunPin),
}

impl ErrorType for PttPin {
    type Error = HardwareError;
}

impl OutputPin for PttPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        match self {
            PttPin::Cdev(line) => line.set_low(),
            PttPin::DryRun(pin) => pin.set_low().map_err(|never| match never {}),
        }
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        match self {
            PttPin::Cdev(line) => line.set_high(),
            PttPin::DryRun(pin) => pin.set_high().map_err(|never| match never {}),
        }
    }
}

/// Open the PTT line for one radio according to the configured backend.
pub fn open_ptt(gpio: &GpioConfig, channel: &ChannelConfig) -> Result<PttPin, HardwareError> {
    match gpio.backend {
        GpioBackend::Cdev => Ok(PttPin::Cdev(CdevLine::open(
            &gpio.chip,
            channel.ptt_pin,
            channel.ptt_active_low,
        )?)),
        GpioBackend::DryRun => Ok(PttPin::DryRun(DryRunPin::new(channel.ptt_pin))),
    }
}
