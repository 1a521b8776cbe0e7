//! Raspberry Pi backend: SPI0 for data, three GPIO lines for control.

use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::{BusError, PotBus};

/// BCM pin assignments for the chain's control lines.
#[derive(Debug, Clone, Copy)]
pub struct PotPins {
    /// Manual chip-select line.
    pub cs: u8,
    /// Shared active-low shutdown line.
    pub shdn: u8,
    /// Shared active-low reset line.
    pub rs: u8,
}

/// MCP42XXX chain wired to the Pi's SPI0 bus.
///
/// Chip-select is driven manually through a GPIO pin so a whole chain
/// refresh stays framed under one assertion; the hardware CE lines go
/// unused. All three control lines idle high (deasserted).
pub struct SpiPotBus {
    spi: Spi,
    clock_hz: u32,
    cs: OutputPin,
    shdn: OutputPin,
    rs: OutputPin,
}

impl SpiPotBus {
    /// Open SPI0 at `clock_hz` and claim the control pins.
    pub fn open(clock_hz: u32, pins: PotPins) -> Result<Self, BusError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, clock_hz, Mode::Mode0)
            .map_err(|e| BusError::Spi(e.to_string()))?;
        let gpio = Gpio::new().map_err(|e| BusError::Gpio(e.to_string()))?;
        let cs = gpio
            .get(pins.cs)
            .map_err(|e| BusError::Gpio(format!("cs pin {}: {e}", pins.cs)))?
            .into_output_high();
        let shdn = gpio
            .get(pins.shdn)
            .map_err(|e| BusError::Gpio(format!("shdn pin {}: {e}", pins.shdn)))?
            .into_output_high();
        let rs = gpio
            .get(pins.rs)
            .map_err(|e| BusError::Gpio(format!("rs pin {}: {e}", pins.rs)))?
            .into_output_high();
        Ok(Self {
            spi,
            clock_hz,
            cs,
            shdn,
            rs,
        })
    }
}

impl PotBus for SpiPotBus {
    fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    fn chip_select(&mut self, active: bool) -> Result<(), BusError> {
        if active {
            self.cs.set_low();
        } else {
            self.cs.set_high();
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        let written = self
            .spi
            .write(bytes)
            .map_err(|e| BusError::Spi(e.to_string()))?;
        if written != bytes.len() {
            return Err(BusError::Spi(format!(
                "short write: {written} of {} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }

    fn shutdown_line(&mut self, active: bool) -> Result<(), BusError> {
        if active {
            self.shdn.set_low();
        } else {
            self.shdn.set_high();
        }
        Ok(())
    }

    fn reset_line(&mut self, active: bool) -> Result<(), BusError> {
        if active {
            self.rs.set_low();
        } else {
            self.rs.set_high();
        }
        Ok(())
    }
}
