//! Driver for a daisy chain of MCP42XXX dual digital potentiometers.
//!
//! The MCP42XXX speaks a simple write-only serial protocol: chip-select is
//! pulled low, then a 2-byte frame (command byte, data byte) is clocked in
//! per chip, and every chip executes the frame it holds when chip-select is
//! released. Chained chips shift frames through to their neighbour, so the
//! frame transmitted first ends up at the chip furthest from the controller.
//!
//! Command byte layout (`0bXXCCXXPP`):
//! - `PP` selects the wiper: `01` = pot 0, `10` = pot 1, `11` = both,
//!   `00` = neither (dummy).
//! - `CC` selects the action: `01` = write the data byte, `10` = software
//!   shutdown of the selected pots (data ignored), `00`/`11` = NOP.
//!
//! Two shared active-low lines sit outside the data path: `SHDN` puts every
//! chip in the chain into shutdown at once, `RS` resets them (minimum
//! 150 ns low pulse).
//!
//! This crate knows nothing about volume semantics; it encodes commands,
//! keeps chain framing correct, and drives the control lines through the
//! [`PotBus`] seam.

use std::time::Duration;

#[cfg(feature = "hardware")]
mod spi;

#[cfg(feature = "hardware")]
pub use spi::{PotPins, SpiPotBus};

const CMD_WRITE: u8 = 0b0001_0000;
const CMD_SHUTDOWN: u8 = 0b0010_0000;
const CMD_NOP: u8 = 0b0011_0000;

/// Bus clocks to wait after the last frame before releasing chip-select.
///
/// Empirically ~3 ms was needed at a 40 kHz clock before the last command
/// reliably latched, which works out to roughly 128 clocks of margin; the
/// wait scales with the configured clock instead of being hard-coded.
const SETTLE_CLOCKS: u64 = 128;

/// Minimum low pulse for the shared reset line is 150 ns per the datasheet.
const RESET_PULSE: Duration = Duration::from_nanos(200);

/// Transport failure reported by a [`PotBus`] implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("spi write failed: {0}")]
    Spi(String),
    #[error("control line failed: {0}")]
    Gpio(String),
}

/// Wiper selection bits of the command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    /// Dummy selection; the command affects neither wiper.
    None,
    Pot0,
    Pot1,
    Both,
}

impl Channels {
    /// The `PP` bits of the command byte.
    pub fn bits(self) -> u8 {
        match self {
            Channels::None => 0b00,
            Channels::Pot0 => 0b01,
            Channels::Pot1 => 0b10,
            Channels::Both => 0b11,
        }
    }
}

/// One command for one chip position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainCommand {
    /// Write a wiper value to the selected pot(s).
    Write { channels: Channels, value: u8 },
    /// Put the selected pot(s) into software shutdown.
    Shutdown { channels: Channels },
    /// Placeholder for a chip that must keep its current state.
    Nop,
}

impl ChainCommand {
    /// Encode as the 2-byte wire frame `[command, data]`.
    pub fn encode(self) -> [u8; 2] {
        match self {
            ChainCommand::Write { channels, value } => [CMD_WRITE | channels.bits(), value],
            ChainCommand::Shutdown { channels } => [CMD_SHUTDOWN | channels.bits(), 0x00],
            ChainCommand::Nop => [CMD_NOP, 0x00],
        }
    }
}

/// Hardware seam for the chain: a write-only serial bus plus the three
/// shared control lines.
///
/// `active` means "asserted": the implementation is responsible for the
/// line polarity (chip-select, shutdown and reset are all active-low on
/// the MCP42XXX).
pub trait PotBus {
    /// Serial clock rate in Hz; used to derive the settle delay.
    fn clock_hz(&self) -> u32;
    /// Drive the chip-select line.
    fn chip_select(&mut self, active: bool) -> Result<(), BusError>;
    /// Clock bytes onto the bus.
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError>;
    /// Drive the shared shutdown line.
    fn shutdown_line(&mut self, active: bool) -> Result<(), BusError>;
    /// Drive the shared reset line.
    fn reset_line(&mut self, active: bool) -> Result<(), BusError>;
}

/// A fixed-length daisy chain of MCP42XXX chips on one bus.
pub struct Mcp42xxx<B: PotBus> {
    bus: B,
    chain_len: usize,
    settle: Duration,
}

impl<B: PotBus> Mcp42xxx<B> {
    /// Wrap a bus driving a chain of `chain_len` chips.
    ///
    /// # Panics
    /// Panics if `chain_len` is zero.
    pub fn new(bus: B, chain_len: usize) -> Self {
        assert!(chain_len > 0, "chain length must be at least 1");
        let settle = settle_delay(bus.clock_hz());
        Self {
            bus,
            chain_len,
            settle,
        }
    }

    /// Number of chips in the chain.
    pub fn chain_len(&self) -> usize {
        self.chain_len
    }

    /// Transmit one command per chip under a single chip-select frame.
    ///
    /// `commands[0]` addresses the chip nearest the controller. Commands
    /// latch in daisy order on chip-select release, so frames go out in
    /// reverse chip order. Chips that must not change state need an
    /// explicit [`ChainCommand::Nop`]; partial updates are not possible.
    ///
    /// # Panics
    /// Panics if `commands.len()` differs from the chain length. That is a
    /// caller bug which would silently corrupt chip state if truncated or
    /// padded here.
    pub fn send_chain(&mut self, commands: &[ChainCommand]) -> Result<(), BusError> {
        assert_eq!(
            commands.len(),
            self.chain_len,
            "one chain command per chip is required"
        );

        let mut frames = Vec::with_capacity(self.chain_len * 2);
        for command in commands.iter().rev() {
            frames.extend_from_slice(&command.encode());
        }

        self.bus.chip_select(true)?;
        let sent = self.bus.write(&frames);
        if sent.is_ok() {
            // Let the bus drain before the release edge latches the frames.
            std::thread::sleep(self.settle);
        }
        let released = self.bus.chip_select(false);
        sent?;
        released
    }

    /// Send a command to a single chip, NOP-padding the rest of the chain.
    ///
    /// # Panics
    /// Panics if `index` addresses a chip outside the chain.
    pub fn set_one(&mut self, index: usize, command: ChainCommand) -> Result<(), BusError> {
        assert!(
            index < self.chain_len,
            "chip index {index} outside chain of {}",
            self.chain_len
        );
        let mut commands = vec![ChainCommand::Nop; self.chain_len];
        commands[index] = command;
        self.send_chain(&commands)
    }

    /// Pulse the shared reset line, resetting every chip in the chain.
    pub fn reset_all(&mut self) -> Result<(), BusError> {
        self.bus.reset_line(true)?;
        std::thread::sleep(RESET_PULSE);
        self.bus.reset_line(false)
    }

    /// Assert the shared shutdown line, silencing the whole chain at once.
    ///
    /// This is independent of any per-chip software shutdown commands.
    pub fn shutdown_all(&mut self) -> Result<(), BusError> {
        self.bus.shutdown_line(true)
    }

    /// Release the shared shutdown line.
    ///
    /// Note that this also wakes chips that were individually put into
    /// software shutdown; callers that care must re-send those commands.
    pub fn unshutdown_all(&mut self) -> Result<(), BusError> {
        self.bus.shutdown_line(false)
    }
}

fn settle_delay(clock_hz: u32) -> Duration {
    let hz = u64::from(clock_hz.max(1));
    Duration::from_nanos(SETTLE_CLOCKS * 1_000_000_000 / hz)
}
