//! Volume controller state machine.
//!
//! Owns the logical state — per-channel levels and mutes, master scale,
//! global mute — and re-serializes all of it onto the potentiometer chain
//! after every mutation. The chain never holds partial state: a chip
//! latches exactly one command per chip-select frame, so each wiper side
//! is pushed as its own full-length pass.

use amp_volume_proto::{CmdError, Side, StatusReport, UnitStatus};
use mcp42xxx::{BusError, ChainCommand, Channels, Mcp42xxx, PotBus};

use crate::levels::{LevelMap, MAX_LEVEL};

/// Chained dual potentiometers: three stereo pairs, six channels.
pub const UNITS: usize = 3;

/// Failure of a controller operation.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// Client-visible command failure (bad unit, level out of range).
    #[error(transparent)]
    Cmd(#[from] CmdError),
    /// Hardware fault while pushing state onto the chain.
    #[error("potentiometer bus: {0}")]
    Bus(#[from] BusError),
}

/// The single shared volume state and its route to the hardware.
///
/// Pot 0 of each chip carries the left channel of its stereo pair, pot 1
/// the right.
pub struct VolumeController<B: PotBus> {
    driver: Mcp42xxx<B>,
    map: LevelMap,
    levels: [(u8, u8); UNITS],
    mutes: [(bool, bool); UNITS],
    master: u8,
    muted: bool,
}

impl<B: PotBus> VolumeController<B> {
    /// # Panics
    /// Panics if the driver's chain length is not [`UNITS`].
    pub fn new(driver: Mcp42xxx<B>, map: LevelMap) -> Self {
        assert_eq!(
            driver.chain_len(),
            UNITS,
            "volume controller expects a {UNITS}-chip chain"
        );
        Self {
            driver,
            map,
            levels: [(0, 0); UNITS],
            mutes: [(false, false); UNITS],
            master: MAX_LEVEL,
            muted: false,
        }
    }

    /// Set one channel's level; `Side::Both` writes both sides identically.
    pub fn set_volume(&mut self, unit: usize, side: Side, level: u8) -> Result<(), VolumeError> {
        self.check_unit(unit)?;
        check_level("level", level)?;
        let entry = &mut self.levels[unit];
        match side {
            Side::Left => entry.0 = level,
            Side::Right => entry.1 = level,
            Side::Both => *entry = (level, level),
        }
        self.push_levels()
    }

    /// Current level of a channel.
    ///
    /// `Side::Both` reports the louder side, so an inc/dec cycle on a
    /// stereo pair steps from the higher reading instead of drifting the
    /// pair's balance.
    pub fn volume(&self, unit: usize, side: Side) -> Result<u8, VolumeError> {
        self.check_unit(unit)?;
        let (left, right) = self.levels[unit];
        Ok(match side {
            Side::Left => left,
            Side::Right => right,
            Side::Both => left.max(right),
        })
    }

    /// Mute or unmute one channel; `Side::Both` affects both sides.
    pub fn set_mute(&mut self, unit: usize, side: Side, on: bool) -> Result<(), VolumeError> {
        self.check_unit(unit)?;
        let entry = &mut self.mutes[unit];
        match side {
            Side::Left => entry.0 = on,
            Side::Right => entry.1 = on,
            Side::Both => *entry = (on, on),
        }
        self.push_levels()
    }

    pub fn set_master(&mut self, level: u8) -> Result<(), VolumeError> {
        check_level("master level", level)?;
        self.master = level;
        self.push_levels()
    }

    pub fn master(&self) -> u8 {
        self.master
    }

    /// Global mute: assert the shared hardware shutdown line.
    ///
    /// Whole-chain and instantaneous, and it leaves `levels`/`mutes`
    /// untouched so unmuting restores the previous state.
    pub fn mute_all(&mut self) -> Result<(), VolumeError> {
        self.muted = true;
        self.driver.shutdown_all()?;
        Ok(())
    }

    /// Release the global mute.
    ///
    /// Releasing the SHDN line also cancels per-chip software shutdowns,
    /// so the full state is re-pushed immediately — otherwise individually
    /// muted channels would come back audible.
    pub fn unmute_all(&mut self) -> Result<(), VolumeError> {
        self.muted = false;
        self.driver.unshutdown_all()?;
        self.push_levels()
    }

    /// Zero every level, clear all mutes, restore the master scale and
    /// bring the hardware to a known state.
    pub fn reset(&mut self) -> Result<(), VolumeError> {
        self.levels = [(0, 0); UNITS];
        self.mutes = [(false, false); UNITS];
        self.master = MAX_LEVEL;
        self.muted = false;
        self.driver.unshutdown_all()?;
        self.driver.reset_all()?;
        self.push_levels()
    }

    /// Snapshot for the status wire format.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            units: (0..UNITS)
                .map(|unit| UnitStatus {
                    left: self.levels[unit].0,
                    right: self.levels[unit].1,
                    mute_left: self.mutes[unit].0,
                    mute_right: self.mutes[unit].1,
                })
                .collect(),
            master: self.master,
            muted: self.muted,
        }
    }

    fn check_unit(&self, unit: usize) -> Result<(), VolumeError> {
        if unit >= UNITS {
            return Err(CmdError::OutOfRange(format!(
                "unit {unit} outside 0-{}",
                UNITS - 1
            ))
            .into());
        }
        Ok(())
    }

    /// Re-serialize the full logical state onto the chain: one pass per
    /// wiper side. Muted channels are sent as genuine software shutdown
    /// commands, not as zero wiper positions.
    fn push_levels(&mut self) -> Result<(), VolumeError> {
        let left: Vec<ChainCommand> = (0..UNITS)
            .map(|unit| self.side_command(unit, Channels::Pot0))
            .collect();
        self.driver.send_chain(&left)?;

        let right: Vec<ChainCommand> = (0..UNITS)
            .map(|unit| self.side_command(unit, Channels::Pot1))
            .collect();
        self.driver.send_chain(&right)?;
        Ok(())
    }

    fn side_command(&self, unit: usize, pot: Channels) -> ChainCommand {
        let (level, muted) = match pot {
            Channels::Pot0 => (self.levels[unit].0, self.mutes[unit].0),
            _ => (self.levels[unit].1, self.mutes[unit].1),
        };
        if muted {
            ChainCommand::Shutdown { channels: pot }
        } else {
            ChainCommand::Write {
                channels: pot,
                value: self.map.wiper(level, self.master),
            }
        }
    }
}

fn check_level(what: &str, level: u8) -> Result<(), VolumeError> {
    if level > MAX_LEVEL {
        return Err(CmdError::OutOfRange(format!("{what} {level} outside 0-{MAX_LEVEL}")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testbus::{BusOp, test_controller};

    // command bytes for the two wiper sides
    const WRITE_P0: u8 = 0b0001_0001;
    const WRITE_P1: u8 = 0b0001_0010;
    const SHDN_P0: u8 = 0b0010_0001;

    /// Extract the SPI payloads of the recorded ops, oldest first.
    fn writes(ops: &[BusOp]) -> Vec<Vec<u8>> {
        ops.iter()
            .filter_map(|op| match op {
                BusOp::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn set_volume_round_trips_every_level() {
        let (mut vc, _ops) = test_controller();
        for level in 0..=MAX_LEVEL {
            vc.set_volume(1, Side::Left, level).unwrap();
            assert_eq!(vc.volume(1, Side::Left).unwrap(), level);
        }
    }

    #[test]
    fn set_volume_rejects_bad_unit_and_level() {
        let (mut vc, _ops) = test_controller();
        assert!(matches!(
            vc.set_volume(3, Side::Left, 10),
            Err(VolumeError::Cmd(CmdError::OutOfRange(_)))
        ));
        assert!(matches!(
            vc.set_volume(0, Side::Left, 100),
            Err(VolumeError::Cmd(CmdError::OutOfRange(_)))
        ));
    }

    #[test]
    fn both_sides_write_identically_and_read_the_louder_side() {
        let (mut vc, _ops) = test_controller();
        vc.set_volume(0, Side::Left, 30).unwrap();
        vc.set_volume(0, Side::Right, 60).unwrap();
        assert_eq!(vc.volume(0, Side::Both).unwrap(), 60);

        vc.set_volume(0, Side::Both, 45).unwrap();
        assert_eq!(vc.volume(0, Side::Left).unwrap(), 45);
        assert_eq!(vc.volume(0, Side::Right).unwrap(), 45);
    }

    #[test]
    fn every_mutation_pushes_the_full_chain_twice() {
        let (mut vc, ops) = test_controller();
        vc.set_volume(0, Side::Left, 50).unwrap();

        let recorded = ops.lock().unwrap();
        let passes = writes(&recorded);
        assert_eq!(passes.len(), 2);
        // each pass carries a 2-byte frame for all three chips
        assert_eq!(passes[0].len(), 6);
        assert_eq!(passes[1].len(), 6);
        // left pass: chip 0 is framed last; 50 maps through the log table
        let map = LevelMap::new();
        assert_eq!(&passes[0][4..], &[WRITE_P0, map.wiper(50, MAX_LEVEL)]);
        // right pass leaves chip 0's pot 1 at zero
        assert_eq!(&passes[1][4..], &[WRITE_P1, 0]);
    }

    #[test]
    fn repeating_a_mutation_repeats_identical_bus_output() {
        let (mut vc, ops) = test_controller();
        vc.set_volume(2, Side::Both, 70).unwrap();
        let first: Vec<BusOp> = ops.lock().unwrap().drain(..).collect();

        vc.set_volume(2, Side::Both, 70).unwrap();
        let second: Vec<BusOp> = ops.lock().unwrap().drain(..).collect();

        assert_eq!(first, second);
        assert_eq!(vc.volume(2, Side::Both).unwrap(), 70);
    }

    #[test]
    fn muted_channel_is_sent_as_software_shutdown() {
        let (mut vc, ops) = test_controller();
        vc.set_mute(0, Side::Left, true).unwrap();

        let recorded = ops.lock().unwrap();
        let passes = writes(&recorded);
        assert_eq!(&passes[0][4..], &[SHDN_P0, 0x00]);
    }

    #[test]
    fn level_set_while_muted_survives_the_unmute() {
        let (mut vc, ops) = test_controller();
        vc.set_mute(0, Side::Left, true).unwrap();
        vc.set_volume(0, Side::Left, 10).unwrap();
        vc.set_mute(0, Side::Left, false).unwrap();

        let recorded = ops.lock().unwrap();
        let passes = writes(&recorded);
        // final left pass restores the mapped level, not zero or shutdown
        let map = LevelMap::new();
        let last_left = &passes[passes.len() - 2];
        assert_eq!(&last_left[4..], &[WRITE_P0, map.wiper(10, MAX_LEVEL)]);
    }

    #[test]
    fn global_mute_only_drives_the_shutdown_line() {
        let (mut vc, ops) = test_controller();
        ops.lock().unwrap().clear();
        vc.mute_all().unwrap();
        assert_eq!(*ops.lock().unwrap(), vec![BusOp::Shdn(true)]);
        assert!(vc.status().muted);
    }

    #[test]
    fn unmute_repushes_individually_muted_channels() {
        let (mut vc, ops) = test_controller();
        vc.set_mute(0, Side::Left, true).unwrap();
        vc.mute_all().unwrap();
        ops.lock().unwrap().clear();

        vc.unmute_all().unwrap();

        let recorded = ops.lock().unwrap();
        assert_eq!(recorded[0], BusOp::Shdn(false));
        // the re-push must re-assert channel 0's software shutdown
        let passes = writes(&recorded);
        assert_eq!(passes.len(), 2);
        assert_eq!(&passes[0][4..], &[SHDN_P0, 0x00]);
        assert!(!vc.status().muted);
    }

    #[test]
    fn master_scales_before_the_table_lookup() {
        let (mut vc, ops) = test_controller();
        vc.set_volume(0, Side::Left, 10).unwrap();
        vc.set_master(50).unwrap();

        let recorded = ops.lock().unwrap();
        let passes = writes(&recorded);
        let map = LevelMap::new();
        // 10 * 50 / 99 truncates to table index 5
        assert_eq!(&passes[passes.len() - 2][4..], &[WRITE_P0, map.wiper(5, MAX_LEVEL)]);
    }

    #[test]
    fn reset_restores_the_power_on_state() {
        let (mut vc, ops) = test_controller();
        vc.set_volume(1, Side::Both, 80).unwrap();
        vc.set_mute(2, Side::Left, true).unwrap();
        vc.set_master(40).unwrap();
        vc.mute_all().unwrap();
        ops.lock().unwrap().clear();

        vc.reset().unwrap();

        let status = vc.status();
        assert_eq!(status.master, MAX_LEVEL);
        assert!(!status.muted);
        for unit in status.units {
            assert_eq!((unit.left, unit.right), (0, 0));
            assert!(!unit.mute_left && !unit.mute_right);
        }

        let recorded = ops.lock().unwrap();
        // shutdown released, reset pulsed, then the full re-push
        assert_eq!(recorded[0], BusOp::Shdn(false));
        assert_eq!(recorded[1], BusOp::Rs(true));
        assert_eq!(recorded[2], BusOp::Rs(false));
        assert_eq!(writes(&recorded).len(), 2);
    }

    #[test]
    fn fresh_controller_status_matches_the_wire_contract() {
        let (vc, _ops) = test_controller();
        assert_eq!(
            vc.status().to_string(),
            "0: (0,0,0,0); 1: (0,0,0,0); 2: (0,0,0,0); Master: 99 Mute: 0"
        );
    }
}
