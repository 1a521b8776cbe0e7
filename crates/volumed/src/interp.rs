//! Command dispatch: one parsed command in, status report out.

use amp_volume_proto::{Command, StatusReport};
use mcp42xxx::PotBus;

use crate::levels::MAX_LEVEL;
use crate::volume::{VolumeController, VolumeError};

/// Seam between the transports and the volume controller.
pub trait CommandEngine {
    fn execute(&mut self, cmd: Command) -> Result<StatusReport, VolumeError>;
}

impl<B: PotBus> CommandEngine for VolumeController<B> {
    fn execute(&mut self, cmd: Command) -> Result<StatusReport, VolumeError> {
        dispatch(cmd, self)
    }
}

/// Apply one command to the controller and return the resulting status.
///
/// `inc`/`dec` clamp at the level bounds and are silent no-ops when already
/// there; `status` touches nothing. Every success carries the post-command
/// status so transports can reply uniformly.
pub fn dispatch<B: PotBus>(
    cmd: Command,
    vc: &mut VolumeController<B>,
) -> Result<StatusReport, VolumeError> {
    match cmd {
        Command::Set { channel, level } => vc.set_volume(channel.unit, channel.side, level)?,
        Command::SetMaster { level } => vc.set_master(level)?,
        Command::Inc { channel, step } => {
            let current = vc.volume(channel.unit, channel.side)?;
            let next = current.saturating_add(step).min(MAX_LEVEL);
            if next != current {
                vc.set_volume(channel.unit, channel.side, next)?;
            }
        }
        Command::Dec { channel, step } => {
            let current = vc.volume(channel.unit, channel.side)?;
            let next = current.saturating_sub(step);
            if next != current {
                vc.set_volume(channel.unit, channel.side, next)?;
            }
        }
        Command::IncMaster { step } => {
            let current = vc.master();
            let next = current.saturating_add(step).min(MAX_LEVEL);
            if next != current {
                vc.set_master(next)?;
            }
        }
        Command::DecMaster { step } => {
            let current = vc.master();
            let next = current.saturating_sub(step);
            if next != current {
                vc.set_master(next)?;
            }
        }
        Command::Mute { on } => {
            if on {
                vc.mute_all()?;
            } else {
                vc.unmute_all()?;
            }
        }
        Command::MuteChan { channel, on } => vc.set_mute(channel.unit, channel.side, on)?,
        Command::Reset => vc.reset()?,
        Command::Status => {}
    }
    Ok(vc.status())
}
