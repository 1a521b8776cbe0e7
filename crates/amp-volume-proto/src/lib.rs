//! Shared protocol primitives for `volumed` and `volumectl`.
//!
//! The protocol is plain ASCII: one command per TCP line or UDP datagram,
//! whitespace-separated tokens, the first token naming the command. Replies
//! are a single line, `OK <status>` on success or `ERROR <message>` on
//! failure. The status string is a stable wire contract:
//!
//! ```text
//! 0: (50,0,0,0); 1: (0,0,0,0); 2: (0,0,0,0); Master: 99 Mute: 0
//! ```
//!
//! one `(<L>,<R>,<muteL>,<muteR>)` clause per potentiometer unit in
//! ascending index order, booleans rendered as `0`/`1`.

use std::fmt;

/// Highest volume level of a channel or the master scale.
pub const MAX_LEVEL: u8 = 99;

/// Success reply prefix.
pub const OK_PREFIX: &str = "OK ";
/// Failure reply prefix.
pub const ERROR_PREFIX: &str = "ERROR ";
/// A TCP line starting with this token requests a disconnect.
pub const DISCONNECT_TOKEN: &str = "byebye";
/// Acknowledgement sent before honouring a disconnect request.
pub const DISCONNECT_REPLY: &str = "CYA";

/// Command failure taxonomy, shared by parsing and execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CmdError {
    /// Input contained no command token at all.
    #[error("empty command")]
    Empty,
    #[error("no such command: {0}")]
    UnknownCommand(String),
    #[error("bad channel: {0}")]
    BadChannel(String),
    #[error("wrong amount of args")]
    WrongArity { cmd: &'static str, got: usize },
    #[error("bad argument: {0}")]
    BadArgument(String),
    /// Numeric argument outside its valid domain.
    #[error("out of range: {0}")]
    OutOfRange(String),
}

/// Which wiper side of a stereo unit a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    /// Both sides at once (`F`, `CENSUB`, `R` channel tokens).
    Both,
}

/// Logical channel selector: potentiometer unit index plus wiper side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub unit: usize,
    pub side: Side,
}

impl Channel {
    /// Map a channel token to unit and side. Tokens are case-insensitive:
    /// `FL`/`FR`/`F` address unit 0, `CEN`/`SUB`/`CENSUB` unit 1,
    /// `RL`/`RR`/`R` unit 2.
    pub fn from_token(token: &str) -> Result<Self, CmdError> {
        let (unit, side) = match token.to_ascii_uppercase().as_str() {
            "FL" => (0, Side::Left),
            "FR" => (0, Side::Right),
            "F" => (0, Side::Both),
            "CEN" => (1, Side::Left),
            "SUB" => (1, Side::Right),
            "CENSUB" => (1, Side::Both),
            "RL" => (2, Side::Left),
            "RR" => (2, Side::Right),
            "R" => (2, Side::Both),
            _ => return Err(CmdError::BadChannel(token.to_string())),
        };
        Ok(Self { unit, side })
    }
}

/// One parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Set { channel: Channel, level: u8 },
    SetMaster { level: u8 },
    Inc { channel: Channel, step: u8 },
    Dec { channel: Channel, step: u8 },
    IncMaster { step: u8 },
    DecMaster { step: u8 },
    /// Global mute (hardware shutdown line).
    Mute { on: bool },
    MuteChan { channel: Channel, on: bool },
    Reset,
    Status,
}

impl Command {
    /// Parse one command line (already stripped of its line terminator).
    ///
    /// Empty or all-whitespace input yields [`CmdError::Empty`] so each
    /// transport can apply its own empty-input semantics first.
    pub fn parse(line: &str) -> Result<Self, CmdError> {
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            return Err(CmdError::Empty);
        };
        let args: Vec<&str> = tokens.collect();

        match name.to_ascii_lowercase().as_str() {
            "set" => {
                expect_args("set", &args, 2, 2)?;
                Ok(Command::Set {
                    channel: Channel::from_token(args[0])?,
                    level: level_arg(args[1])?,
                })
            }
            "setmaster" => {
                expect_args("setmaster", &args, 1, 1)?;
                Ok(Command::SetMaster {
                    level: level_arg(args[0])?,
                })
            }
            "inc" => {
                expect_args("inc", &args, 1, 2)?;
                Ok(Command::Inc {
                    channel: Channel::from_token(args[0])?,
                    step: step_arg(args.get(1))?,
                })
            }
            "dec" => {
                expect_args("dec", &args, 1, 2)?;
                Ok(Command::Dec {
                    channel: Channel::from_token(args[0])?,
                    step: step_arg(args.get(1))?,
                })
            }
            "incmaster" => {
                expect_args("incmaster", &args, 0, 1)?;
                Ok(Command::IncMaster {
                    step: step_arg(args.first())?,
                })
            }
            "decmaster" => {
                expect_args("decmaster", &args, 0, 1)?;
                Ok(Command::DecMaster {
                    step: step_arg(args.first())?,
                })
            }
            "mute" => {
                expect_args("mute", &args, 1, 1)?;
                Ok(Command::Mute {
                    on: bool_arg(args[0])?,
                })
            }
            "mutechan" => {
                expect_args("mutechan", &args, 2, 2)?;
                Ok(Command::MuteChan {
                    channel: Channel::from_token(args[0])?,
                    on: bool_arg(args[1])?,
                })
            }
            "reset" => {
                expect_args("reset", &args, 0, 0)?;
                Ok(Command::Reset)
            }
            "status" => {
                expect_args("status", &args, 0, 0)?;
                Ok(Command::Status)
            }
            _ => Err(CmdError::UnknownCommand(name.to_string())),
        }
    }
}

fn expect_args(cmd: &'static str, args: &[&str], min: usize, max: usize) -> Result<(), CmdError> {
    if args.len() < min || args.len() > max {
        return Err(CmdError::WrongArity {
            cmd,
            got: args.len(),
        });
    }
    Ok(())
}

fn level_arg(raw: &str) -> Result<u8, CmdError> {
    let value: i64 = raw
        .parse()
        .map_err(|_| CmdError::BadArgument(format!("expected a number, got '{raw}'")))?;
    if !(0..=i64::from(MAX_LEVEL)).contains(&value) {
        return Err(CmdError::OutOfRange(format!(
            "level {value} outside 0-{MAX_LEVEL}"
        )));
    }
    Ok(value as u8)
}

fn step_arg(raw: Option<&&str>) -> Result<u8, CmdError> {
    let Some(raw) = raw else {
        return Ok(1);
    };
    let value: i64 = raw
        .parse()
        .map_err(|_| CmdError::BadArgument(format!("expected a number, got '{raw}'")))?;
    if !(0..=i64::from(MAX_LEVEL)).contains(&value) {
        return Err(CmdError::OutOfRange(format!(
            "step {value} outside 0-{MAX_LEVEL}"
        )));
    }
    Ok(value as u8)
}

fn bool_arg(raw: &str) -> Result<bool, CmdError> {
    let value: i64 = raw
        .parse()
        .map_err(|_| CmdError::BadArgument(format!("expected 0 or 1, got '{raw}'")))?;
    Ok(value != 0)
}

/// Per-unit slice of the status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitStatus {
    pub left: u8,
    pub right: u8,
    pub mute_left: bool,
    pub mute_right: bool,
}

/// Snapshot of the whole controller, rendered in the stable wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// One entry per potentiometer unit, ascending chain index.
    pub units: Vec<UnitStatus>,
    pub master: u8,
    pub muted: bool,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, unit) in self.units.iter().enumerate() {
            write!(
                f,
                "{index}: ({},{},{},{}); ",
                unit.left,
                unit.right,
                u8::from(unit.mute_left),
                u8::from(unit.mute_right)
            )?;
        }
        write!(f, "Master: {} Mute: {}", self.master, u8::from(self.muted))
    }
}

/// Render a success reply line, newline-terminated.
pub fn format_ok(status: &StatusReport) -> String {
    format!("{OK_PREFIX}{status}\n")
}

/// Render a failure reply line, newline-terminated.
pub fn format_error(err: &CmdError) -> String {
    format!("{ERROR_PREFIX}{err}\n")
}
