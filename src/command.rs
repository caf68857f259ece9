//! Motion commands and their wire encoding.
//!
//! Each command travels as a single ASCII byte with no framing:
//! `w` forward, `a` left, `d` right, `x` stop.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Discrete motion command delivered to the robot controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Forward,
    Left,
    Right,
    /// Fallback for every tick without a usable subject.
    #[default]
    Stop,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::Forward,
        Command::Left,
        Command::Right,
        Command::Stop,
    ];

    /// Wire byte for this command.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Forward => b'w',
            Self::Left => b'a',
            Self::Right => b'd',
            Self::Stop => b'x',
        }
    }

    /// Decode a wire byte. Unknown bytes are rejected rather than mapped to stop.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'w' => Ok(Self::Forward),
            b'a' => Ok(Self::Left),
            b'd' => Ok(Self::Right),
            b'x' => Ok(Self::Stop),
            other => Err(anyhow!("unknown command byte 0x{:02x}", other)),
        }
    }

    pub fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }

    fn index(self) -> usize {
        match self {
            Self::Forward => 0,
            Self::Left => 1,
            Self::Right => 2,
            Self::Stop => 3,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward => write!(f, "FORWARD"),
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
            Self::Stop => write!(f, "STOP"),
        }
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "forward" | "w" => Ok(Self::Forward),
            "left" | "a" => Ok(Self::Left),
            "right" | "d" => Ok(Self::Right),
            "stop" | "x" => Ok(Self::Stop),
            other => Err(anyhow!(
                "unknown command '{}': expected forward, left, right or stop",
                other
            )),
        }
    }
}

/// Per-command counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandCounts([u64; 4]);

impl CommandCounts {
    pub fn record(&mut self, command: Command) {
        self.0[command.index()] += 1;
    }

    pub fn get(&self, command: Command) -> u64 {
        self.0[command.index()]
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_bytes_match_wasd_layout() {
        assert_eq!(Command::Forward.as_byte(), b'w');
        assert_eq!(Command::Left.as_byte(), b'a');
        assert_eq!(Command::Right.as_byte(), b'd');
        assert_eq!(Command::Stop.as_byte(), b'x');
    }

    #[test]
    fn decodes_every_encoded_byte() {
        for command in Command::ALL {
            assert_eq!(Command::from_byte(command.as_byte()).unwrap(), command);
        }
    }

    #[test]
    fn rejects_unknown_bytes() {
        assert!(Command::from_byte(b's').is_err());
        assert!(Command::from_byte(0).is_err());
    }

    #[test]
    fn default_is_stop() {
        assert_eq!(Command::default(), Command::Stop);
        assert!(Command::default().is_stop());
    }

    #[test]
    fn parses_names_and_letters() {
        assert_eq!("FORWARD".parse::<Command>().unwrap(), Command::Forward);
        assert_eq!("a".parse::<Command>().unwrap(), Command::Left);
        assert_eq!(" right ".parse::<Command>().unwrap(), Command::Right);
        assert!("reverse".parse::<Command>().is_err());
    }

    #[test]
    fn counts_per_command() {
        let mut counts = CommandCounts::default();
        counts.record(Command::Forward);
        counts.record(Command::Forward);
        counts.record(Command::Stop);
        assert_eq!(counts.get(Command::Forward), 2);
        assert_eq!(counts.get(Command::Left), 0);
        assert_eq!(counts.get(Command::Stop), 1);
        assert_eq!(counts.total(), 3);
    }
}
