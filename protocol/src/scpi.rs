/// SCPI vocabulary of the supported instruments
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Standard identification query.
pub const IDN: &str = "*IDN?";

/// Models known to work with the `Awg` wrapper.
pub const SUPPORTED_AWG: &[&str] = &["AWG70002B", "AWG7082C"];

/// Models known to work with the `PowerSupply` wrapper.
pub const SUPPORTED_PS: &[&str] = &["E3631A", "E3644A"];

pub fn is_supported(supported: &[&str], model: &str) -> bool {
    supported.iter().any(|x| x.eq_ignore_ascii_case(model.trim()))
}

/// Power supply commands, rendered with `Display`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PsCommand {
    Output(bool),
    Channel(String),
    Voltage(f64),
    Current(f64),
}

impl Display for PsCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PsCommand::Output(true) => f.write_str("OUTP ON"),
            PsCommand::Output(false) => f.write_str("OUTP OFF"),
            PsCommand::Channel(ch) => write!(f, "INST {}", ch),
            PsCommand::Voltage(v) => write!(f, "VOLT {}", v),
            PsCommand::Current(a) => write!(f, "CURR {}", a),
        }
    }
}

/// A property of a power supply which can be read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Voltage,
    Current,
    Channel,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Voltage, Field::Current, Field::Channel];

    pub fn query(&self) -> &'static str {
        match self {
            Field::Voltage => "VOLT?",
            Field::Current => "CURR?",
            Field::Channel => "INST?",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Voltage => "voltage",
            Field::Current => "current",
            Field::Channel => "channel",
        }
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|x| x.name() == s)
            .ok_or_else(|| Error::UnknownField(s.to_string()))
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a numeric query response as sent back by the instrument, e.g. "+5.00000000E+00\n".
pub fn parse_number(command: &str, response: &str) -> crate::Result<f64> {
    response
        .trim()
        .parse()
        .map_err(|_| Error::unexpected_response(command, response))
}
