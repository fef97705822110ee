/// This module implements `Address` which is used for parsing
/// address strings of the form "GPIB:7" or "IP:10.1.1.1"
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Highest primary address on a GPIB bus.
pub const GPIB_MAX_ADDRESS: u8 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    Gpib,
    Ip,
}

impl Display for AddressKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AddressKind::Gpib => f.write_str("GPIB"),
            AddressKind::Ip => f.write_str("IP"),
        }
    }
}

/// Represents a parsed user-facing address.
/// Each address maps to exactly one VISA resource string, see `Address::resource_name()`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    Gpib { id: u8 },
    Ip { host: String },
}

impl Address {
    /// Create a new `Address` by parsing the given address string.
    /// If the address uses an incorrect format, it will return `Err(Error::InvalidAddress)`.
    pub fn parse(addr: &str) -> crate::Result<Self> {
        let (kind, target) = addr
            .split_once(':')
            .ok_or_else(|| Error::invalid_address(addr, "expected `<KIND>:<TARGET>`"))?;
        let target = target.trim();
        if target.is_empty() {
            return Err(Error::invalid_address(addr, "missing target"));
        }

        match kind.trim().to_lowercase().as_str() {
            "gpib" => {
                // GPIB:7
                let id: u8 = target
                    .parse()
                    .map_err(|_| Error::invalid_address(addr, "GPIB address must be an integer"))?;
                if id > GPIB_MAX_ADDRESS {
                    return Err(Error::invalid_address(
                        addr,
                        format!("GPIB address must be within 0..={}", GPIB_MAX_ADDRESS),
                    ));
                }
                Ok(Address::Gpib { id })
            }
            "ip" => {
                // IP:10.1.1.1
                if target.chars().any(char::is_whitespace) {
                    return Err(Error::invalid_address(addr, "host must not contain whitespace"));
                }
                if target.contains(':') {
                    return Err(Error::invalid_address(addr, "host must not contain `:`"));
                }
                Ok(Address::Ip {
                    host: target.to_string(),
                })
            }
            _ => Err(Error::invalid_address(
                addr,
                format!("unsupported kind `{}`, expected GPIB or IP", kind),
            )),
        }
    }

    pub fn kind(&self) -> AddressKind {
        match self {
            Address::Gpib { .. } => AddressKind::Gpib,
            Address::Ip { .. } => AddressKind::Ip,
        }
    }

    pub fn target(&self) -> String {
        match self {
            Address::Gpib { id } => id.to_string(),
            Address::Ip { host } => host.clone(),
        }
    }

    /// The resource string handed to the VISA resource manager.
    pub fn resource_name(&self) -> String {
        match self {
            Address::Gpib { id } => format!("GPIB0::{}::INSTR", id),
            Address::Ip { host } => format!("TCPIP0::{}::inst0::INSTR", host),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_gpib() {
        let addr = Address::parse("GPIB:7").unwrap();
        assert_eq!(addr, Address::Gpib { id: 7 });
        assert_eq!(addr.kind(), AddressKind::Gpib);
        assert_eq!(addr.target(), "7");
        assert_eq!(addr.resource_name(), "GPIB0::7::INSTR");
        assert_eq!(addr.to_string(), "GPIB:7");

        let addr: Address = "gpib:30".parse().unwrap();
        assert_eq!(addr, Address::Gpib { id: 30 });
    }

    #[test]
    fn parse_ip() {
        let addr = Address::parse("IP:10.1.1.1").unwrap();
        assert_eq!(addr.kind(), AddressKind::Ip);
        assert_eq!(addr.target(), "10.1.1.1");
        assert_eq!(addr.resource_name(), "TCPIP0::10.1.1.1::inst0::INSTR");
        assert_eq!(addr.to_string(), "IP:10.1.1.1");

        let addr = Address::parse("ip:scope.lab.local").unwrap();
        assert_eq!(addr.resource_name(), "TCPIP0::scope.lab.local::inst0::INSTR");
    }

    #[test]
    fn reject_invalid() {
        for addr in &[
            "USB:1",
            "TCP:10.1.1.1",
            "GPIB",
            "GPIB:",
            "GPIB:seven",
            "GPIB:31",
            "GPIB:-1",
            "IP:",
            "IP:10.1.1.1 extra",
            "IP:10.1.1.1::5025::SOCKET",
            "IP:10.1.1.1:5025",
            "",
        ] {
            match Address::parse(addr) {
                Err(Error::InvalidAddress { address, .. }) => assert_eq!(&address, addr),
                _ => panic!("`{}` should be rejected", addr),
            }
        }
    }
}
