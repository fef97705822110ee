use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::scpi::IDN;
use crate::Error;

/// Response to an identification query, split into its four positional fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial_no: String,
    pub firmware: String,
}

impl Identity {
    /// Parse a `manufacturer,model,serial,firmware` response.
    ///
    /// Whitespace around each field is removed. The firmware field keeps any further commas.
    pub fn parse(response: &str) -> crate::Result<Self> {
        let fields: Vec<&str> = response.trim().splitn(4, ',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(Error::unexpected_response(IDN, response));
        }
        Ok(Identity {
            manufacturer: fields[0].to_string(),
            model: fields[1].to_string(),
            serial_no: fields[2].to_string(),
            firmware: fields[3].to_string(),
        })
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.manufacturer, self.model, self.serial_no, self.firmware
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_idn() {
        let idn = Identity::parse("HEWLETT-PACKARD,E3631A,0,2.1-5.0-1.0\n").unwrap();
        assert_eq!(idn.manufacturer, "HEWLETT-PACKARD");
        assert_eq!(idn.model, "E3631A");
        assert_eq!(idn.serial_no, "0");
        assert_eq!(idn.firmware, "2.1-5.0-1.0");
        assert_eq!(idn.to_string(), "HEWLETT-PACKARD,E3631A,0,2.1-5.0-1.0");
    }

    #[test]
    fn parse_idn_with_padding() {
        let idn = Identity::parse(" TEKTRONIX , AWG70002B , B010123 , FV:6.0.0242.0 ").unwrap();
        assert_eq!(idn.model, "AWG70002B");
        assert_eq!(idn.serial_no, "B010123");
        assert_eq!(idn.firmware, "FV:6.0.0242.0");
    }

    #[test]
    fn firmware_keeps_extra_commas() {
        let idn = Identity::parse("Keysight,E3644A,MY1234,1.0,rev B").unwrap();
        assert_eq!(idn.firmware, "1.0,rev B");
    }

    #[test]
    fn reject_short_response() {
        let err = Identity::parse("Keysight,E3644A").unwrap_err();
        assert_eq!(err, Error::unexpected_response("*IDN?", "Keysight,E3644A"));
    }
}
