//! Programmable DC power supplies.
//!
//! Besides the output switch, a power supply exposes three properties: the selected output
//! channel, its voltage and its current limit. The wrapper keeps a cached copy of the
//! last value set or read for each of them in [`PsState`]. The device remains the source of
//! truth, so the cache may be stale if the front panel is used in between.
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::instrument::{Disconnect, Instrument, InstrumentOptions};
use crate::visa::{ResourceManager, Visa};
use labctl_protocol::scpi::{is_supported, parse_number, SUPPORTED_PS};
use labctl_protocol::{Address, Error, Field, Identity, PsCommand};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PsState {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub channel: Option<String>,
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "?".to_string(), |x| format!("{:?}", x))
}

impl Display for PsState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}V, {}A",
            self.channel.as_deref().unwrap_or("?"),
            fmt_value(self.voltage),
            fmt_value(self.current)
        )
    }
}

/// Result of [`PowerSupply::get`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    All(PsState),
    Voltage(f64),
    Current(f64),
    Channel(String),
}

impl Display for Reading {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reading::All(state) => Display::fmt(state, f),
            Reading::Voltage(x) | Reading::Current(x) => write!(f, "{:?}", x),
            Reading::Channel(x) => f.write_str(x),
        }
    }
}

fn check_finite(field: Field, value: Option<f64>) -> crate::Result<()> {
    match value {
        Some(x) if !x.is_finite() => Err(Error::invalid_value(field, x)),
        _ => Ok(()),
    }
}

pub struct PowerSupply<R: ResourceManager = Visa> {
    instrument: Instrument<R>,
    state: PsState,
}

impl<R: ResourceManager> PowerSupply<R> {
    pub fn new(rm: R) -> Self {
        Self::from_instrument(Instrument::new(rm))
    }

    pub fn with_options(rm: R, options: InstrumentOptions) -> Self {
        Self::from_instrument(Instrument::with_options(rm, options))
    }

    pub fn with_address(rm: R, address: &str) -> crate::Result<Self> {
        Ok(Self::from_instrument(Instrument::with_address(rm, address)?))
    }

    pub fn from_instrument(instrument: Instrument<R>) -> Self {
        Self {
            instrument,
            state: PsState::default(),
        }
    }

    /// Connect to `address`. The cached values of a previously connected device are forgotten.
    pub fn connect(&mut self, address: &str) -> crate::Result<()> {
        self.state = PsState::default();
        self.instrument.connect(address)
    }

    pub fn disconnect(&mut self) -> crate::Result<Disconnect> {
        self.state = PsState::default();
        self.instrument.disconnect()
    }

    pub fn list(&self) -> crate::Result<Vec<String>> {
        self.instrument.list()
    }

    pub fn identify(&mut self) -> crate::Result<Identity> {
        self.instrument.identify()
    }

    /// Whether the connected model is one of the known power supply models.
    pub fn is_support(&mut self) -> crate::Result<bool> {
        let idn = self.identify()?;
        Ok(is_supported(SUPPORTED_PS, &idn.model))
    }

    /// Enable the output.
    pub fn on(&mut self) -> crate::Result<()> {
        self.send(PsCommand::Output(true))
    }

    /// Disable the output.
    pub fn off(&mut self) -> crate::Result<()> {
        self.send(PsCommand::Output(false))
    }

    pub fn is_output_on(&mut self) -> crate::Result<bool> {
        const QUERY: &str = "OUTP?";
        let response = self.instrument.query(QUERY)?;
        match response.trim().to_uppercase().as_str() {
            "1" | "ON" => Ok(true),
            "0" | "OFF" => Ok(false),
            _ => Err(Error::unexpected_response(QUERY, response)),
        }
    }

    /// Apply the given settings, leaving the others untouched.
    ///
    /// The channel is selected before voltage and current are programmed, so these apply to
    /// the new channel on multi-channel supplies.
    pub fn set(
        &mut self,
        voltage: Option<f64>,
        current: Option<f64>,
        channel: Option<&str>,
    ) -> crate::Result<()> {
        if !self.instrument.is_connected() {
            return Err(Error::NotConnected);
        }
        check_finite(Field::Voltage, voltage)?;
        check_finite(Field::Current, current)?;
        if let Some(channel) = channel {
            self.send(PsCommand::Channel(channel.to_string()))?;
            self.state.channel = Some(channel.to_string());
        }
        if let Some(voltage) = voltage {
            self.send(PsCommand::Voltage(voltage))?;
            self.state.voltage = Some(voltage);
        }
        if let Some(current) = current {
            self.send(PsCommand::Current(current))?;
            self.state.current = Some(current);
        }
        Ok(())
    }

    /// Read back one property by name (`voltage`, `current` or `channel`), or all of them if
    /// `field` is `None`.
    pub fn get(&mut self, field: Option<&str>) -> crate::Result<Reading> {
        match field {
            None => self.get_all().map(Reading::All),
            Some(name) => {
                let field: Field = name.parse()?;
                self.get_field(field)
            }
        }
    }

    pub fn get_field(&mut self, field: Field) -> crate::Result<Reading> {
        let query = field.query();
        let response = self.instrument.query(query)?;
        let ret = match field {
            Field::Voltage => {
                let voltage = parse_number(query, &response)?;
                self.state.voltage = Some(voltage);
                Reading::Voltage(voltage)
            }
            Field::Current => {
                let current = parse_number(query, &response)?;
                self.state.current = Some(current);
                Reading::Current(current)
            }
            Field::Channel => {
                let channel = response.trim().to_string();
                self.state.channel = Some(channel.clone());
                Reading::Channel(channel)
            }
        };
        Ok(ret)
    }

    /// Refresh voltage, current and channel from the device.
    pub fn get_all(&mut self) -> crate::Result<PsState> {
        for field in Field::ALL.iter() {
            self.get_field(*field)?;
        }
        Ok(self.state.clone())
    }

    /// Refresh all values and render them as `<channel>: <voltage>V, <current>A`.
    pub fn summary(&mut self) -> crate::Result<String> {
        Ok(self.get_all()?.to_string())
    }

    /// The cached values, without talking to the device.
    pub fn state(&self) -> &PsState {
        &self.state
    }

    pub fn address(&self) -> Option<&Address> {
        self.instrument.address()
    }

    pub fn status(&self) -> bool {
        self.instrument.status()
    }

    pub fn instrument(&mut self) -> &mut Instrument<R> {
        &mut self.instrument
    }

    fn send(&mut self, cmd: PsCommand) -> crate::Result<()> {
        self.instrument.write(&cmd.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visa::loopback::Loopback;

    const PS: &str = "GPIB0::7::INSTR";

    fn connected() -> (Loopback, PowerSupply<Loopback>) {
        let rm = Loopback::new().with_instrument(PS, "HEWLETT-PACKARD,E3631A,0,2.1-5.0-1.0");
        let ps = PowerSupply::with_address(rm.clone(), "GPIB:7").unwrap();
        (rm, ps)
    }

    #[test]
    fn set_then_get_all() {
        let (rm, mut ps) = connected();
        ps.set(Some(5.0), Some(1.0), Some("P25V")).unwrap();
        assert_eq!(rm.commands(PS), vec!["INST P25V", "VOLT 5", "CURR 1"]);

        let reading = ps.get(None).unwrap();
        assert_eq!(reading.to_string(), "P25V: 5.0V, 1.0A");
        assert_eq!(
            reading,
            Reading::All(PsState {
                voltage: Some(5.0),
                current: Some(1.0),
                channel: Some("P25V".to_string()),
            })
        );
        assert_eq!(
            &rm.commands(PS)[3..],
            &["VOLT?".to_string(), "CURR?".to_string(), "INST?".to_string()]
        );
    }

    #[test]
    fn set_leaves_unspecified_fields() {
        let (rm, mut ps) = connected();
        ps.set(Some(5.0), Some(1.0), Some("P25V")).unwrap();
        ps.set(Some(12.5), None, None).unwrap();
        assert_eq!(ps.state().voltage, Some(12.5));
        assert_eq!(ps.state().current, Some(1.0));
        assert_eq!(ps.state().channel.as_deref(), Some("P25V"));
        assert_eq!(rm.commands(PS).last().map(String::as_str), Some("VOLT 12.5"));

        ps.set(None, None, None).unwrap();
        assert_eq!(rm.commands(PS).len(), 4);
    }

    #[test]
    fn reject_non_finite_setpoints() {
        let (rm, mut ps) = connected();
        ps.set(Some(5.0), Some(1.0), Some("P25V")).unwrap();
        let before = ps.state().clone();
        let sent = rm.commands(PS).len();

        assert_eq!(
            ps.set(Some(f64::NAN), None, Some("P6V")).unwrap_err(),
            Error::invalid_value("voltage", "NaN")
        );
        assert_eq!(
            ps.set(None, Some(f64::INFINITY), None).unwrap_err(),
            Error::invalid_value("current", "inf")
        );
        assert!(ps.set(Some(f64::NEG_INFINITY), Some(1.0), None).is_err());
        assert_eq!(ps.state(), &before);
        assert_eq!(rm.commands(PS).len(), sent);
    }

    #[test]
    fn reconnect_clears_cache() {
        let rm = Loopback::new()
            .with_instrument(PS, "HEWLETT-PACKARD,E3631A,0,2.1-5.0-1.0")
            .with_instrument("GPIB0::8::INSTR", "Agilent Technologies,E3644A,0,1.4-5.0-1.0");
        let mut ps = PowerSupply::with_address(rm, "GPIB:7").unwrap();
        ps.set(Some(5.0), Some(1.0), Some("P25V")).unwrap();

        ps.connect("GPIB:8").unwrap();
        assert_eq!(ps.state(), &PsState::default());

        ps.set(Some(3.3), None, None).unwrap();
        ps.disconnect().unwrap();
        assert_eq!(ps.state(), &PsState::default());
    }

    #[test]
    fn summary() {
        let (_rm, mut ps) = connected();
        ps.set(Some(5.0), Some(1.0), Some("P25V")).unwrap();
        assert_eq!(ps.summary().unwrap(), "P25V: 5.0V, 1.0A");

        ps.disconnect().unwrap();
        assert_eq!(ps.summary().unwrap_err(), Error::NotConnected);
    }

    #[test]
    fn get_single_fields() {
        let (_rm, mut ps) = connected();
        ps.set(Some(3.3), Some(0.5), Some("P6V")).unwrap();
        assert_eq!(ps.get(Some("voltage")).unwrap(), Reading::Voltage(3.3));
        assert_eq!(ps.get(Some("current")).unwrap(), Reading::Current(0.5));
        assert_eq!(
            ps.get(Some("channel")).unwrap(),
            Reading::Channel("P6V".to_string())
        );
        assert_eq!(ps.get_field(Field::Voltage).unwrap().to_string(), "3.3");
    }

    #[test]
    fn get_refreshes_stale_cache() {
        let (_rm, mut ps) = connected();
        ps.set(Some(5.0), None, None).unwrap();
        ps.instrument().write("VOLT 2").unwrap();
        assert_eq!(ps.state().voltage, Some(5.0));
        assert_eq!(ps.get(Some("voltage")).unwrap(), Reading::Voltage(2.0));
        assert_eq!(ps.state().voltage, Some(2.0));
    }

    #[test]
    fn unknown_field() {
        let (rm, mut ps) = connected();
        ps.set(Some(5.0), Some(1.0), Some("P25V")).unwrap();
        let before = ps.state().clone();
        let sent = rm.commands(PS).len();

        assert_eq!(
            ps.get(Some("bogus_field")).unwrap_err(),
            Error::UnknownField("bogus_field".to_string())
        );
        assert_eq!(ps.state(), &before);
        assert_eq!(rm.commands(PS).len(), sent);
    }

    #[test]
    fn unparsable_response() {
        let (_rm, mut ps) = connected();
        ps.instrument().write("VOLT MAX").unwrap();
        assert!(matches!(
            ps.get(Some("voltage")),
            Err(Error::UnexpectedResponse { .. })
        ));
        assert_eq!(ps.state().voltage, None);
    }

    #[test]
    fn output_switch() {
        let (rm, mut ps) = connected();
        ps.on().unwrap();
        assert_eq!(rm.output(PS), Some(true));
        assert!(ps.is_output_on().unwrap());
        ps.off().unwrap();
        assert_eq!(rm.output(PS), Some(false));
        assert!(!ps.is_output_on().unwrap());
        assert_eq!(rm.commands(PS), vec!["OUTP ON", "OUTP?", "OUTP OFF", "OUTP?"]);
    }

    #[test]
    fn requires_connection() {
        let rm = Loopback::new().with_instrument(PS, "HEWLETT-PACKARD,E3631A,0,2.1-5.0-1.0");
        let mut ps = PowerSupply::new(rm.clone());
        assert_eq!(ps.on().unwrap_err(), Error::NotConnected);
        assert_eq!(ps.off().unwrap_err(), Error::NotConnected);
        assert_eq!(
            ps.set(Some(5.0), Some(1.0), Some("P25V")).unwrap_err(),
            Error::NotConnected
        );
        assert_eq!(ps.get(None).unwrap_err(), Error::NotConnected);
        assert_eq!(ps.state(), &PsState::default());
        assert!(rm.commands(PS).is_empty());
        assert_eq!(ps.state().to_string(), "?: ?V, ?A");
    }

    #[test]
    fn supported_model() {
        let (_rm, mut ps) = connected();
        assert!(ps.is_support().unwrap());
        ps.disconnect().unwrap();
        assert!(!ps.status());
        assert_eq!(ps.is_support().unwrap_err(), Error::NotConnected);
    }
}
