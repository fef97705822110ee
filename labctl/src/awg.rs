//! Arbitrary waveform generators.
use crate::instrument::{Disconnect, Instrument, InstrumentOptions};
use crate::visa::{ResourceManager, Visa};
use labctl_protocol::scpi::{is_supported, SUPPORTED_AWG};
use labctl_protocol::{Address, Identity};

pub struct Awg<R: ResourceManager = Visa> {
    instrument: Instrument<R>,
    identity: Option<Identity>,
}

impl<R: ResourceManager> Awg<R> {
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
            identity: None,
        }
    }

    /// Connect to `address`. The identity of a previously connected device is forgotten.
    pub fn connect(&mut self, address: &str) -> crate::Result<()> {
        self.identity = None;
        self.instrument.connect(address)
    }

    pub fn disconnect(&mut self) -> crate::Result<Disconnect> {
        self.identity = None;
        self.instrument.disconnect()
    }

    pub fn list(&self) -> crate::Result<Vec<String>> {
        self.instrument.list()
    }

    /// Query the identity of the device and remember it.
    pub fn identify(&mut self) -> crate::Result<Identity> {
        let idn = self.instrument.identify()?;
        self.identity = Some(idn.clone());
        Ok(idn)
    }

    /// Whether the connected model is one of the known AWG models. Identifies the device first
    /// if that did not happen yet.
    pub fn is_support(&mut self) -> crate::Result<bool> {
        if self.identity.is_none() {
            self.identify()?;
        }
        Ok(self
            .model()
            .map(|model| is_supported(SUPPORTED_AWG, model))
            .unwrap_or(false))
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.identity.as_ref().map(|x| x.manufacturer.as_str())
    }

    pub fn model(&self) -> Option<&str> {
        self.identity.as_ref().map(|x| x.model.as_str())
    }

    pub fn serial_no(&self) -> Option<&str> {
        self.identity.as_ref().map(|x| x.serial_no.as_str())
    }

    pub fn firmware(&self) -> Option<&str> {
        self.identity.as_ref().map(|x| x.firmware.as_str())
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
}
