//! The connection wrapper shared by all device types.
//!
//! An [`Instrument`] owns its resource manager and at most one open session. It translates
//! the user facing address (`GPIB:7`, `IP:10.1.1.1`) into a VISA resource string, opens the
//! session and passes command strings through it. Every operation returns a
//! [`labctl_protocol::Result`], an operation on a disconnected instrument fails with
//! [`Error::NotConnected`].
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::visa::{ResourceManager, Session, Visa};
use labctl_protocol::scpi::IDN;
use labctl_protocol::{Address, Error, Identity};

/// How `connect` checks an address before opening a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validation {
    /// The resource must be reported by `list()`, otherwise connecting fails without
    /// touching the transport.
    Listed,
    /// Open the resource directly. Required for LAN instruments that are not enumerated.
    Unchecked,
}

impl Default for Validation {
    fn default() -> Self {
        Validation::Listed
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InstrumentOptions {
    pub validation: Validation,
}

/// Outcome of [`Instrument::disconnect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disconnect {
    Closed(Address),
    NotConnected,
}

struct Connected<S> {
    address: Address,
    session: S,
}

pub struct Instrument<R: ResourceManager = Visa> {
    // declared before `rm` so the session is closed before its resource manager
    connection: Option<Connected<R::Session>>,
    rm: R,
    options: InstrumentOptions,
}

impl<R: ResourceManager> Instrument<R> {
    pub fn new(rm: R) -> Self {
        Self::with_options(rm, InstrumentOptions::default())
    }

    pub fn with_options(rm: R, options: InstrumentOptions) -> Self {
        Self {
            connection: None,
            rm,
            options,
        }
    }

    /// Create an instrument and connect it to `address` right away.
    pub fn with_address(rm: R, address: &str) -> crate::Result<Self> {
        let mut ret = Self::new(rm);
        ret.connect(address)?;
        Ok(ret)
    }

    /// Connect to the instrument at `address`, e.g. `GPIB:7` or `IP:10.1.1.1`.
    ///
    /// An existing connection is closed first. On failure the instrument stays disconnected.
    pub fn connect(&mut self, address: &str) -> crate::Result<()> {
        match Address::parse(address) {
            Ok(addr) => self.connect_to(addr),
            Err(err) => {
                log::warn!("{}", err);
                Err(err)
            }
        }
    }

    pub fn connect_to(&mut self, address: Address) -> crate::Result<()> {
        if self.connection.is_some() {
            if let Err(err) = self.disconnect() {
                log::warn!("Error while closing previous session: {}", err);
            }
        }
        let session = match self.open(&address) {
            Ok(session) => session,
            Err(err) => {
                log::warn!("{}", err);
                return Err(err);
            }
        };
        log::info!("Connected to {} ({})", address, address.resource_name());
        self.connection = Some(Connected { address, session });
        Ok(())
    }

    fn open(&self, address: &Address) -> crate::Result<R::Session> {
        let resource = address.resource_name();
        if self.options.validation == Validation::Listed {
            let listed = self
                .rm
                .list_resources()
                .map_err(|err| Error::connection(address, err))?;
            if !listed.iter().any(|x| x.eq_ignore_ascii_case(&resource)) {
                return Err(Error::connection(
                    address,
                    format!("`{}` is not listed by the resource manager", resource),
                ));
            }
        }
        self.rm
            .open_resource(&resource)
            .map_err(|err| Error::connection(address, err))
    }

    /// Close the session. Disconnecting a disconnected instrument is a no-op
    /// returning `Disconnect::NotConnected`.
    pub fn disconnect(&mut self) -> crate::Result<Disconnect> {
        let Connected { address, session } = match self.connection.take() {
            Some(x) => x,
            None => {
                log::debug!("Not connected to any device");
                return Ok(Disconnect::NotConnected);
            }
        };
        session.close()?;
        log::info!("Disconnected from {}", address);
        Ok(Disconnect::Closed(address))
    }

    /// List all resources visible to the resource manager.
    pub fn list(&self) -> crate::Result<Vec<String>> {
        Ok(self.rm.list_resources()?)
    }

    pub fn identify(&mut self) -> crate::Result<Identity> {
        let response = self.query(IDN)?;
        Identity::parse(&response)
    }

    pub fn write(&mut self, msg: &str) -> crate::Result<()> {
        let conn = self.connection.as_mut().ok_or(Error::NotConnected)?;
        log::debug!("{} <- {}", conn.address, msg);
        conn.session.write(msg)?;
        Ok(())
    }

    pub fn query(&mut self, msg: &str) -> crate::Result<String> {
        let conn = self.connection.as_mut().ok_or(Error::NotConnected)?;
        log::debug!("{} <- {}", conn.address, msg);
        let ret = conn.session.query(msg)?;
        log::debug!("{} -> {}", conn.address, ret);
        Ok(ret)
    }

    pub fn address(&self) -> Option<&Address> {
        self.connection.as_ref().map(|x| &x.address)
    }

    /// Whether a session is currently open.
    pub fn status(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.status()
    }

    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    pub fn resource_manager(&self) -> &R {
        &self.rm
    }
}

impl<R: ResourceManager> fmt::Debug for Instrument<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("address", &self.address())
            .field("status", &self.status())
            .field("options", &self.options)
            .finish()
    }
}
