//! # Typed wrappers for VISA instruments
//!
//! This crate connects to laboratory instruments through a VISA resource manager and offers
//! typed handles for the supported device classes:
//!
//!  * [`Instrument`] - connect, disconnect, list resources and identify any instrument
//!  * [`Awg`] - arbitrary waveform generators
//!  * [`PowerSupply`] - programmable power supplies with cached voltage, current and channel
//!
//! Instruments are addressed as `GPIB:<n>` or `IP:<host>`. The resource manager is abstracted by
//! the [`visa::ResourceManager`] trait: [`visa::Visa`] drives real hardware through the VISA
//! shared library, [`visa::loopback::Loopback`] simulates instruments in-process.
//!
//! All operations are blocking. Errors, including operations on a disconnected instrument, are
//! reported through [`Error`].
#![allow(non_snake_case)]

#[macro_use]
extern crate dlopen_derive;

pub mod awg;
pub mod instrument;
pub mod power_supply;
pub mod visa;

pub use labctl_protocol as protocol;
pub use labctl_protocol::{Address, Error, Field, Identity, Result};

pub use crate::awg::Awg;
pub use crate::instrument::{Disconnect, Instrument, InstrumentOptions, Validation};
pub use crate::power_supply::{PowerSupply, PsState, Reading};
