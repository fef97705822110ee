//! The resource manager seam. [`ResourceManager`] enumerates and opens instruments, a
//! [`Session`] talks to one of them. [`Visa`] is backed by the system VISA library,
//! [`loopback::Loopback`] simulates instruments in-process.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use labctl_protocol::{VisaError, VisaResult};
pub use visa_sys::{Visa, VisaSession};

pub mod loopback;
mod visa_sys;

/// Terminator appended to every message written to an instrument.
pub const WRITE_TERMINATION: &str = "\n";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VisaOptions {
    /// Path to the VISA shared library. Falls back to the platform default if `None`.
    pub library: Option<PathBuf>,
}

pub trait Session {
    fn write(&mut self, msg: &str) -> VisaResult<()>;

    /// Write `msg` and read back the response, without the trailing line terminator.
    fn query(&mut self, msg: &str) -> VisaResult<String>;

    fn close(self) -> VisaResult<()>;
}

pub trait ResourceManager {
    type Session: Session;

    /// Resources currently visible to the resource manager, in the order reported.
    fn list_resources(&self) -> VisaResult<Vec<String>>;

    fn open_resource(&self, resource: &str) -> VisaResult<Self::Session>;
}
