//! Data types shared by the `labctl` instrument wrappers: addresses, identities,
//! the SCPI vocabulary of the supported devices and the error type.

pub mod address;
pub mod error;
pub mod identity;
pub mod scpi;

pub use crate::address::{Address, AddressKind};
pub use crate::error::{Error, VisaError, VisaResult};
pub use crate::identity::Identity;
pub use crate::scpi::{Field, PsCommand};

pub type Result<T> = std::result::Result<T, Error>;
