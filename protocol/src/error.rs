use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code and description reported by the VISA library.
#[derive(Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisaError {
    pub code: i32,
    pub desc: String,
}

pub type VisaResult<T> = std::result::Result<T, VisaError>;

impl VisaError {
    pub fn new<T: Into<String>>(code: i32, desc: T) -> Self {
        Self {
            code,
            desc: desc.into(),
        }
    }
}

impl Display for VisaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("VisaError({:#x}): `{}`", self.code, self.desc))
    }
}

#[derive(Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    #[error("Invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Cannot connect to `{address}`: {message}")]
    Connection { address: String, message: String },
    #[error("Not connected to any device")]
    NotConnected,
    #[error("Unknown field `{0}`")]
    UnknownField(String),
    #[error("Invalid {field} `{value}`")]
    InvalidValue { field: String, value: String },
    #[error("Unexpected response to `{command}`: {response:?}")]
    UnexpectedResponse { command: String, response: String },
    #[error("Error while communicating with device: {0}")]
    Visa(VisaError),
}

impl Error {
    pub fn invalid_address<A: Into<String>, R: Into<String>>(address: A, reason: R) -> Self {
        Error::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn connection<A: ToString, M: ToString>(address: A, message: M) -> Self {
        Error::Connection {
            address: address.to_string(),
            message: message.to_string(),
        }
    }

    pub fn unexpected_response<C: Into<String>, R: Into<String>>(command: C, response: R) -> Self {
        Error::UnexpectedResponse {
            command: command.into(),
            response: response.into(),
        }
    }

    pub fn invalid_value<F: ToString, V: ToString>(field: F, value: V) -> Self {
        Error::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, Error::NotConnected)
    }
}

impl From<VisaError> for Error {
    fn from(err: VisaError) -> Self {
        Error::Visa(err)
    }
}
