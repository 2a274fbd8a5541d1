//! Error types and result handling
//!
//! All fallible operations in this crate return [`ModbusResult`]. The
//! [`ErrorKind`] view collapses the concrete error variants onto the failure
//! categories a scan reports per probe. Server exception replies are not
//! errors here; they surface as `ScanOutcome::ModbusException`.

use thiserror::Error;

/// Result alias used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Error category of a [`ModbusError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad request parameters, detected before any I/O
    InvalidArgument,
    /// Connect/send/receive failure other than a timeout
    NetworkError,
    /// Timed out without receiving any byte
    NoResponse,
    /// Bytes received but failed structural validation
    MalformedResponse,
}

/// Modbus client error
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Invalid request or scan parameters
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Connection could not be established or was lost
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Underlying socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Response failed structural validation
    #[error("Malformed response: {message}")]
    Malformed { message: String },

    /// Function code not supported by this client
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },
}

impl ModbusError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Category this error reports as
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::InvalidFunction { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::Connection { .. } | Self::Io(_) => ErrorKind::NetworkError,
            Self::Timeout { .. } => ErrorKind::NoResponse,
            Self::Malformed { .. } => ErrorKind::MalformedResponse,
        }
    }

    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
