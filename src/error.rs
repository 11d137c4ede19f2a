//! Error types for Korad protocol operations.

use thiserror::Error;

/// Result type alias for Korad operations.
pub type Result<T> = std::result::Result<T, KoradError>;

/// Error types for Korad power supply communication.
#[derive(Error, Debug)]
pub enum KoradError {
    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// Channel read/write failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The device answered, but not the way the protocol says it should
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Caller violated an operation contract (bad selector, zero steps, ...)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Charge plan failed validation
    #[error("Invalid charge plan: {0}")]
    InvalidPlan(String),

    /// CSV sink failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Snapshot could not be converted for flattening
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures in the conversation with the device itself.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Nothing came back from the identity query
    #[error("Could not get response from PSU")]
    HandshakeFailed,

    /// Identity response did not look like a Korad KAxxxxP
    #[error("Could not identify a Korad PSU: {0:?}")]
    UnrecognizedDevice(String),

    /// Device went quiet mid-session
    #[error("No response to {command}")]
    NoResponse {
        /// Query that timed out
        command: &'static str,
    },

    /// A numeric reply that does not parse
    #[error("Malformed response to {command}: {response:?}")]
    MalformedResponse {
        /// Query that produced the reply
        command: &'static str,
        /// Reply as received (lossy ASCII)
        response: String,
    },
}
