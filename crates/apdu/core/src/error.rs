//! Core error type for APDU framing
//!
//! Transport failures have their own type ([`crate::TransportError`]) because reader
//! drivers produce them; this type covers malformed commands and responses.

use crate::response::status::StatusWord;

/// Result alias for APDU framing operations
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors raised while building, parsing or chaining APDUs
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Command bytes do not form a valid short or extended APDU
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Command data field exceeds what the encoding can carry
    #[error("Command data too long: {0} bytes")]
    DataTooLong(usize),

    /// Class byte cannot carry a channel number (e.g. 0xFF)
    #[error("Invalid class byte: {0:#04X}")]
    InvalidClass(u8),

    /// Channel number outside 0..=19
    #[error("Invalid logical channel number: {0}")]
    InvalidChannel(u8),

    /// Response shorter than the two status bytes
    #[error("Incomplete response: {0} bytes")]
    IncompleteResponse(usize),

    /// Card kept answering 61xx beyond the configured chain limit
    #[error("Response chain limit exceeded (last status {0})")]
    ChainLimitExceeded(StatusWord),

    /// Transport failure while chaining
    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),
}
