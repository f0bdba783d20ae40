//! Error types specific to card transport

use thiserror::Error;

/// Transport error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Failed to connect to the reader
    #[error("Failed to connect to device")]
    Connection,

    /// No card present in the reader
    #[error("No card present")]
    NoCard,

    /// The card was removed during the exchange
    #[error("Card removed")]
    CardRemoved,

    /// The card was reset, closing its logical channels
    #[error("Card was reset")]
    CardReset,

    /// Failed to transmit data
    #[error("Failed to transmit data")]
    Transmission,

    /// Reader or driver reported a device failure
    #[error("Device error")]
    Device,

    /// Operation timed out in the driver
    #[error("Operation timed out")]
    Timeout,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Whether the failure means there is no card to talk to
    pub const fn is_no_card(&self) -> bool {
        matches!(self, Self::NoCard | Self::CardRemoved)
    }
}
