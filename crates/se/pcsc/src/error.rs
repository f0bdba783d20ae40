//! Error types for the PC/SC driver

use nexum_apdu_core::TransportError;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// Card was removed
    #[error("Card was removed")]
    CardRemoved,

    /// Card was reset while a logical channel was open
    #[error("Card was reset")]
    CardReset,
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::NoCard(_) | PcscError::Pcsc(pcsc::Error::NoSmartcard) => Self::NoCard,
            PcscError::CardRemoved | PcscError::Pcsc(pcsc::Error::RemovedCard) => Self::CardRemoved,
            PcscError::ReaderNotFound(_)
            | PcscError::Pcsc(
                pcsc::Error::UnknownReader
                | pcsc::Error::ReaderUnavailable
                | pcsc::Error::NoReadersAvailable
                | pcsc::Error::NoService
                | pcsc::Error::ServiceStopped,
            ) => Self::Connection,
            PcscError::CardReset => Self::CardReset,
            PcscError::Pcsc(pcsc::Error::Timeout) => Self::Timeout,
            PcscError::Pcsc(pcsc::Error::CommError | pcsc::Error::NotTransacted) => Self::Transmission,
            PcscError::Pcsc(pcsc::Error::UnresponsiveCard | pcsc::Error::UnpoweredCard) => {
                Self::Device
            }
            PcscError::Pcsc(e) => Self::other(e.to_string()),
        }
    }
}
