//! Error type for secure element operations
//!
//! Every fallible operation of the subsystem fails with exactly one [`Error`]; callers that
//! only care about the category match on [`Error::kind`].

use derive_more::Display;
use nexum_apdu_core::{StatusWord, TransportError};

/// Result type for secure element operations
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Level of the service hierarchy an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Entity {
    /// The service root
    #[display("service")]
    Service,
    /// A reader proxy
    #[display("reader")]
    Reader,
    /// A session on a reader
    #[display("session")]
    Session,
    /// A channel within a session
    #[display("channel")]
    Channel,
}

/// Failures talking to the card, below the channel protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommunicationError {
    /// Reader driver failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Card answered a protocol command with an unexpected status
    #[error("unexpected status word {0} ({desc})", desc = .0.description())]
    UnexpectedStatus(StatusWord),

    /// Card response violated the protocol
    #[error("malformed card response: {0}")]
    MalformedResponse(&'static str),

    /// Card kept announcing more data beyond the chaining limit
    #[error("response chain limit exceeded")]
    ChainLimitExceeded,
}

impl From<nexum_apdu_core::Error> for CommunicationError {
    fn from(error: nexum_apdu_core::Error) -> Self {
        use nexum_apdu_core::Error as ApduError;

        match error {
            ApduError::Transport(e) => Self::Transport(e),
            ApduError::ChainLimitExceeded(_) => Self::ChainLimitExceeded,
            ApduError::IncompleteResponse(_) => Self::MalformedResponse("response shorter than status word"),
            ApduError::InvalidCommandLength(_)
            | ApduError::DataTooLong(_)
            | ApduError::InvalidClass(_)
            | ApduError::InvalidChannel(_) => Self::MalformedResponse("unexpected framing failure"),
        }
    }
}

/// Error type for secure element operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// AID length outside the permitted range
    #[error("invalid AID length {length}, expected {min}..={max} bytes")]
    InvalidLength {
        /// Supplied length
        length: usize,
        /// Minimum length
        min: usize,
        /// Maximum length
        max: usize,
    },

    /// Command APDU rejected before reaching the card
    #[error("invalid command: {0}")]
    InvalidCommand(&'static str),

    /// No card in the reader
    #[error("no card present in reader {0}")]
    NoCard(String),

    /// Basic channel taken or logical channel slots exhausted
    #[error("no channel available")]
    NoChannelAvailable,

    /// SELECT reported that the application is absent
    #[error("application not found")]
    ApplicationNotFound,

    /// Requested item does not exist
    #[error("item not found: {0}")]
    ItemNotFound(&'static str),

    /// No further matching application occurrence
    #[error("no more data")]
    NoMoreData,

    /// Reader, card or channel does not support the operation
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// Transport or protocol failure
    #[error("communication error: {0}")]
    Communication(#[from] CommunicationError),

    /// Caller buffer too small; nothing was written
    #[error("buffer too short, {required} bytes required")]
    ShortBuffer {
        /// Minimum buffer length
        required: usize,
    },

    /// The entity has been closed
    #[error("{0} is closed")]
    Closed(Entity),

    /// Contract violation, e.g. a handle this service never issued
    #[error("bad state: {0}")]
    BadState(&'static str),

    /// Malformed caller input
    #[error("bad parameters: {0}")]
    BadParameters(&'static str),
}

/// Fieldless mirror of [`Error`] for matching on the category only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorKind {
    InvalidLength,
    InvalidCommand,
    NoCard,
    NoChannelAvailable,
    ApplicationNotFound,
    ItemNotFound,
    NoMoreData,
    NotSupported,
    CommunicationError,
    ShortBuffer,
    Closed,
    BadState,
    BadParameters,
}

impl Error {
    /// Category of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLength { .. } => ErrorKind::InvalidLength,
            Self::InvalidCommand(_) => ErrorKind::InvalidCommand,
            Self::NoCard(_) => ErrorKind::NoCard,
            Self::NoChannelAvailable => ErrorKind::NoChannelAvailable,
            Self::ApplicationNotFound => ErrorKind::ApplicationNotFound,
            Self::ItemNotFound(_) => ErrorKind::ItemNotFound,
            Self::NoMoreData => ErrorKind::NoMoreData,
            Self::NotSupported(_) => ErrorKind::NotSupported,
            Self::Communication(_) => ErrorKind::CommunicationError,
            Self::ShortBuffer { .. } => ErrorKind::ShortBuffer,
            Self::Closed(_) => ErrorKind::Closed,
            Self::BadState(_) => ErrorKind::BadState,
            Self::BadParameters(_) => ErrorKind::BadParameters,
        }
    }

    /// Map a transport failure seen on `reader`, turning card absence into [`Error::NoCard`]
    pub(crate) fn from_transport(reader: &str, error: TransportError) -> Self {
        if error.is_no_card() {
            Self::NoCard(reader.to_string())
        } else {
            CommunicationError::Transport(error).into()
        }
    }

    /// Card status that the protocol did not expect
    pub(crate) fn unexpected_status(status: StatusWord) -> Self {
        CommunicationError::UnexpectedStatus(status).into()
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        CommunicationError::Transport(error).into()
    }
}

impl From<nexum_apdu_core::Error> for Error {
    fn from(error: nexum_apdu_core::Error) -> Self {
        CommunicationError::from(error).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::ShortBuffer { required: 4 }.kind(), ErrorKind::ShortBuffer);
        assert_eq!(Error::Closed(Entity::Channel).kind(), ErrorKind::Closed);
        assert_eq!(
            Error::from(TransportError::Transmission).kind(),
            ErrorKind::CommunicationError
        );
    }

    #[test]
    fn test_transport_mapping() {
        assert_eq!(
            Error::from_transport("Virtual 0", TransportError::NoCard),
            Error::NoCard("Virtual 0".into())
        );
        assert_eq!(
            Error::from_transport("Virtual 0", TransportError::Device).kind(),
            ErrorKind::CommunicationError
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::Closed(Entity::Session).to_string(), "session is closed");
        assert_eq!(
            Error::unexpected_status(StatusWord::new(0x6A, 0x82)).to_string(),
            "communication error: unexpected status word 6A 82 (File or application not found)"
        );
    }
}
