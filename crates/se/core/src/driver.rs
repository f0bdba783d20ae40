//! Reader driver interface
//!
//! The service does not talk to hardware itself. A [`ReaderEnumerator`] lists the readers of
//! a platform, and each [`CardReader`] opens [`CardTransport`] connections to the card it
//! holds. The PC/SC driver and the in-memory virtual reader both plug in here.

use std::fmt;
use std::sync::Arc;

use nexum_apdu_core::{CardTransport, TransportError};

/// Static capabilities of a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderCapabilities {
    /// The reader is reserved for the trusted environment
    pub tee_only: bool,
    /// The reader passes SELECT next occurrence through to the card
    pub multiple_occurrences: bool,
}

impl Default for ReaderCapabilities {
    fn default() -> Self {
        Self {
            tee_only: false,
            multiple_occurrences: true,
        }
    }
}

/// Properties reported for a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderProperties {
    /// A card is currently present
    pub se_present: bool,
    /// The reader is reserved for the trusted environment
    pub tee_only: bool,
    /// SELECT responses are retained and readable
    pub select_response_enabled: bool,
}

/// A physical or virtual card reader
pub trait CardReader: Send + Sync + fmt::Debug {
    /// Human readable reader name
    fn name(&self) -> &str;

    /// Reader capabilities
    fn capabilities(&self) -> ReaderCapabilities {
        ReaderCapabilities::default()
    }

    /// Whether a card is currently inserted
    fn is_card_present(&self) -> bool;

    /// Connect to the inserted card
    fn connect(&self) -> Result<Box<dyn CardTransport>, TransportError>;
}

/// Source of the readers attached to a platform
pub trait ReaderEnumerator: fmt::Debug {
    /// List the readers currently available
    fn list_readers(&self) -> Result<Vec<Arc<dyn CardReader>>, TransportError>;
}
