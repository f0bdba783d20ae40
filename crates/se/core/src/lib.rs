//! Secure element access
//!
//! This crate lets an application talk to applications on secure elements (smart cards,
//! embedded SEs) through a hierarchy of handles:
//!
//! - [`SeService`] owns the readers of the platform
//! - a session ([`SessionHandle`]) is an open connection to the card in one reader
//! - a channel ([`ChannelHandle`]) is the basic channel or a logical channel of that card,
//!   usually with an application selected by its [`Aid`]
//!
//! Commands sent on a channel are readdressed to its channel number. Closing any level
//! closes everything below it.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use nexum_se::virtual_card::{EchoApplet, VirtualCard, VirtualReader, VirtualReaders};
//! use nexum_se::{ChannelKind, SeConfig, SeService};
//!
//! let aid = [0xA0, 0x00, 0x00, 0x01, 0x51, 0x00, 0x00, 0x00];
//! let card = VirtualCard::new().with_applet(&aid, EchoApplet);
//! let readers = VirtualReaders::new([Arc::new(VirtualReader::new("Virtual 0", card))]);
//!
//! let service = SeService::open(&readers, SeConfig::default())?;
//! let reader = service.readers()?[0];
//! let session = service.open_session(reader)?;
//! let channel = service.open_channel(session, ChannelKind::Logical, Some(&aid))?;
//!
//! let response = service.transmit(channel, &[0x00, 0x01, 0x00, 0x00, 0x02, 0xCA, 0xFE])?;
//! assert_eq!(response.as_ref(), &[0xCA, 0xFE, 0x90, 0x00]);
//!
//! service.close()?;
//! # Ok::<(), nexum_se::Error>(())
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub use bytes::Bytes;
pub use nexum_apdu_core as apdu;

mod aid;
mod buffer;
mod channel;
mod config;
pub mod driver;
mod error;
mod handle;
mod reader;
mod service;
mod session;
pub mod virtual_card;

pub use aid::{Aid, MAX_AID_LENGTH, MIN_AID_LENGTH};
pub use channel::{BASIC_CHANNEL, ChannelKind};
pub use config::SeConfig;
pub use driver::{CardReader, ReaderCapabilities, ReaderEnumerator, ReaderProperties};
pub use error::{CommunicationError, Entity, Error, ErrorKind, Result};
pub use handle::{ChannelHandle, ReaderHandle, SessionHandle};
pub use service::SeService;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Aid, ChannelHandle, ChannelKind, Error, ErrorKind, ReaderHandle, Result, SeConfig,
        SeService, SessionHandle,
    };
}

