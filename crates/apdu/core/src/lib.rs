//! Core types for APDU (Application Protocol Data Unit) exchange
//!
//! This crate provides the framing layer used by the secure element subsystem to talk to
//! smart cards according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! - Building and parsing command APDUs, including extended length forms
//! - Parsing response APDUs and interpreting status words
//! - Encoding logical channel numbers into the class byte
//! - The [`CardTransport`] trait implemented by reader drivers
//! - Response chaining (61xx GET RESPONSE and 6Cxx Le correction)
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod class;
pub mod command;
pub mod constants;
pub mod processor;
pub mod response;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use class::{MAX_LOGICAL_CHANNEL, encode_channel};
pub use command::{Command, ExpectedLength};
pub use processor::ResponseChainer;
pub use response::Response;
pub use response::status::StatusWord;
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Command, Error, Response, ResponseChainer, Result, StatusWord,
        response::status::common as status, transport::CardTransport, transport::TransportError,
    };
}
