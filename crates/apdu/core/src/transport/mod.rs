//! Transport traits for APDU communication with cards
//!
//! A transport moves raw APDU bytes between the host and one card. It has no knowledge of
//! channels, command structure or status words.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for card connections provided by reader drivers
pub trait CardTransport: Send + fmt::Debug {
    /// Send raw APDU bytes to card and return response bytes
    ///
    /// Logs the exchange and delegates to [`CardTransport::do_transmit_raw`].
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode_upper(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode_upper(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Driver specific transmission, overridden by implementations
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Check if the transport is connected to a card
    fn is_connected(&self) -> bool;

    /// Answer To Reset of the connected card
    fn atr(&self) -> Result<Bytes, TransportError>;

    /// Reset the card and return its new ATR
    fn reset(&mut self) -> Result<Bytes, TransportError>;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transmit_raw(command)
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn atr(&self) -> Result<Bytes, TransportError> {
        (**self).atr()
    }

    fn reset(&mut self) -> Result<Bytes, TransportError> {
        (**self).reset()
    }
}

#[cfg(test)]
pub(crate) use mock::MockTransport;

#[cfg(test)]
mod mock {
    use std::collections::VecDeque;

    use super::*;

    /// Scripted transport returning queued responses in order
    #[derive(Debug, Default)]
    pub(crate) struct MockTransport {
        pub(crate) responses: VecDeque<Bytes>,
        pub(crate) commands: Vec<Bytes>,
    }

    impl MockTransport {
        pub(crate) fn new<I, B>(responses: I) -> Self
        where
            I: IntoIterator<Item = B>,
            B: AsRef<[u8]>,
        {
            Self {
                responses: responses
                    .into_iter()
                    .map(|r| Bytes::copy_from_slice(r.as_ref()))
                    .collect(),
                commands: Vec::new(),
            }
        }
    }

    impl CardTransport for MockTransport {
        fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
            self.commands.push(Bytes::copy_from_slice(command));
            self.responses.pop_front().ok_or(TransportError::Transmission)
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn atr(&self) -> Result<Bytes, TransportError> {
            Ok(Bytes::from_static(&[0x3B, 0x80, 0x80, 0x01, 0x01]))
        }

        fn reset(&mut self) -> Result<Bytes, TransportError> {
            self.commands.clear();
            self.atr()
        }
    }
}
