//! Response chaining
//!
//! Cards answer 61xx when more response bytes are waiting to be fetched with GET RESPONSE,
//! and 6Cxx when the command should be repeated with Le = xx. [`ResponseChainer`] hides
//! both from the caller and returns the assembled response.

use std::fmt;

use tracing::{debug, trace};

use crate::command::{Command, ExpectedLength};
use crate::transport::CardTransport;
use crate::{Error, Response, Result};

/// Default limit on GET RESPONSE rounds for one command
pub const DEFAULT_MAX_CHAIN: usize = 10;

/// Exchange helper that follows 61xx and 6Cxx status words
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ResponseChainer {
    /// Whether 61xx / 6Cxx are handled at all
    pub enabled: bool,
    /// Maximum number of GET RESPONSE rounds
    pub max_chain: usize,
}

impl Default for ResponseChainer {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chain: DEFAULT_MAX_CHAIN,
        }
    }
}

impl fmt::Debug for ResponseChainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseChainer")
            .field("enabled", &self.enabled)
            .field("max_chain", &self.max_chain)
            .finish()
    }
}

impl ResponseChainer {
    /// A chainer that passes responses through untouched
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            max_chain: 0,
        }
    }

    /// Send `command` and assemble the full response
    ///
    /// `class` is the class byte used for GET RESPONSE; it must address the same logical
    /// channel as `command`.
    pub fn exchange(
        &self,
        transport: &mut dyn CardTransport,
        command: &[u8],
        class: u8,
    ) -> Result<Response> {
        let raw = transport.transmit_raw(command)?;
        let mut response = Response::from_bytes(&raw)?;

        if !self.enabled {
            return Ok(response);
        }

        if response.status().is_wrong_le() {
            if let Ok(parsed) = Command::from_bytes(command) {
                let le = ExpectedLength::from(response.status().sw2);
                debug!(le, "Card requested a different Le, resending");
                let retry = parsed.with_le(le).to_bytes();
                let raw = transport.transmit_raw(&retry)?;
                response = Response::from_bytes(&raw)?;
            }
        }

        let mut rounds = 0;
        while response.status().is_more_data_available() {
            if rounds >= self.max_chain {
                return Err(Error::ChainLimitExceeded(response.status()));
            }
            let le = ExpectedLength::from(response.status().sw2);
            trace!(le, round = rounds, "Fetching remaining response bytes");

            let get_response = Command::get_response(class, le).to_bytes();
            let raw = transport.transmit_raw(&get_response)?;
            response.append(Response::from_bytes(&raw)?);
            rounds += 1;
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError};
    use hex_literal::hex;

    #[test]
    fn test_get_response_chaining() {
        let mut transport = MockTransport::new([&hex!("01026102")[..], &hex!("03049000")[..]]);
        let response = ResponseChainer::default()
            .exchange(&mut transport, &hex!("01CA000000"), 0x01)
            .unwrap();

        assert_eq!(response.to_bytes().as_ref(), hex!("010203049000"));
        assert_eq!(transport.commands[1].as_ref(), hex!("01C0000002"));
    }

    #[test]
    fn test_wrong_le_resend() {
        let mut transport = MockTransport::new([&hex!("6C03")[..], &hex!("AABBCC9000")[..]]);
        let response = ResponseChainer::default()
            .exchange(&mut transport, &hex!("00CA000000"), 0x00)
            .unwrap();

        assert!(response.is_success());
        assert_eq!(transport.commands[1].as_ref(), hex!("00CA000003"));
    }

    #[test]
    fn test_chain_limit() {
        let mut transport = MockTransport::new([hex!("6101"), hex!("6101"), hex!("6101")]);
        let chainer = ResponseChainer {
            enabled: true,
            max_chain: 2,
        };
        let err = chainer.exchange(&mut transport, &hex!("00CA000000"), 0x00).unwrap_err();
        assert!(matches!(err, Error::ChainLimitExceeded(_)));
    }

    #[test]
    fn test_disabled_passthrough() {
        let mut transport = MockTransport::new([hex!("6110")]);
        let response = ResponseChainer::disabled()
            .exchange(&mut transport, &hex!("00CA000000"), 0x00)
            .unwrap();
        assert!(response.status().is_more_data_available());
        assert_eq!(transport.commands.len(), 1);
    }

    #[test]
    fn test_transport_failure() {
        let mut transport = MockTransport::new(Vec::<Vec<u8>>::new());
        let err = ResponseChainer::default()
            .exchange(&mut transport, &hex!("00CA000000"), 0x00)
            .unwrap_err();
        assert_eq!(err, Error::Transport(TransportError::Transmission));
    }
}
