//! APDU response definitions
//!
//! This module provides the response APDU type according to ISO/IEC 7816-4.

pub mod status;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{Error, Result};
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data
    payload: Option<Bytes>,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: Option<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.filter(|p| !p.is_empty()),
            status: status.into(),
        }
    }

    /// Create a success response
    pub fn success(payload: Option<Bytes>) -> Self {
        Self::new(payload, status::common::SUCCESS)
    }

    /// Create an error response from a status word
    pub fn error(status: impl Into<StatusWord>) -> Self {
        Self::new(None, status)
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (status, payload) = split_status(data)?;

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self::new(Some(Bytes::copy_from_slice(payload)), status))
    }

    /// Response payload, without the status word
    pub const fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Total encoded length (payload plus two status bytes)
    pub fn encoded_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Bytes::len) + 2
    }

    /// Append `more` to the payload and take over its status word, as done when chaining
    /// GET RESPONSE fragments
    pub fn append(&mut self, more: Self) {
        if let Some(next) = more.payload {
            let mut buffer = BytesMut::new();
            if let Some(existing) = self.payload.take() {
                buffer.extend_from_slice(&existing);
            }
            buffer.extend_from_slice(&next);
            self.payload = Some(buffer.freeze());
        }
        self.status = more.status;
    }

    /// Serialize back to payload followed by SW1 SW2
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        if let Some(payload) = &self.payload {
            buf.put_slice(payload);
        }
        buf.put_u8(self.status.sw1);
        buf.put_u8(self.status.sw2);
        buf.freeze()
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::from_bytes(data)
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        response.to_bytes()
    }
}

/// Split raw response data into its status word and payload
pub fn split_status(data: &[u8]) -> Result<(StatusWord, &[u8])> {
    match data {
        [payload @ .., sw1, sw2] => Ok((StatusWord::new(*sw1, *sw2), payload)),
        _ => Err(Error::IncompleteResponse(data.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_from_bytes() {
        let resp = Response::from_bytes(&[0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();
        assert_eq!(resp.payload().unwrap().as_ref(), &[0x01, 0x02, 0x03]);
        assert!(resp.is_success());
        assert_eq!(resp.encoded_len(), 5);

        let resp = Response::from_bytes(&[0x6A, 0x82]).unwrap();
        assert!(resp.payload().is_none());
        assert!(resp.status().is_file_not_found());

        assert_eq!(Response::from_bytes(&[0x01]), Err(Error::IncompleteResponse(1)));
    }

    #[test]
    fn test_response_append() {
        let mut first = Response::new(Some(Bytes::from_static(&[0xAA])), (0x61, 0x02));
        first.append(Response::new(Some(Bytes::from_static(&[0xBB, 0xCC])), (0x90, 0x00)));
        assert_eq!(first.to_bytes().as_ref(), &[0xAA, 0xBB, 0xCC, 0x90, 0x00]);
    }

    #[test]
    fn test_split_status() {
        let (sw, payload) = split_status(&[0x01, 0x90, 0x00]).unwrap();
        assert!(sw.is_success());
        assert_eq!(payload, &[0x01]);
        assert!(split_status(&[]).is_err());
    }
}
