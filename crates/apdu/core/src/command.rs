//! APDU command definitions
//!
//! This module provides the command APDU type according to ISO/IEC 7816-4, covering the
//! four short cases and their extended length counterparts.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{ins, manage_channel_p1, select_p1, select_p2};
use crate::{Error, Result};

/// Expected length (Le) as encoded on the wire; zero means "maximum"
pub type ExpectedLength = u16;

const SHORT_MAX: usize = 0xFF;
const EXTENDED_MAX: usize = 0xFFFF;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// SELECT by DF name, first or next occurrence, requesting the FCI
    pub fn select_by_name(cla: u8, aid: &[u8], next: bool) -> Self {
        let p2 = if next { select_p2::NEXT } else { select_p2::FIRST };
        Self::new_with_data(cla, ins::SELECT, select_p1::BY_NAME, p2, Bytes::copy_from_slice(aid))
            .with_le(0x00)
    }

    /// MANAGE CHANNEL open with the card assigning the channel number
    pub const fn manage_channel_open(cla: u8) -> Self {
        Self::new_with_le(cla, ins::MANAGE_CHANNEL, manage_channel_p1::OPEN, 0x00, 0x01)
    }

    /// MANAGE CHANNEL close of `channel`
    pub const fn manage_channel_close(cla: u8, channel: u8) -> Self {
        Self::new(cla, ins::MANAGE_CHANNEL, manage_channel_p1::CLOSE, channel)
    }

    /// GET RESPONSE for `le` outstanding bytes
    pub const fn get_response(cla: u8, le: ExpectedLength) -> Self {
        Self::new_with_le(cla, ins::GET_RESPONSE, 0x00, 0x00, le)
    }

    /// Whether this is a MANAGE CHANNEL command
    pub const fn is_manage_channel(&self) -> bool {
        self.ins == ins::MANAGE_CHANNEL
    }

    /// Whether this is a SELECT by DF name
    pub const fn is_select_by_name(&self) -> bool {
        self.ins == ins::SELECT && self.p1 == select_p1::BY_NAME
    }

    /// Whether the extended length encoding is required
    pub fn is_extended(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.len() > SHORT_MAX)
            || self.le.is_some_and(|le| usize::from(le) > SHORT_MAX)
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        let extended = self.is_extended();
        let mut length = 4;

        if let Some(data) = &self.data {
            length += if extended { 3 } else { 1 } + data.len();
        }

        if self.le.is_some() {
            length += match (extended, self.data.is_some()) {
                (false, _) => 1,
                (true, true) => 2,
                (true, false) => 3,
            };
        }

        length
    }

    /// Convert to raw APDU bytes
    ///
    /// Data fields longer than 65535 bytes cannot be encoded; such commands are built only
    /// by [`Command::from_bytes`], which never produces them.
    pub fn to_bytes(&self) -> Bytes {
        let extended = self.is_extended();
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = &self.data {
            if extended {
                buffer.put_u8(0x00);
                buffer.put_u16(data.len() as u16);
            } else {
                buffer.put_u8(data.len() as u8);
            }
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            if extended {
                if self.data.is_none() {
                    buffer.put_u8(0x00);
                }
                buffer.put_u16(le);
            } else {
                buffer.put_u8(le as u8);
            }
        }

        buffer.freeze()
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);
        let body = &data[4..];

        match body.len() {
            0 => {}
            // Case 2S
            1 => command.le = Some(ExpectedLength::from(body[0])),
            _ if body[0] != 0 => {
                // Case 3S / 4S
                let lc = usize::from(body[0]);
                let rest = &body[1..];
                if rest.len() < lc {
                    return Err(Error::InvalidCommandLength(data.len()));
                }
                command.data = Some(Bytes::copy_from_slice(&rest[..lc]));
                match rest.len() - lc {
                    0 => {}
                    1 => command.le = Some(ExpectedLength::from(rest[lc])),
                    _ => return Err(Error::InvalidCommandLength(data.len())),
                }
            }
            // Case 2E
            3 => command.le = Some(u16::from_be_bytes([body[1], body[2]])),
            n if n > 3 => {
                // Case 3E / 4E
                let lc = usize::from(u16::from_be_bytes([body[1], body[2]]));
                let rest = &body[3..];
                if lc == 0 || rest.len() < lc {
                    return Err(Error::InvalidCommandLength(data.len()));
                }
                command.data = Some(Bytes::copy_from_slice(&rest[..lc]));
                match rest.len() - lc {
                    0 => {}
                    2 => command.le = Some(u16::from_be_bytes([rest[lc], rest[lc + 1]])),
                    _ => return Err(Error::InvalidCommandLength(data.len())),
                }
            }
            _ => return Err(Error::InvalidCommandLength(data.len())),
        }

        if command.data.as_ref().is_some_and(|d| d.len() > EXTENDED_MAX) {
            return Err(Error::DataTooLong(command.data.as_ref().map_or(0, Bytes::len)));
        }

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_command_serialization() {
        let aid = hex!("A00000000151000000");
        let cmd = Command::select_by_name(0x00, &aid, false);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("00A4040009A0000000015100000000"));

        let next = Command::select_by_name(0x01, &aid, true);
        assert_eq!(next.p2, 0x02);
        assert_eq!(next.to_bytes()[0], 0x01);
    }

    #[test]
    fn test_manage_channel_commands() {
        assert_eq!(Command::manage_channel_open(0x00).to_bytes().as_ref(), hex!("0070000001"));
        assert_eq!(Command::manage_channel_close(0x02, 2).to_bytes().as_ref(), hex!("02708002"));
        assert!(Command::manage_channel_open(0x00).is_manage_channel());
    }

    #[test]
    fn test_command_length() {
        let cmd1 = Command::new(0x00, 0xB0, 0x00, 0x00);
        assert_eq!(cmd1.command_length(), 4);

        let cmd2 = Command::new_with_le(0x00, 0xB0, 0x00, 0x00, 0xFF);
        assert_eq!(cmd2.command_length(), 5);

        let cmd3 = Command::new_with_data(0x00, 0xD6, 0x00, 0x00, vec![1, 2, 3]);
        assert_eq!(cmd3.command_length(), 8);
        assert_eq!(cmd3.to_bytes().len(), 8);

        let cmd4 = cmd3.with_le(0xFF);
        assert_eq!(cmd4.command_length(), 9);
    }

    #[test]
    fn test_extended_length() {
        let cmd = Command::new_with_data(0x00, 0xDA, 0x00, 0x00, vec![0xAB; 300]).with_le(0x0400);
        assert!(cmd.is_extended());
        let bytes = cmd.to_bytes();
        assert_eq!(bytes.len(), cmd.command_length());
        assert_eq!(&bytes[4..7], &[0x00, 0x01, 0x2C]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0x04, 0x00]);
        assert_eq!(Command::from_bytes(&bytes).unwrap(), cmd);

        let case2e = hex!("00B000000001F4");
        let parsed = Command::from_bytes(&case2e).unwrap();
        assert!(parsed.data.is_none());
        assert_eq!(parsed.le, Some(0x01F4));
    }

    #[test]
    fn test_command_from_bytes() {
        let cmd = Command::from_bytes(&hex!("00A40400")).unwrap();
        assert!(cmd.data.is_none());
        assert!(cmd.le.is_none());

        let cmd = Command::from_bytes(&hex!("00A4040003010203")).unwrap();
        assert_eq!(cmd.data.as_deref(), Some(&[0x01, 0x02, 0x03][..]));
        assert!(cmd.le.is_none());

        let cmd = Command::from_bytes(&hex!("00A4040003010203FF")).unwrap();
        assert_eq!(cmd.le, Some(0xFF));
        assert!(cmd.is_select_by_name());

        let cmd = Command::from_bytes(&hex!("00B0000000")).unwrap();
        assert_eq!(cmd.le, Some(0));
    }

    #[test]
    fn test_malformed_commands() {
        assert_eq!(Command::from_bytes(&hex!("00A404")), Err(Error::InvalidCommandLength(3)));
        // Lc says 3 bytes, only 2 present
        assert!(Command::from_bytes(&hex!("00A40400030102")).is_err());
        // two trailing bytes after a short data field
        assert!(Command::from_bytes(&hex!("00A4040001010000")).is_err());
        // zero Lc marker without an extended body
        assert!(Command::from_bytes(&hex!("00A404000001")).is_err());
    }
}
