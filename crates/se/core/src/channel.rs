//! Channels and the commands allowed on them

use bytes::{Bytes, BytesMut};
use derive_more::Display;
use nexum_apdu_core::constants::cla;
use nexum_apdu_core::{Command, MAX_LOGICAL_CHANNEL, encode_channel};

use crate::{Aid, Error, Result};

/// Channel number of the basic channel
pub const BASIC_CHANNEL: u8 = 0;

/// Kind of channel to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ChannelKind {
    /// Channel 0, shared by everything on the card; one per reader
    #[display("basic")]
    Basic,
    /// Card assigned channel 1..=19 opened with MANAGE CHANNEL
    #[display("logical")]
    Logical,
}

/// State of one open channel
#[derive(Debug)]
pub(crate) struct ChannelRecord {
    pub(crate) number: u8,
    pub(crate) aid: Option<Aid>,
    pub(crate) select_response: Option<Bytes>,
}

impl ChannelRecord {
    pub(crate) const fn kind(&self) -> ChannelKind {
        if self.number == BASIC_CHANNEL {
            ChannelKind::Basic
        } else {
            ChannelKind::Logical
        }
    }
}

/// Channel numbers in use on one card
#[derive(Debug, Default)]
pub(crate) struct ChannelPool {
    basic: bool,
    logical: u32,
}

impl ChannelPool {
    /// Take the basic channel; false if someone already holds it
    pub(crate) fn claim_basic(&mut self) -> bool {
        !std::mem::replace(&mut self.basic, true)
    }

    /// Record `number` as open; false if it is out of range or already taken
    pub(crate) fn claim_logical(&mut self, number: u8) -> bool {
        if number == BASIC_CHANNEL || number > MAX_LOGICAL_CHANNEL || self.is_in_use(number) {
            return false;
        }
        self.logical |= 1 << number;
        true
    }

    pub(crate) fn release(&mut self, number: u8) {
        if number == BASIC_CHANNEL {
            self.basic = false;
        } else if number <= MAX_LOGICAL_CHANNEL {
            self.logical &= !(1 << number);
        }
    }

    pub(crate) const fn is_in_use(&self, number: u8) -> bool {
        if number == BASIC_CHANNEL {
            self.basic
        } else {
            number <= MAX_LOGICAL_CHANNEL && self.logical & (1 << number) != 0
        }
    }

    pub(crate) const fn logical_in_use(&self) -> usize {
        self.logical.count_ones() as usize
    }
}

/// Class byte of the interindustry commands the service sends on `number`
pub(crate) fn service_class(number: u8) -> Result<u8> {
    Ok(encode_channel(cla::ISO7816, number)?)
}

/// Validate a caller supplied command and readdress it to channel `number`
///
/// Channel management and application selection belong to the service, so MANAGE CHANNEL
/// and SELECT by name are refused, as is the reserved class byte `FF`. Apart from the class
/// byte the command is passed through unchanged.
pub(crate) fn prepare_command(command: &[u8], number: u8) -> Result<Bytes> {
    let parsed = Command::from_bytes(command)
        .map_err(|_| Error::InvalidCommand("malformed command APDU"))?;

    if parsed.cla == cla::INVALID {
        return Err(Error::InvalidCommand("class byte FF is reserved"));
    }
    if parsed.is_manage_channel() {
        return Err(Error::InvalidCommand("MANAGE CHANNEL is reserved to the service"));
    }
    if parsed.is_select_by_name() {
        return Err(Error::InvalidCommand("SELECT by name is reserved to channel opening"));
    }

    let class = encode_channel(parsed.cla, number)
        .map_err(|_| Error::InvalidCommand("class byte cannot address the channel"))?;

    let mut raw = BytesMut::from(command);
    raw[0] = class;
    Ok(raw.freeze())
}
