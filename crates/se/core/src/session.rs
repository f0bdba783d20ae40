//! Sessions

use bytes::Bytes;

use crate::channel::ChannelRecord;
use crate::handle::{Arena, Slot};

/// State of one open session
#[derive(Debug)]
pub(crate) struct SessionRecord {
    pub(crate) atr: Option<Bytes>,
    pub(crate) channels: Arena<ChannelRecord>,
}

impl SessionRecord {
    pub(crate) fn new(atr: Option<Bytes>) -> Self {
        Self {
            atr,
            channels: Arena::new(),
        }
    }

    /// Remove every channel, logical channels first and the basic channel last
    pub(crate) fn take_channels(&mut self) -> Vec<ChannelRecord> {
        let mut channels: Vec<ChannelRecord> = self
            .channels
            .slots()
            .into_iter()
            .filter_map(|slot: Slot| self.channels.remove(slot).ok())
            .collect();
        channels.sort_by_key(|channel| std::cmp::Reverse(channel.number));
        channels
    }
}
