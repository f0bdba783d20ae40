//! Service root
//!
//! [`SeService`] owns the reader proxies and is the entry point for every operation. All
//! methods take `&self`; share the service between threads with an `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::buffer::copy_into;
use crate::driver::{ReaderEnumerator, ReaderProperties};
use crate::handle::{ChannelHandle, ReaderHandle, ServiceId, SessionHandle};
use crate::reader::ReaderProxy;
use crate::{Aid, ChannelKind, Entity, Error, Result, SeConfig};

/// Secure element service
#[derive(Debug)]
pub struct SeService {
    id: ServiceId,
    config: SeConfig,
    closed: AtomicBool,
    readers: RwLock<Vec<Arc<ReaderProxy>>>,
}

impl SeService {
    /// Open the service over the readers listed by `enumerator`
    ///
    /// A platform without readers yields a service with an empty reader list.
    pub fn open(enumerator: &dyn ReaderEnumerator, config: SeConfig) -> Result<Self> {
        let readers: Vec<Arc<ReaderProxy>> = enumerator
            .list_readers()?
            .into_iter()
            .map(|driver| Arc::new(ReaderProxy::new(driver)))
            .collect();

        let service = Self {
            id: ServiceId::next(),
            config,
            closed: AtomicBool::new(false),
            readers: RwLock::new(readers),
        };
        info!(
            service = %service.id,
            readers = service.readers.read().len(),
            "Secure element service opened"
        );
        Ok(service)
    }

    /// Configuration the service was opened with
    pub const fn config(&self) -> &SeConfig {
        &self.config
    }

    /// Whether [`SeService::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every session on every reader and release the readers
    ///
    /// Teardown continues past failures; the first one is returned. Closing twice is a no-op.
    #[instrument(level = "debug", skip(self), fields(service = %self.id))]
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Service already closed");
            return Ok(());
        }

        let readers = std::mem::take(&mut *self.readers.write());
        let mut first = None;
        for reader in readers {
            if let Err(e) = reader.retire(&self.config) {
                if first.is_some() {
                    warn!(reader = reader.name(), error = %e, "Additional failure closing reader");
                } else {
                    first = Some(e);
                }
            }
        }

        info!("Secure element service closed");
        first.map_or(Ok(()), Err)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed(Entity::Service))
        } else {
            Ok(())
        }
    }

    fn reader(&self, handle: ReaderHandle) -> Result<Arc<ReaderProxy>> {
        self.ensure_open()?;
        if handle.service != self.id {
            return Err(Error::BadState("handle belongs to another service"));
        }
        self.readers
            .read()
            .get(handle.index as usize)
            .cloned()
            .ok_or(Error::Closed(Entity::Reader))
    }

    /// Handles of all readers, in enumeration order
    pub fn readers(&self) -> Result<Vec<ReaderHandle>> {
        self.ensure_open()?;
        let count = self.readers.read().len();
        Ok((0..count as u32)
            .map(|index| ReaderHandle {
                service: self.id,
                index,
            })
            .collect())
    }

    /// Write reader handles into `out` and return how many were written
    pub fn readers_into(&self, out: &mut [ReaderHandle]) -> Result<usize> {
        copy_into(&self.readers()?, out)
    }

    /// Properties of a reader
    pub fn reader_properties(&self, reader: ReaderHandle) -> Result<ReaderProperties> {
        Ok(self.reader(reader)?.properties(&self.config))
    }

    /// Name of a reader
    pub fn reader_name(&self, reader: ReaderHandle) -> Result<String> {
        Ok(self.reader(reader)?.name().to_string())
    }

    /// Write the UTF-8 reader name into `out` and return its length
    pub fn reader_name_into(&self, reader: ReaderHandle, out: &mut [u8]) -> Result<usize> {
        let proxy = self.reader(reader)?;
        copy_into(proxy.name().as_bytes(), out)
    }

    /// Open a session on a reader, connecting to its card if needed
    #[instrument(level = "debug", skip(self))]
    pub fn open_session(&self, reader: ReaderHandle) -> Result<SessionHandle> {
        let slot = self.reader(reader)?.open_session()?;
        Ok(SessionHandle { reader, slot })
    }

    /// Close all sessions on a reader
    #[instrument(level = "debug", skip(self))]
    pub fn close_sessions(&self, reader: ReaderHandle) -> Result<()> {
        self.reader(reader)?.close_sessions(&self.config)
    }

    /// Whether a session has been closed
    pub fn session_is_closed(&self, session: SessionHandle) -> Result<bool> {
        if self.is_closed() {
            return Ok(true);
        }
        self.reader(session.reader)?.session_is_closed(session.slot)
    }

    /// ATR of the card the session is connected to
    pub fn atr(&self, session: SessionHandle) -> Result<Bytes> {
        self.reader(session.reader)?.session_atr(session.slot)
    }

    /// Write the ATR into `out` and return its length
    pub fn atr_into(&self, session: SessionHandle, out: &mut [u8]) -> Result<usize> {
        copy_into(&self.atr(session)?, out)
    }

    /// Close a session and all its channels; closing twice is a no-op
    #[instrument(level = "debug", skip(self))]
    pub fn close_session(&self, session: SessionHandle) -> Result<()> {
        match self.reader(session.reader) {
            Ok(reader) => reader.close_session(session.slot, &self.config),
            Err(Error::Closed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Open a channel, optionally selecting the application named by `aid`
    ///
    /// Without an AID the card's default application stays selected and no SELECT is sent.
    pub fn open_channel(
        &self,
        session: SessionHandle,
        kind: ChannelKind,
        aid: Option<&[u8]>,
    ) -> Result<ChannelHandle> {
        let aid = aid.map(Aid::from_bytes).transpose()?;
        self.open_channel_with_aid(session, kind, aid.as_ref())
    }

    /// Open a channel with an already constructed [`Aid`]; the channel takes its own reference
    #[instrument(level = "debug", skip(self))]
    pub fn open_channel_with_aid(
        &self,
        session: SessionHandle,
        kind: ChannelKind,
        aid: Option<&Aid>,
    ) -> Result<ChannelHandle> {
        let reader = self.reader(session.reader)?;
        let (slot, number) = reader.open_channel(session.slot, kind, aid, &self.config)?;
        debug!(channel = number, "Channel ready");
        Ok(ChannelHandle { session, slot })
    }

    /// Select the next application matching the channel's AID
    #[instrument(level = "debug", skip(self))]
    pub fn select_next(&self, channel: ChannelHandle) -> Result<()> {
        let reader = self.reader(channel.session.reader)?;
        reader.select_next(channel.session.slot, channel.slot, &self.config)
    }

    /// Response to the last successful SELECT on the channel, status word included
    pub fn select_response(&self, channel: ChannelHandle) -> Result<Bytes> {
        if !self.config.select_response_enabled {
            return Err(Error::NotSupported("SELECT responses are not retained"));
        }
        let reader = self.reader(channel.session.reader)?;
        reader.select_response(channel.session.slot, channel.slot)
    }

    /// Write the last SELECT response into `out` and return its length
    pub fn select_response_into(&self, channel: ChannelHandle, out: &mut [u8]) -> Result<usize> {
        copy_into(&self.select_response(channel)?, out)
    }

    /// Send a command APDU on the channel and return the response, status word included
    ///
    /// The class byte is rewritten to address the channel. MANAGE CHANNEL, SELECT by name
    /// and class `FF` are refused with [`Error::InvalidCommand`].
    #[instrument(level = "debug", skip(self, command), fields(len = command.len()))]
    pub fn transmit(&self, channel: ChannelHandle, command: &[u8]) -> Result<Bytes> {
        let reader = self.reader(channel.session.reader)?;
        reader.transmit(channel.session.slot, channel.slot, command, &self.config)
    }

    /// Like [`SeService::transmit`], writing the response into `out`
    ///
    /// The command is exchanged before the buffer size is known, so a [`Error::ShortBuffer`]
    /// here means the card already processed it.
    pub fn transmit_into(&self, channel: ChannelHandle, command: &[u8], out: &mut [u8]) -> Result<usize> {
        copy_into(&self.transmit(channel, command)?, out)
    }

    /// Channel number assigned to the channel (0 for the basic channel)
    pub fn channel_number(&self, channel: ChannelHandle) -> Result<u8> {
        let reader = self.reader(channel.session.reader)?;
        reader.channel_number(channel.session.slot, channel.slot)
    }

    /// Close a channel; closing twice is a no-op
    #[instrument(level = "debug", skip(self))]
    pub fn close_channel(&self, channel: ChannelHandle) -> Result<()> {
        match self.reader(channel.session.reader) {
            Ok(reader) => reader.close_channel(channel.session.slot, channel.slot, &self.config),
            Err(Error::Closed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for SeService {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close secure element service on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_card::{EchoApplet, VirtualCard, VirtualReader, VirtualReaders};
    use crate::{ErrorKind, MIN_AID_LENGTH};
    use hex_literal::hex;

    const AID: [u8; 8] = hex!("A000000151000000");

    fn service() -> (SeService, Arc<VirtualReader>) {
        let card = VirtualCard::new().with_applet(&AID, EchoApplet);
        let reader = Arc::new(VirtualReader::new("Virtual 0", card));
        let enumerator = VirtualReaders::new([reader.clone()]);
        (SeService::open(&enumerator, SeConfig::default()).unwrap(), reader)
    }

    #[test]
    fn test_reader_listing() {
        let (service, _) = service();
        let readers = service.readers().unwrap();
        assert_eq!(readers.len(), 1);
        assert_eq!(service.reader_name(readers[0]).unwrap(), "Virtual 0");

        let mut none: [ReaderHandle; 0] = [];
        assert_eq!(
            service.readers_into(&mut none),
            Err(Error::ShortBuffer { required: 1 })
        );

        let mut small = [0u8; 4];
        assert_eq!(
            service.reader_name_into(readers[0], &mut small),
            Err(Error::ShortBuffer { required: 9 })
        );
        assert_eq!(small, [0; 4]);
    }

    #[test]
    fn test_handles_from_other_service_rejected() {
        let (first, _) = service();
        let (second, _) = service();
        let foreign = first.readers().unwrap()[0];
        assert_eq!(second.open_session(foreign).unwrap_err().kind(), ErrorKind::BadState);
    }

    #[test]
    fn test_closed_service() {
        let (service, _) = service();
        let reader = service.readers().unwrap()[0];
        let session = service.open_session(reader).unwrap();

        service.close().unwrap();
        service.close().unwrap();

        assert_eq!(service.readers(), Err(Error::Closed(Entity::Service)));
        assert_eq!(service.open_session(reader), Err(Error::Closed(Entity::Service)));
        assert_eq!(service.session_is_closed(session), Ok(true));
        assert_eq!(service.close_session(session), Ok(()));
    }

    #[test]
    fn test_invalid_aid_rejected_before_card() {
        let (service, reader) = service();
        let session = service.open_session(service.readers().unwrap()[0]).unwrap();
        let before = reader.history().len();

        let err = service
            .open_channel(session, ChannelKind::Logical, Some(&AID[..MIN_AID_LENGTH - 1]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLength);
        assert_eq!(reader.history().len(), before);
    }
}
