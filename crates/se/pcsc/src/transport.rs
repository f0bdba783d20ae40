//! PC/SC card connection

use std::ffi::{CStr, CString};
use std::fmt;

use bytes::Bytes;
use nexum_apdu_core::class::decode_channel;
use nexum_apdu_core::{CardTransport, TransportError};
use nexum_se::BASIC_CHANNEL;
use pcsc::{Card, Context, Disposition, MAX_BUFFER_SIZE_EXTENDED};
use tracing::{debug, trace, warn};

use crate::config::PcscConfig;
use crate::error::PcscError;

/// Connection to a card in one PC/SC reader
pub struct PcscTransport {
    context: Context,
    card: Option<Card>,
    reader_name: CString,
    config: PcscConfig,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("connected", &self.card.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PcscTransport {
    /// Connect to the card in `reader_name`
    pub fn connect(
        context: Context,
        reader_name: &CStr,
        config: PcscConfig,
    ) -> Result<Self, PcscError> {
        let card = Self::connect_card(&context, reader_name, &config)?;
        debug!(reader = ?reader_name, "Connected to card");

        Ok(Self {
            context,
            card: Some(card),
            reader_name: reader_name.to_owned(),
            config,
        })
    }

    fn connect_card(
        context: &Context,
        reader_name: &CStr,
        config: &PcscConfig,
    ) -> Result<Card, PcscError> {
        context
            .connect(reader_name, config.share_mode.into(), config.protocols)
            .map_err(|e| match e {
                pcsc::Error::NoSmartcard => {
                    PcscError::NoCard(reader_name.to_string_lossy().into_owned())
                }
                pcsc::Error::UnknownReader => {
                    PcscError::ReaderNotFound(reader_name.to_string_lossy().into_owned())
                }
                other => other.into(),
            })
    }

    /// Name of the reader this transport talks to
    pub fn reader_name(&self) -> &CStr {
        &self.reader_name
    }

    fn card(&self) -> Result<&Card, PcscError> {
        self.card.as_ref().ok_or(PcscError::CardRemoved)
    }

    fn reconnect(&mut self) -> Result<(), PcscError> {
        let card = self.card.as_mut().ok_or(PcscError::CardRemoved)?;
        card.reconnect(
            self.config.share_mode.into(),
            self.config.protocols,
            Disposition::LeaveCard,
        )?;
        Ok(())
    }

    fn transmit_once(&self, command: &[u8]) -> Result<Bytes, PcscError> {
        let card = self.card()?;
        let mut buffer = vec![0; MAX_BUFFER_SIZE_EXTENDED];
        let response = card.transmit(command, &mut buffer)?;
        Ok(Bytes::copy_from_slice(response))
    }
}

/// Whether `command` may be resent after a reset
///
/// A reset closes every logical channel, so only basic channel commands are retried.
fn survives_reset(command: &[u8]) -> bool {
    command
        .first()
        .is_some_and(|class| decode_channel(*class) == Ok(BASIC_CHANNEL))
}

impl CardTransport for PcscTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        match self.transmit_once(command) {
            Err(PcscError::Pcsc(pcsc::Error::ResetCard)) if self.config.auto_reconnect => {
                debug!("Card was reset by another application, reconnecting");
                self.reconnect()?;
                if !survives_reset(command) {
                    warn!(reader = ?self.reader_name, "Logical channel lost to a card reset");
                    return Err(PcscError::CardReset.into());
                }
                Ok(self.transmit_once(command)?)
            }
            Err(PcscError::Pcsc(pcsc::Error::RemovedCard)) => {
                self.card = None;
                Err(TransportError::CardRemoved)
            }
            result => Ok(result?),
        }
    }

    fn is_connected(&self) -> bool {
        // a reset is recovered on the next transmit, a removal is not
        self.card.as_ref().is_some_and(|card| {
            !matches!(
                card.status2_owned(),
                Err(pcsc::Error::RemovedCard | pcsc::Error::NoSmartcard)
            )
        })
    }

    fn atr(&self) -> Result<Bytes, TransportError> {
        let atr = self
            .card()?
            .get_attribute_owned(pcsc::Attribute::AtrString)
            .map_err(PcscError::from)?;
        trace!(atr = %hex::encode_upper(&atr), "Read ATR");
        Ok(Bytes::from(atr))
    }

    fn reset(&mut self) -> Result<Bytes, TransportError> {
        match self.card.as_mut() {
            Some(card) => card
                .reconnect(
                    self.config.share_mode.into(),
                    self.config.protocols,
                    Disposition::ResetCard,
                )
                .map_err(PcscError::from)?,
            // a removed card may have been reinserted
            None => {
                let card = Self::connect_card(&self.context, &self.reader_name, &self.config)?;
                self.card = Some(card);
            }
        }
        self.atr()
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
                warn!(reader = ?self.reader_name, error = %e, "Failed to disconnect card");
            }
        }
    }
}
