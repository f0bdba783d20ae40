//! Reader proxies
//!
//! One [`ReaderProxy`] fronts each reader of the service. Its mutex guards the card
//! connection, the sessions on it and the channel numbers in use, so every operation that
//! touches the card runs to completion before the next one starts.
//!
//! The card connection is made by the first session and shared by all later ones; closing the
//! last session releases it.

use std::sync::Arc;

use bytes::Bytes;
use nexum_apdu_core::constants::cla;
use nexum_apdu_core::{CardTransport, Command, MAX_LOGICAL_CHANNEL, Response, ResponseChainer};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::channel::{
    BASIC_CHANNEL, ChannelKind, ChannelPool, ChannelRecord, prepare_command, service_class,
};
use crate::driver::{CardReader, ReaderProperties};
use crate::handle::{Arena, Miss, Slot};
use crate::session::SessionRecord;
use crate::{Aid, CommunicationError, Entity, Error, Result, SeConfig};

const NOT_CONNECTED: Error = Error::BadState("session without a card connection");

#[derive(Debug)]
struct Connection {
    transport: Box<dyn CardTransport>,
    atr: Option<Bytes>,
}

#[derive(Debug, Default)]
struct ReaderState {
    connection: Option<Connection>,
    sessions: Arena<SessionRecord>,
    pool: ChannelPool,
    /// Set when the owning service closes; no new sessions afterwards
    retired: bool,
}

/// Service side view of one reader
#[derive(Debug)]
pub(crate) struct ReaderProxy {
    driver: Arc<dyn CardReader>,
    name: String,
    state: Mutex<ReaderState>,
}

const fn session_miss(miss: Miss) -> Error {
    match miss {
        Miss::Stale => Error::Closed(Entity::Session),
        Miss::Unknown => Error::BadState("unknown session handle"),
    }
}

const fn channel_miss(miss: Miss) -> Error {
    match miss {
        Miss::Stale => Error::Closed(Entity::Channel),
        Miss::Unknown => Error::BadState("unknown channel handle"),
    }
}

fn channel_ref(sessions: &Arena<SessionRecord>, session: Slot, channel: Slot) -> Result<&ChannelRecord> {
    sessions
        .get(session)
        .map_err(session_miss)?
        .channels
        .get(channel)
        .map_err(channel_miss)
}

fn channel_mut(
    sessions: &mut Arena<SessionRecord>,
    session: Slot,
    channel: Slot,
) -> Result<&mut ChannelRecord> {
    sessions
        .get_mut(session)
        .map_err(session_miss)?
        .channels
        .get_mut(channel)
        .map_err(channel_miss)
}

/// Keep the first error, log the ones after it
fn keep_first(first: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        if first.is_some() {
            warn!(error = %e, "Additional failure during teardown");
        } else {
            *first = Some(e);
        }
    }
}

impl ReaderProxy {
    pub(crate) fn new(driver: Arc<dyn CardReader>) -> Self {
        Self {
            name: driver.name().to_string(),
            driver,
            state: Mutex::new(ReaderState::default()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn properties(&self, config: &SeConfig) -> ReaderProperties {
        ReaderProperties {
            se_present: self.driver.is_card_present(),
            tee_only: self.driver.capabilities().tee_only || config.tee_only,
            select_response_enabled: config.select_response_enabled,
        }
    }

    /// Exchange `command` on the card, mapping card absence to [`Error::NoCard`]
    fn exchange(
        &self,
        transport: &mut dyn CardTransport,
        chainer: ResponseChainer,
        command: &[u8],
        number: u8,
    ) -> Result<Response> {
        let class = service_class(number)?;
        chainer
            .exchange(transport, command, class)
            .map_err(|e| match e {
                nexum_apdu_core::Error::Transport(t) => Error::from_transport(&self.name, t),
                other => other.into(),
            })
    }

    pub(crate) fn open_session(&self) -> Result<Slot> {
        let mut state = self.state.lock();
        if state.retired {
            return Err(Error::Closed(Entity::Service));
        }

        if !self.driver.is_card_present() {
            return Err(Error::NoCard(self.name.clone()));
        }

        if let Some(link) = &state.connection {
            // the card went away under the open sessions; they must be closed first
            if !link.transport.is_connected() {
                debug!(reader = %self.name, sessions = state.sessions.len(), "Card connection lost");
                return Err(Error::NoCard(self.name.clone()));
            }
        } else {
            let transport = self
                .driver
                .connect()
                .map_err(|e| Error::from_transport(&self.name, e))?;
            let atr = transport
                .atr()
                .map_err(|e| Error::from_transport(&self.name, e))?;
            info!(reader = %self.name, atr = %hex::encode_upper(&atr), "Connected to card");

            state.connection = Some(Connection {
                transport,
                atr: (!atr.is_empty()).then_some(atr),
            });
        }

        let atr = state.connection.as_ref().and_then(|c| c.atr.clone());
        let slot = state.sessions.insert(SessionRecord::new(atr));
        debug!(reader = %self.name, sessions = state.sessions.len(), "Session opened");
        Ok(slot)
    }

    pub(crate) fn session_atr(&self, session: Slot) -> Result<Bytes> {
        let state = self.state.lock();
        let record = state.sessions.get(session).map_err(session_miss)?;
        record.atr.clone().ok_or(Error::ItemNotFound("card provided no ATR"))
    }

    pub(crate) fn session_is_closed(&self, session: Slot) -> Result<bool> {
        match self.state.lock().sessions.get(session) {
            Ok(_) => Ok(false),
            Err(Miss::Stale) => Ok(true),
            Err(Miss::Unknown) => Err(session_miss(Miss::Unknown)),
        }
    }

    pub(crate) fn close_session(&self, session: Slot, config: &SeConfig) -> Result<()> {
        let mut state = self.state.lock();
        let lookup = state.sessions.get(session).map(|_| ());
        match lookup {
            Ok(()) => self.close_session_locked(&mut state, session, config),
            Err(Miss::Stale) => {
                trace!(reader = %self.name, "Session already closed");
                Ok(())
            }
            Err(Miss::Unknown) => Err(session_miss(Miss::Unknown)),
        }
    }

    pub(crate) fn close_sessions(&self, config: &SeConfig) -> Result<()> {
        let mut state = self.state.lock();
        self.close_all_locked(&mut state, config)
    }

    /// Close everything and refuse new sessions
    pub(crate) fn retire(&self, config: &SeConfig) -> Result<()> {
        let mut state = self.state.lock();
        state.retired = true;
        self.close_all_locked(&mut state, config)
    }

    fn close_all_locked(&self, state: &mut ReaderState, config: &SeConfig) -> Result<()> {
        let mut first = None;
        for slot in state.sessions.slots() {
            keep_first(&mut first, self.close_session_locked(state, slot, config));
        }
        first.map_or(Ok(()), Err)
    }

    fn close_session_locked(&self, state: &mut ReaderState, session: Slot, config: &SeConfig) -> Result<()> {
        let mut record = state.sessions.remove(session).map_err(session_miss)?;
        let chainer = config.chainer();

        let mut first = None;
        for channel in record.take_channels() {
            let result = self.close_record(state.connection.as_mut(), &mut state.pool, chainer, channel);
            keep_first(&mut first, result);
        }

        if state.sessions.is_empty() && state.connection.take().is_some() {
            info!(reader = %self.name, "Last session closed, card connection released");
        } else {
            debug!(reader = %self.name, sessions = state.sessions.len(), "Session closed");
        }

        first.map_or(Ok(()), Err)
    }

    /// Tear down one channel: MANAGE CHANNEL close for logical channels, then free the
    /// number and the AID reference whatever the card answered
    fn close_record(
        &self,
        connection: Option<&mut Connection>,
        pool: &mut ChannelPool,
        chainer: ResponseChainer,
        record: ChannelRecord,
    ) -> Result<()> {
        let number = record.number;
        let mut result = Ok(());

        if record.kind() == ChannelKind::Logical {
            result = match connection {
                Some(link) => self.send_close(&mut *link.transport, chainer, number),
                None => Err(NOT_CONNECTED),
            };
        }

        pool.release(number);
        debug!(reader = %self.name, channel = number, kind = %record.kind(), "Channel closed");
        result
    }

    fn send_close(&self, transport: &mut dyn CardTransport, chainer: ResponseChainer, number: u8) -> Result<()> {
        let command = Command::manage_channel_close(cla::ISO7816, number).to_bytes();
        let response = self.exchange(transport, chainer, &command, BASIC_CHANNEL)?;
        if response.is_success() {
            Ok(())
        } else {
            Err(Error::unexpected_status(response.status()))
        }
    }

    /// Undo a half finished channel opening
    fn rollback(&self, transport: &mut dyn CardTransport, pool: &mut ChannelPool, chainer: ResponseChainer, number: u8) {
        if number != BASIC_CHANNEL {
            if let Err(e) = self.send_close(transport, chainer, number) {
                warn!(reader = %self.name, channel = number, error = %e, "Failed to close channel during rollback");
            }
        }
        pool.release(number);
    }

    fn open_logical(
        &self,
        transport: &mut dyn CardTransport,
        pool: &mut ChannelPool,
        chainer: ResponseChainer,
    ) -> Result<u8> {
        let command = Command::manage_channel_open(cla::ISO7816).to_bytes();
        let response = self.exchange(transport, chainer, &command, BASIC_CHANNEL)?;

        if !response.is_success() {
            debug!(
                reader = %self.name,
                status = %response.status(),
                "Card refused to open a logical channel"
            );
            return Err(Error::NoChannelAvailable);
        }

        let number = match response.payload().map(|p| &p[..]) {
            Some(&[number]) => number,
            _ => {
                return Err(CommunicationError::MalformedResponse(
                    "MANAGE CHANNEL open must return one byte",
                )
                .into());
            }
        };

        if number == BASIC_CHANNEL || number > MAX_LOGICAL_CHANNEL {
            return Err(CommunicationError::MalformedResponse("card assigned an invalid channel number").into());
        }
        if !pool.claim_logical(number) {
            return Err(CommunicationError::MalformedResponse("card assigned a channel already in use").into());
        }

        Ok(number)
    }

    fn select(
        &self,
        transport: &mut dyn CardTransport,
        chainer: ResponseChainer,
        number: u8,
        aid: &Aid,
        next: bool,
    ) -> Result<Response> {
        let class = service_class(number)?;
        let command = Command::select_by_name(class, aid.as_bytes(), next).to_bytes();
        self.exchange(transport, chainer, &command, number)
    }

    pub(crate) fn open_channel(
        &self,
        session: Slot,
        kind: ChannelKind,
        aid: Option<&Aid>,
        config: &SeConfig,
    ) -> Result<(Slot, u8)> {
        let aid = aid.map(Aid::acquire);
        let chainer = config.chainer();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.sessions.get(session).map_err(session_miss)?;
        let link = state.connection.as_mut().ok_or(NOT_CONNECTED)?;
        let transport = &mut *link.transport;

        let number = match kind {
            ChannelKind::Basic => {
                if !state.pool.claim_basic() {
                    return Err(Error::NoChannelAvailable);
                }
                BASIC_CHANNEL
            }
            ChannelKind::Logical => {
                if state.pool.logical_in_use() >= usize::from(config.max_logical_channels) {
                    return Err(Error::NoChannelAvailable);
                }
                self.open_logical(transport, &mut state.pool, chainer)?
            }
        };

        let mut select_response = None;
        if let Some(aid) = &aid {
            let outcome = self.select(transport, chainer, number, aid, false).and_then(|response| {
                let status = response.status();
                if status.is_selection_accepted() {
                    Ok(response)
                } else if status.is_file_not_found() || status.is_applet_select_failed() {
                    Err(Error::ApplicationNotFound)
                } else if status.is_not_supported() {
                    Err(Error::NotSupported("card rejected the SELECT command"))
                } else {
                    Err(Error::unexpected_status(status))
                }
            });

            match outcome {
                Ok(response) => select_response = Some(response.to_bytes()),
                Err(e) => {
                    self.rollback(transport, &mut state.pool, chainer, number);
                    debug!(reader = %self.name, %aid, error = %e, "Application selection failed");
                    return Err(e);
                }
            }
        }

        let record = ChannelRecord {
            number,
            aid,
            select_response,
        };
        let Ok(owner) = state.sessions.get_mut(session) else {
            self.rollback(transport, &mut state.pool, chainer, number);
            return Err(Error::Closed(Entity::Session));
        };

        info!(
            reader = %self.name,
            channel = number,
            %kind,
            aid = ?record.aid,
            "Channel opened"
        );
        Ok((owner.channels.insert(record), number))
    }

    pub(crate) fn channel_number(&self, session: Slot, channel: Slot) -> Result<u8> {
        let state = self.state.lock();
        Ok(channel_ref(&state.sessions, session, channel)?.number)
    }

    pub(crate) fn select_response(&self, session: Slot, channel: Slot) -> Result<Bytes> {
        let state = self.state.lock();
        channel_ref(&state.sessions, session, channel)?
            .select_response
            .clone()
            .ok_or(Error::ItemNotFound("no SELECT response on this channel"))
    }

    pub(crate) fn select_next(&self, session: Slot, channel: Slot, config: &SeConfig) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let record = channel_mut(&mut state.sessions, session, channel)?;

        if !self.driver.capabilities().multiple_occurrences {
            return Err(Error::NotSupported("reader does not support multiple occurrences"));
        }
        let aid = record
            .aid
            .clone()
            .ok_or(Error::NotSupported("channel was opened without an AID"))?;

        let link = state.connection.as_mut().ok_or(NOT_CONNECTED)?;
        let response = self.select(&mut *link.transport, config.chainer(), record.number, &aid, true)?;
        let status = response.status();

        if status.is_selection_accepted() {
            debug!(reader = %self.name, channel = record.number, %aid, "Next occurrence selected");
            record.select_response = Some(response.to_bytes());
            Ok(())
        } else if status.is_file_not_found() || status.is_applet_select_failed() {
            Err(Error::NoMoreData)
        } else if status.is_not_supported() {
            Err(Error::NotSupported("card does not support next occurrence selection"))
        } else {
            Err(Error::unexpected_status(status))
        }
    }

    pub(crate) fn transmit(&self, session: Slot, channel: Slot, command: &[u8], config: &SeConfig) -> Result<Bytes> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let number = channel_ref(&state.sessions, session, channel)?.number;
        let raw = prepare_command(command, number)?;

        let link = state.connection.as_mut().ok_or(NOT_CONNECTED)?;
        let response = self.exchange(&mut *link.transport, config.chainer(), &raw, number)?;
        trace!(reader = %self.name, channel = number, status = %response.status(), "Command completed");
        Ok(response.to_bytes())
    }

    pub(crate) fn close_channel(&self, session: Slot, channel: Slot, config: &SeConfig) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let owner = match state.sessions.get_mut(session) {
            Ok(owner) => owner,
            Err(Miss::Stale) => return Ok(()),
            Err(Miss::Unknown) => return Err(session_miss(Miss::Unknown)),
        };
        let record = match owner.channels.remove(channel) {
            Ok(record) => record,
            Err(Miss::Stale) => return Ok(()),
            Err(Miss::Unknown) => return Err(channel_miss(Miss::Unknown)),
        };
        self.close_record(state.connection.as_mut(), &mut state.pool, config.chainer(), record)
    }
}
