//! In-memory card with logical channels and selectable applets

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use nexum_apdu_core::class::decode_channel;
use nexum_apdu_core::constants::{ins, manage_channel_p1, select_p1, select_p2};
use nexum_apdu_core::prelude::status;
use nexum_apdu_core::{Command, MAX_LOGICAL_CHANNEL, Response};
use tracing::{debug, trace};

/// Historical bytes of the default virtual ATR
const HISTORICAL_BYTES: &[u8] = b"nexum-se";

/// Build a T=1 ATR carrying `historical` bytes (at most 15)
pub fn build_atr(historical: &[u8]) -> Bytes {
    let count = historical.len().min(15);
    let mut atr = BytesMut::with_capacity(count + 4);

    // TS direct convention, T0 with TD1 present, TD1 for T=1
    atr.put_u8(0x3B);
    atr.put_u8(0x80 | count as u8);
    atr.put_u8(0x01);
    atr.put_slice(&historical[..count]);

    let tck = atr[1..].iter().fold(0u8, |acc, b| acc ^ b);
    atr.put_u8(tck);
    atr.freeze()
}

/// Application hosted on a [`VirtualCard`]
pub trait Applet: Send + fmt::Debug {
    /// Called when the applet becomes selected on `channel`; the result is the SELECT response
    fn select(&mut self, _aid: &[u8], _channel: u8) -> Response {
        Response::success(None)
    }

    /// Called when the applet stops being selected on `channel`
    fn deselect(&mut self, _channel: u8) {}

    /// Process a command addressed to the applet
    fn process(&mut self, channel: u8, command: &Command) -> Response;
}

/// Test applet
///
/// - SELECT returns an FCI template carrying the selected AID
/// - GET DATA (`CA`) returns the channel number it arrived on
/// - Any other command echoes its data, or returns Le bytes of a counting pattern
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoApplet;

impl Applet for EchoApplet {
    fn select(&mut self, aid: &[u8], _channel: u8) -> Response {
        let mut fci = BytesMut::with_capacity(aid.len() + 4);
        fci.put_u8(0x6F);
        fci.put_u8((aid.len() + 2) as u8);
        fci.put_u8(0x84);
        fci.put_u8(aid.len() as u8);
        fci.put_slice(aid);
        Response::success(Some(fci.freeze()))
    }

    fn process(&mut self, channel: u8, command: &Command) -> Response {
        if command.ins == 0xCA {
            return Response::success(Some(Bytes::copy_from_slice(&[channel])));
        }
        match (&command.data, command.le) {
            (Some(data), _) => Response::success(Some(data.clone())),
            (None, Some(le)) => {
                let len = if le == 0 { 256 } else { usize::from(le) };
                Response::success(Some((0..len).map(|i| i as u8).collect()))
            }
            (None, None) => Response::success(None),
        }
    }
}

struct Registration {
    aid: Vec<u8>,
    applet: Box<dyn Applet>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("aid", &hex::encode_upper(&self.aid))
            .field("applet", &self.applet)
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
struct ChannelState {
    selected: Option<usize>,
    /// AID, possibly partial, of the last successful SELECT
    search: Option<Vec<u8>>,
    /// Remainder of a chunked response, with its final status
    pending: Option<Response>,
}

/// Card simulator with ISO 7816-4 logical channels
///
/// Channel numbers are handed out lowest free first. SELECT by name matches registered
/// applets by prefix in registration order, so a partial AID can walk several applets with
/// next occurrence selection.
#[derive(Debug)]
pub struct VirtualCard {
    atr: Bytes,
    applets: Vec<Registration>,
    default_applet: Option<usize>,
    channel_count: u8,
    channels: Vec<Option<ChannelState>>,
    powered: bool,
    chunk: Option<usize>,
    history: Vec<Bytes>,
}

impl Default for VirtualCard {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualCard {
    /// Create a card supporting all 20 channels and no applets
    pub fn new() -> Self {
        Self {
            atr: build_atr(HISTORICAL_BYTES),
            applets: Vec::new(),
            default_applet: None,
            channel_count: MAX_LOGICAL_CHANNEL + 1,
            channels: Vec::new(),
            powered: false,
            chunk: None,
            history: Vec::new(),
        }
    }

    /// Replace the ATR; an empty ATR simulates a reader that reports none
    pub fn with_atr(mut self, atr: impl Into<Bytes>) -> Self {
        self.atr = atr.into();
        self
    }

    /// Install an applet under `aid`
    pub fn with_applet(mut self, aid: &[u8], applet: impl Applet + 'static) -> Self {
        self.applets.push(Registration {
            aid: aid.to_vec(),
            applet: Box::new(applet),
        });
        self
    }

    /// Install an applet that is implicitly selected on the basic channel
    pub fn with_default_applet(mut self, aid: &[u8], applet: impl Applet + 'static) -> Self {
        self = self.with_applet(aid, applet);
        self.default_applet = Some(self.applets.len() - 1);
        self
    }

    /// Number of channels including the basic channel, clamped to `1..=20`
    pub fn with_channel_count(mut self, count: u8) -> Self {
        self.channel_count = count.clamp(1, MAX_LOGICAL_CHANNEL + 1);
        self
    }

    /// Split response payloads longer than `chunk` into 61xx GET RESPONSE rounds
    pub fn with_response_chunk(mut self, chunk: usize) -> Self {
        self.chunk = Some(chunk.max(1));
        self
    }

    /// Power the card up and return its ATR; all logical channels start closed
    pub fn power_on(&mut self) -> Bytes {
        self.channels = vec![None; usize::from(self.channel_count)];
        self.channels[0] = Some(ChannelState {
            selected: self.default_applet,
            ..ChannelState::default()
        });
        self.powered = true;
        debug!("Virtual card powered on");
        self.atr.clone()
    }

    /// Power the card down
    pub fn power_off(&mut self) {
        self.powered = false;
        self.channels.clear();
        debug!("Virtual card powered off");
    }

    /// Whether the card is powered
    pub const fn is_powered(&self) -> bool {
        self.powered
    }

    /// Channel numbers currently open, basic channel included
    pub fn open_channels(&self) -> Vec<u8> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, state)| state.is_some())
            .map(|(number, _)| number as u8)
            .collect()
    }

    /// Every command received since creation
    pub fn history(&self) -> &[Bytes] {
        &self.history
    }

    /// Process a raw command APDU and return the raw response
    pub fn process_apdu(&mut self, raw: &[u8]) -> Bytes {
        self.history.push(Bytes::copy_from_slice(raw));

        if !self.powered {
            return Response::error(status::CONDITIONS_NOT_SATISFIED).to_bytes();
        }

        let command = match Command::from_bytes(raw) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "Failed to parse APDU");
                return Response::error(status::WRONG_LENGTH).to_bytes();
            }
        };
        let Ok(channel) = decode_channel(command.cla) else {
            return Response::error(status::CLASS_NOT_SUPPORTED).to_bytes();
        };
        if !self.is_open(channel) {
            return Response::error(status::LOGICAL_CHANNEL_NOT_SUPPORTED).to_bytes();
        }

        trace!(
            channel,
            ins = format_args!("{:#04x}", command.ins),
            "Virtual card processing command"
        );

        if command.ins == ins::GET_RESPONSE {
            return self.get_response(channel);
        }
        if let Some(state) = self.channel_mut(channel) {
            state.pending = None;
        }

        let response = match command.ins {
            ins::MANAGE_CHANNEL => self.manage_channel(channel, &command),
            ins::SELECT if command.p1 == select_p1::BY_NAME => self.select(channel, &command),
            _ => self.dispatch(channel, &command),
        };
        self.finish(channel, response)
    }

    fn is_open(&self, channel: u8) -> bool {
        self.channels
            .get(usize::from(channel))
            .is_some_and(Option::is_some)
    }

    fn channel_mut(&mut self, channel: u8) -> Option<&mut ChannelState> {
        self.channels.get_mut(usize::from(channel)).and_then(Option::as_mut)
    }

    /// Apply response chunking and encode
    fn finish(&mut self, channel: u8, response: Response) -> Bytes {
        let Some(chunk) = self.chunk else {
            return response.to_bytes();
        };
        let Some(payload) = response.payload().filter(|p| p.len() > chunk).cloned() else {
            return response.to_bytes();
        };

        let remaining = payload.len() - chunk;
        let announce = if remaining >= 256 { 0x00 } else { remaining as u8 };
        if let Some(state) = self.channel_mut(channel) {
            state.pending = Some(Response::new(Some(payload.slice(chunk..)), response.status()));
        }
        Response::new(Some(payload.slice(..chunk)), (0x61, announce)).to_bytes()
    }

    fn get_response(&mut self, channel: u8) -> Bytes {
        match self.channel_mut(channel).and_then(|state| state.pending.take()) {
            Some(pending) => self.finish(channel, pending),
            None => Response::error(status::CONDITIONS_NOT_SATISFIED).to_bytes(),
        }
    }

    fn manage_channel(&mut self, origin: u8, command: &Command) -> Response {
        match command.p1 {
            manage_channel_p1::OPEN => {
                if command.p2 != 0 {
                    return Response::error(status::INCORRECT_P1P2);
                }
                let Some(number) = (1..self.channel_count).find(|n| !self.is_open(*n)) else {
                    return Response::error(status::FUNCTION_NOT_SUPPORTED);
                };
                let inherited = if origin == 0 {
                    self.default_applet
                } else {
                    self.channels[usize::from(origin)].as_ref().and_then(|s| s.selected)
                };
                self.channels[usize::from(number)] = Some(ChannelState {
                    selected: inherited,
                    ..ChannelState::default()
                });
                debug!(channel = number, "Virtual card opened logical channel");
                Response::success(Some(Bytes::copy_from_slice(&[number])))
            }
            manage_channel_p1::CLOSE => {
                let target = if command.p2 == 0 { origin } else { command.p2 };
                if target == 0 {
                    return Response::error(status::INCORRECT_P1P2);
                }
                if !self.is_open(target) {
                    return Response::error((0x6A, 0x88));
                }
                let state = self.channels[usize::from(target)].take();
                if let Some(index) = state.and_then(|s| s.selected) {
                    self.applets[index].applet.deselect(target);
                }
                debug!(channel = target, "Virtual card closed logical channel");
                Response::success(None)
            }
            _ => Response::error(status::INCORRECT_P1P2),
        }
    }

    fn select(&mut self, channel: u8, command: &Command) -> Response {
        let name = command.data.clone().unwrap_or_default();
        let next = command.p2 & 0x03 == select_p2::NEXT;

        let Some(state) = self.channel_mut(channel) else {
            return Response::error(status::LOGICAL_CHANNEL_NOT_SUPPORTED);
        };
        let start = if next {
            match (&state.search, state.selected) {
                (Some(search), Some(current)) if search.as_slice() == &name[..] => current + 1,
                _ => return Response::error(status::FILE_NOT_FOUND),
            }
        } else {
            0
        };
        let previous = state.selected;

        let Some(index) = self
            .applets
            .iter()
            .skip(start)
            .position(|r| r.aid.starts_with(&name))
            .map(|offset| start + offset)
        else {
            debug!(aid = %hex::encode_upper(&name), next, "Virtual card has no matching applet");
            return Response::error(status::FILE_NOT_FOUND);
        };

        if let Some(previous) = previous {
            self.applets[previous].applet.deselect(channel);
        }
        let registration = &mut self.applets[index];
        let response = registration.applet.select(&registration.aid, channel);
        let accepted = response.status().is_selection_accepted();

        if let Some(state) = self.channel_mut(channel) {
            state.selected = accepted.then_some(index);
            state.search = accepted.then(|| name.to_vec());
        }
        response
    }

    fn dispatch(&mut self, channel: u8, command: &Command) -> Response {
        let selected = self
            .channels
            .get(usize::from(channel))
            .and_then(Option::as_ref)
            .and_then(|state| state.selected);
        match selected {
            Some(index) => self.applets[index].applet.process(channel, command),
            None => Response::error(status::CONDITIONS_NOT_SATISFIED),
        }
    }
}
