//! PC/SC reader driver

use std::ffi::{CStr, CString};
use std::fmt;
use std::time::Duration;

use nexum_apdu_core::{CardTransport, TransportError};
use nexum_se::driver::CardReader;
use pcsc::{Context, ReaderState, State};
use tracing::debug;

use crate::config::PcscConfig;
use crate::transport::PcscTransport;

/// One reader attached to the PC/SC resource manager
pub struct PcscCardReader {
    context: Context,
    name: String,
    c_name: CString,
    config: PcscConfig,
}

impl fmt::Debug for PcscCardReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscCardReader")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PcscCardReader {
    /// Create a reader from its PC/SC name
    pub fn new(context: Context, c_name: CString, config: PcscConfig) -> Self {
        Self {
            context,
            name: c_name.to_string_lossy().into_owned(),
            c_name,
            config,
        }
    }

    /// PC/SC name of the reader
    pub fn c_name(&self) -> &CStr {
        &self.c_name
    }

    /// Connect to the card and return the concrete transport
    pub fn open(&self) -> Result<PcscTransport, TransportError> {
        Ok(PcscTransport::connect(
            self.context.clone(),
            &self.c_name,
            self.config.clone(),
        )?)
    }
}

impl CardReader for PcscCardReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_card_present(&self) -> bool {
        let mut states = [ReaderState::new(self.c_name.as_c_str(), State::UNAWARE)];
        match self
            .context
            .get_status_change(Some(Duration::ZERO), &mut states)
        {
            Ok(()) => {
                let state = states[0].event_state();
                state.contains(State::PRESENT) && !state.contains(State::EMPTY)
            }
            Err(e) => {
                debug!(reader = %self.name, error = %e, "Failed to query reader state");
                false
            }
        }
    }

    fn connect(&self) -> Result<Box<dyn CardTransport>, TransportError> {
        Ok(Box::new(self.open()?))
    }
}
