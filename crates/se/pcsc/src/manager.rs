//! Enumeration of PC/SC readers

use std::fmt;
use std::sync::Arc;

use nexum_apdu_core::TransportError;
use nexum_se::driver::{CardReader, ReaderEnumerator};
use pcsc::{Context, Scope};
use tracing::debug;

use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::reader::PcscCardReader;

/// Lists the readers known to the PC/SC resource manager
pub struct PcscDeviceManager {
    context: Context,
    config: PcscConfig,
}

impl fmt::Debug for PcscDeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscDeviceManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PcscDeviceManager {
    /// Establish a user scoped PC/SC context
    pub fn new() -> Result<Self, PcscError> {
        Self::with_config(PcscConfig::default())
    }

    /// Establish a context whose readers connect with `config`
    pub fn with_config(config: PcscConfig) -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context, config })
    }

    /// List the attached readers
    ///
    /// An empty list is returned when no reader is attached.
    pub fn readers(&self) -> Result<Vec<PcscCardReader>, PcscError> {
        let names = match self.context.list_readers_owned() {
            Ok(names) => names,
            Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(count = names.len(), "Listed PC/SC readers");

        Ok(names
            .into_iter()
            .map(|name| PcscCardReader::new(self.context.clone(), name, self.config.clone()))
            .collect())
    }
}

impl ReaderEnumerator for PcscDeviceManager {
    fn list_readers(&self) -> Result<Vec<Arc<dyn CardReader>>, TransportError> {
        Ok(self
            .readers()?
            .into_iter()
            .map(|reader| Arc::new(reader) as Arc<dyn CardReader>)
            .collect())
    }
}
