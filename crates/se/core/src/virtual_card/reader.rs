//! Reader driver for [`VirtualCard`]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use nexum_apdu_core::{CardTransport, TransportError};
use parking_lot::Mutex;
use tracing::debug;

use super::VirtualCard;
use crate::driver::{CardReader, ReaderCapabilities, ReaderEnumerator};

#[derive(Debug)]
struct Slot {
    card: Mutex<VirtualCard>,
    inserted: AtomicBool,
    failing: AtomicBool,
}

/// Reader holding a [`VirtualCard`]
///
/// Tests keep an `Arc` to the reader to pull the card out or make transmissions fail while
/// the service is using it.
#[derive(Debug)]
pub struct VirtualReader {
    name: String,
    capabilities: ReaderCapabilities,
    slot: Arc<Slot>,
}

impl VirtualReader {
    /// Create a reader with `card` inserted
    pub fn new(name: impl Into<String>, card: VirtualCard) -> Self {
        Self {
            name: name.into(),
            capabilities: ReaderCapabilities::default(),
            slot: Arc::new(Slot {
                card: Mutex::new(card),
                inserted: AtomicBool::new(true),
                failing: AtomicBool::new(false),
            }),
        }
    }

    /// Create a reader with no card inserted
    pub fn empty(name: impl Into<String>) -> Self {
        let reader = Self::new(name, VirtualCard::new());
        reader.slot.inserted.store(false, Ordering::Release);
        reader
    }

    /// Override the reported capabilities
    pub fn with_capabilities(mut self, capabilities: ReaderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Insert or remove the card; removal powers it down
    pub fn set_card_present(&self, present: bool) {
        self.slot.inserted.store(present, Ordering::Release);
        if !present {
            self.slot.card.lock().power_off();
        }
        debug!(reader = %self.name, present, "Virtual card presence changed");
    }

    /// Make every transmission fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.slot.failing.store(failing, Ordering::Release);
    }

    /// Commands the card has received so far
    pub fn history(&self) -> Vec<Bytes> {
        self.slot.card.lock().history().to_vec()
    }

    /// Run `f` with the card locked
    pub fn with_card<R>(&self, f: impl FnOnce(&mut VirtualCard) -> R) -> R {
        f(&mut self.slot.card.lock())
    }
}

impl CardReader for VirtualReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ReaderCapabilities {
        self.capabilities
    }

    fn is_card_present(&self) -> bool {
        self.slot.inserted.load(Ordering::Acquire)
    }

    fn connect(&self) -> Result<Box<dyn CardTransport>, TransportError> {
        if !self.is_card_present() {
            return Err(TransportError::NoCard);
        }
        let atr = self.slot.card.lock().power_on();
        debug!(reader = %self.name, "Connected to virtual card");
        Ok(Box::new(VirtualTransport {
            slot: self.slot.clone(),
            atr,
        }))
    }
}

/// Connection to a [`VirtualCard`]
#[derive(Debug)]
pub struct VirtualTransport {
    slot: Arc<Slot>,
    atr: Bytes,
}

impl CardTransport for VirtualTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::CardRemoved);
        }
        if self.slot.failing.load(Ordering::Acquire) {
            return Err(TransportError::Transmission);
        }
        Ok(self.slot.card.lock().process_apdu(command))
    }

    /// A removed card stays disconnected after reinsertion until [`CardTransport::reset`]
    fn is_connected(&self) -> bool {
        self.slot.inserted.load(Ordering::Acquire) && self.slot.card.lock().is_powered()
    }

    fn atr(&self) -> Result<Bytes, TransportError> {
        Ok(self.atr.clone())
    }

    fn reset(&mut self) -> Result<Bytes, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NoCard);
        }
        self.atr = self.slot.card.lock().power_on();
        Ok(self.atr.clone())
    }
}

/// Fixed set of virtual readers
#[derive(Debug, Default, Clone)]
pub struct VirtualReaders {
    readers: Vec<Arc<VirtualReader>>,
}

impl VirtualReaders {
    /// Enumerate `readers` in order
    pub fn new(readers: impl IntoIterator<Item = Arc<VirtualReader>>) -> Self {
        Self {
            readers: readers.into_iter().collect(),
        }
    }
}

impl ReaderEnumerator for VirtualReaders {
    fn list_readers(&self) -> Result<Vec<Arc<dyn CardReader>>, TransportError> {
        Ok(self
            .readers
            .iter()
            .map(|reader| reader.clone() as Arc<dyn CardReader>)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_connect_and_transmit() {
        let reader = VirtualReader::new("Virtual 0", VirtualCard::new());
        let mut transport = reader.connect().unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.atr().unwrap()[0], 0x3B);
        assert_eq!(transport.transmit_raw(&hex!("0070000001")).unwrap().as_ref(), hex!("019000"));
        assert_eq!(reader.history().len(), 1);
    }

    #[test]
    fn test_removal() {
        let reader = VirtualReader::new("Virtual 0", VirtualCard::new());
        let mut transport = reader.connect().unwrap();
        reader.set_card_present(false);

        assert_eq!(transport.transmit_raw(&hex!("00CA000000")), Err(TransportError::CardRemoved));
        assert_eq!(reader.connect().unwrap_err(), TransportError::NoCard);
        assert!(!reader.with_card(|card| card.is_powered()));

        reader.set_card_present(true);
        assert!(!transport.is_connected());
        assert!(transport.reset().is_ok());
        assert!(transport.is_connected());
    }

    #[test]
    fn test_failure_injection() {
        let reader = VirtualReader::new("Virtual 0", VirtualCard::new());
        let mut transport = reader.connect().unwrap();
        reader.set_failing(true);
        assert_eq!(transport.transmit_raw(&hex!("00CA000000")), Err(TransportError::Transmission));
        reader.set_failing(false);
        assert!(transport.transmit_raw(&hex!("00CA000000")).is_ok());
    }

    #[test]
    fn test_empty_reader() {
        let reader = VirtualReader::empty("Virtual 1");
        assert!(!reader.is_card_present());
        let listed = VirtualReaders::new([Arc::new(reader)]).list_readers().unwrap();
        assert_eq!(listed[0].name(), "Virtual 1");
    }
}
