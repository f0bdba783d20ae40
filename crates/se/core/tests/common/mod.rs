//! Shared fixtures for the service tests

#![allow(dead_code)]

use std::sync::Arc;

use hex_literal::hex;
use nexum_se::virtual_card::{EchoApplet, VirtualCard, VirtualReader, VirtualReaders};
use nexum_se::{ReaderHandle, SeConfig, SeService};

/// AID of the echo applet installed on the default card
pub const ECHO_AID: [u8; 8] = hex!("A000000151000000");

/// Echo command with data `CAFE`
pub const ECHO_COMMAND: [u8; 7] = hex!("0001000002CAFE");

/// Card with one echo applet
pub fn echo_card() -> VirtualCard {
    VirtualCard::new().with_applet(&ECHO_AID, EchoApplet)
}

/// Service over a single virtual reader holding `card`
pub struct Fixture {
    pub service: SeService,
    pub reader: Arc<VirtualReader>,
    pub handle: ReaderHandle,
}

impl Fixture {
    pub fn new(card: VirtualCard) -> Self {
        Self::with_config(card, SeConfig::default())
    }

    pub fn with_config(card: VirtualCard, config: SeConfig) -> Self {
        Self::with_reader(VirtualReader::new("Virtual Reader 0", card), config)
    }

    pub fn with_reader(reader: VirtualReader, config: SeConfig) -> Self {
        let reader = Arc::new(reader);
        let service = SeService::open(&VirtualReaders::new([reader.clone()]), config)
            .expect("virtual enumeration cannot fail");
        let handle = service.readers().unwrap()[0];
        Self {
            service,
            reader,
            handle,
        }
    }

    /// Commands the card received after the first `skip`
    pub fn commands_since(&self, skip: usize) -> Vec<String> {
        self.reader
            .history()
            .iter()
            .skip(skip)
            .map(hex::encode_upper)
            .collect()
    }
}
