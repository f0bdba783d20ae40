//! Tests against the host PC/SC stack
//!
//! These skip when no PC/SC service, reader or card is available.

use nexum_apdu_core::CardTransport;
use nexum_se::driver::{CardReader, ReaderEnumerator};
use nexum_se::{ChannelKind, SeConfig, SeService};
use nexum_se_transport_pcsc::{PcscCardReader, PcscDeviceManager};

fn manager() -> Option<PcscDeviceManager> {
    match PcscDeviceManager::new() {
        Ok(manager) => Some(manager),
        Err(e) => {
            println!("Skipping test, PC/SC not available: {e}");
            None
        }
    }
}

fn reader_with_card(manager: &PcscDeviceManager) -> Option<PcscCardReader> {
    let reader = manager
        .readers()
        .ok()?
        .into_iter()
        .find(|reader| reader.is_card_present());
    if reader.is_none() {
        println!("Skipping test, no card available");
    }
    reader
}

#[test]
fn test_list_readers() {
    let Some(manager) = manager() else { return };

    let readers = manager.list_readers().unwrap();
    for reader in &readers {
        assert!(!reader.name().is_empty());
    }

    let service = SeService::open(&manager, SeConfig::default()).unwrap();
    assert_eq!(service.readers().unwrap().len(), readers.len());
}

#[test]
fn test_transport_atr() {
    let Some(manager) = manager() else { return };
    let Some(reader) = reader_with_card(&manager) else { return };

    let transport = reader.open().unwrap();
    assert!(transport.is_connected());
    assert_eq!(transport.reader_name(), reader.c_name());
    assert!(!transport.atr().unwrap().is_empty());
}

#[test]
fn test_basic_channel_session() {
    let Some(manager) = manager() else { return };
    let Some(card_reader) = reader_with_card(&manager) else { return };

    let service = SeService::open(&manager, SeConfig::default()).unwrap();
    let reader = service
        .readers()
        .unwrap()
        .into_iter()
        .find(|r| service.reader_name(*r).unwrap() == card_reader.name())
        .unwrap();

    let session = service.open_session(reader).unwrap();
    assert!(!service.atr(session).unwrap().is_empty());

    match service.open_channel(session, ChannelKind::Basic, None) {
        Ok(channel) => {
            // GET DATA for the card production life cycle; any status is a valid answer
            let response = service.transmit(channel, &[0x80, 0xCA, 0x9F, 0x7F, 0x00]).unwrap();
            assert!(response.len() >= 2);
            service.close_channel(channel).unwrap();
        }
        Err(e) => println!("Could not open basic channel: {e}"),
    }

    service.close_session(session).unwrap();
}
