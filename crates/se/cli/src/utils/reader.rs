use std::error::Error;
use std::sync::Arc;

use nexum_se::virtual_card::{EchoApplet, VirtualCard, VirtualReader, VirtualReaders};
use nexum_se::{ReaderHandle, SeConfig, SeService};
use nexum_se_transport_pcsc::PcscDeviceManager;

/// AID of the echo applet installed on the virtual card
pub const VIRTUAL_ECHO_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x01, 0x51, 0x00, 0x00, 0x00];

/// Open the service over PC/SC, or over a single virtual reader
pub fn open_service(virtual_card: bool, config: SeConfig) -> Result<SeService, Box<dyn Error>> {
    if virtual_card {
        let card = VirtualCard::new().with_applet(&VIRTUAL_ECHO_AID, EchoApplet);
        let reader = Arc::new(VirtualReader::new("Virtual Reader 0", card));
        return Ok(SeService::open(&VirtualReaders::new([reader]), config)?);
    }

    let manager = PcscDeviceManager::new()?;
    Ok(SeService::open(&manager, config)?)
}

/// Find a reader with a specific name
pub fn find_reader_by_name(
    service: &SeService,
    reader_name: &str,
) -> Result<ReaderHandle, Box<dyn Error>> {
    for reader in service.readers()? {
        if service.reader_name(reader)? == reader_name {
            return Ok(reader);
        }
    }
    Err(format!("Reader '{}' not found", reader_name).into())
}

/// Find a reader with a card inserted
pub fn find_reader_with_card(service: &SeService) -> Result<ReaderHandle, Box<dyn Error>> {
    let readers = service.readers()?;

    if readers.is_empty() {
        return Err("No readers found!".into());
    }

    for reader in readers {
        if service.reader_properties(reader)?.se_present {
            return Ok(reader);
        }
    }
    Err("No card found in any reader!".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_reader_lookup() {
        let service = open_service(true, SeConfig::default()).unwrap();
        let by_card = find_reader_with_card(&service).unwrap();
        let by_name = find_reader_by_name(&service, "Virtual Reader 0").unwrap();
        assert_eq!(by_card, by_name);
        assert!(find_reader_by_name(&service, "Missing").is_err());
    }
}
