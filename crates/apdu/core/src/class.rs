//! Logical channel encoding in the class byte (ISO/IEC 7816-4 clause 5.4.1)
//!
//! Channels 0..=3 use the first interindustry layout (`000c ssnn`), channels 4..=19 the
//! further interindustry layout (`01sc nnnn`, number minus four). The proprietary bit (b8)
//! and command chaining bit (b5) are carried over; secure messaging indication is mapped
//! between the two layouts.

use crate::constants::cla;
use crate::{Error, Result};

/// Highest logical channel number addressable through the class byte
pub const MAX_LOGICAL_CHANNEL: u8 = 19;

const CHAINING: u8 = 0x10;
const FURTHER: u8 = 0x40;
const FURTHER_SM: u8 = 0x20;
const FIRST_SM_MASK: u8 = 0x0C;
/// "Secure messaging, command header not processed" in the first layout
const FIRST_SM_DEFAULT: u8 = 0x08;

const fn is_further(class: u8) -> bool {
    class & FURTHER != 0
}

/// Whether the class byte indicates secure messaging
pub const fn has_secure_messaging(class: u8) -> bool {
    if is_further(class) {
        class & FURTHER_SM != 0
    } else {
        class & FIRST_SM_MASK != 0
    }
}

/// Extract the channel number carried by a class byte
pub fn decode_channel(class: u8) -> Result<u8> {
    if class == cla::INVALID {
        return Err(Error::InvalidClass(class));
    }
    if is_further(class) {
        Ok((class & 0x0F) + 4)
    } else {
        Ok(class & 0x03)
    }
}

/// Rewrite `class` so that it addresses `channel`, keeping the proprietary,
/// chaining and secure messaging indications
pub fn encode_channel(class: u8, channel: u8) -> Result<u8> {
    if class == cla::INVALID {
        return Err(Error::InvalidClass(class));
    }
    if channel > MAX_LOGICAL_CHANNEL {
        return Err(Error::InvalidChannel(channel));
    }

    let proprietary = class & cla::PROPRIETARY;
    let chaining = class & CHAINING;
    let sm = has_secure_messaging(class);

    let encoded = if channel <= 3 {
        let sm_bits = if is_further(class) {
            if sm { FIRST_SM_DEFAULT } else { 0 }
        } else {
            class & FIRST_SM_MASK
        };
        proprietary | chaining | sm_bits | channel
    } else {
        let sm_bit = if sm { FURTHER_SM } else { 0 };
        proprietary | FURTHER | sm_bit | chaining | (channel - 4)
    };

    // proprietary chained SM command on channel 19 would collide with the reserved value
    if encoded == cla::INVALID {
        return Err(Error::InvalidClass(class));
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_interindustry_channels() {
        assert_eq!(encode_channel(0x00, 0).unwrap(), 0x00);
        assert_eq!(encode_channel(0x00, 1).unwrap(), 0x01);
        assert_eq!(encode_channel(0x00, 3).unwrap(), 0x03);
        // caller supplied channel bits are replaced
        assert_eq!(encode_channel(0x02, 1).unwrap(), 0x01);
    }

    #[test]
    fn test_further_interindustry_channels() {
        assert_eq!(encode_channel(0x00, 4).unwrap(), 0x40);
        assert_eq!(encode_channel(0x00, 19).unwrap(), 0x4F);
        assert_eq!(encode_channel(0x10, 5).unwrap(), 0x51);
    }

    #[test]
    fn test_proprietary_and_secure_messaging() {
        // GlobalPlatform MAC class keeps its SM indication
        assert_eq!(encode_channel(0x84, 2).unwrap(), 0x86);
        assert_eq!(encode_channel(0x84, 6).unwrap(), 0xE2);
        assert_eq!(encode_channel(0xE2, 1).unwrap(), 0x89);
        assert_eq!(encode_channel(0x80, 0).unwrap(), 0x80);
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(encode_channel(0xFF, 0), Err(Error::InvalidClass(0xFF)));
        assert_eq!(encode_channel(0x00, 20), Err(Error::InvalidChannel(20)));
        assert_eq!(encode_channel(0xF0, 19), Err(Error::InvalidClass(0xF0)));
    }

    #[test]
    fn test_decode_channel() {
        for channel in 0..=MAX_LOGICAL_CHANNEL {
            let class = encode_channel(0x00, channel).unwrap();
            assert_eq!(decode_channel(class).unwrap(), channel);
        }
        assert!(decode_channel(0xFF).is_err());
    }
}
