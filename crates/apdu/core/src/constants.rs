//! ISO/IEC 7816-4 constants used by the channel management protocol

/// Command classes
pub mod cla {
    /// Interindustry class, basic channel, no secure messaging
    pub const ISO7816: u8 = 0x00;
    /// Proprietary class bit (b8)
    pub const PROPRIETARY: u8 = 0x80;
    /// Invalid class value, reserved for PPS
    pub const INVALID: u8 = 0xFF;
}

/// Instruction codes
pub mod ins {
    /// SELECT
    pub const SELECT: u8 = 0xA4;
    /// MANAGE CHANNEL
    pub const MANAGE_CHANNEL: u8 = 0x70;
    /// GET RESPONSE
    pub const GET_RESPONSE: u8 = 0xC0;
}

/// SELECT P1 values
pub mod select_p1 {
    /// Select by DF name (application identifier)
    pub const BY_NAME: u8 = 0x04;
}

/// SELECT P2 values (file occurrence)
pub mod select_p2 {
    /// First or only occurrence, return FCI
    pub const FIRST: u8 = 0x00;
    /// Next occurrence
    pub const NEXT: u8 = 0x02;
}

/// MANAGE CHANNEL P1 values
pub mod manage_channel_p1 {
    /// Open a logical channel
    pub const OPEN: u8 = 0x00;
    /// Close a logical channel
    pub const CLOSE: u8 = 0x80;
}
