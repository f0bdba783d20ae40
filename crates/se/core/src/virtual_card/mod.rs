//! Virtual reader and card
//!
//! A software card that speaks enough ISO 7816-4 (MANAGE CHANNEL, SELECT by name with next
//! occurrence, GET RESPONSE) to drive the service without hardware.

mod card;
mod reader;

pub use card::{Applet, EchoApplet, VirtualCard, build_atr};
pub use reader::{VirtualReader, VirtualReaders, VirtualTransport};
