//! Utility functions for the secure element shell

pub mod reader;

use std::error::Error;
use std::fmt::Write;

use iso7816_tlv::ber::{Tlv, Value};
use nexum_se::apdu::StatusWord;

/// Parse a hex string, ignoring embedded whitespace
pub fn parse_hex(input: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}

/// Render a response as data and status word
pub fn format_response(response: &[u8]) -> String {
    let [data @ .., sw1, sw2] = response else {
        return hex::encode_upper(response);
    };
    let status = StatusWord::new(*sw1, *sw2);
    let sw = format!("SW {:02X}{:02X} ({})", sw1, sw2, status.description());
    if data.is_empty() {
        sw
    } else {
        format!("{} {sw}", hex::encode_upper(data))
    }
}

/// Render BER-TLV encoded select response data as an indented tree
///
/// Returns `None` when the data is not well formed BER-TLV.
pub fn format_fci(data: &[u8]) -> Option<String> {
    let mut out = String::new();
    let mut rest = data;
    while !rest.is_empty() {
        let (tlv, remaining) = Tlv::parse(rest);
        write_tlv(&mut out, &tlv.ok()?, 0);
        rest = remaining;
    }
    Some(out)
}

fn write_tlv(out: &mut String, tlv: &Tlv, depth: usize) {
    let tag = hex::encode_upper(tlv.tag().to_bytes());
    match tlv.value() {
        Value::Primitive(bytes) => {
            let _ = writeln!(out, "{:indent$}{tag}: {}", "", hex::encode_upper(bytes), indent = depth * 2);
        }
        Value::Constructed(children) => {
            let _ = writeln!(out, "{:indent$}{tag}:", "", indent = depth * 2);
            for child in children {
                write_tlv(out, child, depth + 1);
            }
        }
    }
}
