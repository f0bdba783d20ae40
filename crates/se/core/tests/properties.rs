//! Property-based tests for AIDs, class byte encoding and channel allocation.

mod common;

use std::collections::BTreeSet;

use common::{ECHO_AID, Fixture, echo_card};
use nexum_se::apdu::class::{decode_channel, encode_channel, has_secure_messaging};
use nexum_se::{Aid, ChannelKind, Error, MAX_AID_LENGTH, MIN_AID_LENGTH, SeConfig};
use proptest::prelude::*;

/// Class bytes a caller may legitimately send
fn valid_class() -> impl Strategy<Value = u8> {
    any::<u8>().prop_filter("FF is reserved", |cla| *cla != 0xFF)
}

/// Open (true) or close (false, by index into the open set) operations
fn channel_ops() -> impl Strategy<Value = Vec<(bool, usize)>> {
    prop::collection::vec((any::<bool>(), 0usize..8), 1..40)
}

proptest! {
    /// Property: AIDs are accepted exactly when their length is within bounds.
    #[test]
    fn prop_aid_length_bounds(bytes in prop::collection::vec(any::<u8>(), 0..24)) {
        let result = Aid::from_bytes(&bytes);
        if (MIN_AID_LENGTH..=MAX_AID_LENGTH).contains(&bytes.len()) {
            let aid = result.unwrap();
            prop_assert_eq!(aid.as_bytes(), &bytes[..]);
            prop_assert_eq!(aid.refcount(), 1);
        } else {
            let is_invalid_length = matches!(result, Err(Error::InvalidLength { .. }));
            prop_assert!(is_invalid_length);
        }
    }

    /// Property: every acquire is matched by exactly one release.
    #[test]
    fn prop_aid_refcount(extra in 0usize..16) {
        let aid = Aid::from_bytes(&ECHO_AID).unwrap();
        let copies: Vec<Aid> = (0..extra).map(|_| aid.acquire()).collect();
        prop_assert_eq!(aid.refcount(), extra + 1);

        for (released, copy) in copies.into_iter().enumerate() {
            prop_assert_eq!(copy.release(), extra - released);
        }
        prop_assert_eq!(aid.release(), 0);
    }

    /// Property: the channel number written into a class byte reads back unchanged and the
    /// proprietary and secure messaging indications survive.
    #[test]
    fn prop_class_channel_encoding(class in valid_class(), channel in 0u8..=19) {
        match encode_channel(class, channel) {
            Ok(encoded) => {
                prop_assert_eq!(decode_channel(encoded).unwrap(), channel);
                prop_assert_eq!(encoded & 0x80, class & 0x80);
                prop_assert_eq!(has_secure_messaging(encoded), has_secure_messaging(class));
                prop_assert_ne!(encoded, 0xFF);
            }
            Err(_) => {
                // only the combination that would produce the reserved FF is refused
                prop_assert_eq!(channel, 19);
                prop_assert_eq!(class & 0x90, 0x90);
                prop_assert!(has_secure_messaging(class));
            }
        }
    }

    /// Property: open logical channels always carry distinct numbers within the configured
    /// limit, whatever the order of opens and closes.
    #[test]
    fn prop_channel_numbers_distinct(ops in channel_ops()) {
        const LIMIT: usize = 6;
        let fx = Fixture::with_config(
            echo_card(),
            SeConfig::new().with_max_logical_channels(LIMIT as u8),
        );
        let session = fx.service.open_session(fx.handle).unwrap();
        let mut open = Vec::new();

        for (is_open, index) in ops {
            if is_open {
                match fx.service.open_channel(session, ChannelKind::Logical, None) {
                    Ok(channel) => open.push(channel),
                    Err(e) => {
                        prop_assert_eq!(e, Error::NoChannelAvailable);
                        prop_assert_eq!(open.len(), LIMIT);
                    }
                }
            } else if !open.is_empty() {
                let channel = open.remove(index % open.len());
                prop_assert!(fx.service.close_channel(channel).is_ok());
            }

            let numbers: BTreeSet<u8> = open
                .iter()
                .map(|c| fx.service.channel_number(*c).unwrap())
                .collect();
            prop_assert_eq!(numbers.len(), open.len());
            prop_assert!(numbers.iter().all(|n| (1..=LIMIT as u8).contains(n)));
        }
    }

    /// Property: a short buffer is never written and reports the exact size needed.
    #[test]
    fn prop_short_buffer(len in 0usize..32) {
        let fx = Fixture::new(echo_card());
        let name = fx.service.reader_name(fx.handle).unwrap();
        let mut buf = vec![0xEE; len];

        match fx.service.reader_name_into(fx.handle, &mut buf) {
            Ok(written) => {
                prop_assert!(len >= name.len());
                prop_assert_eq!(&buf[..written], name.as_bytes());
            }
            Err(e) => {
                prop_assert!(len < name.len());
                prop_assert_eq!(e, Error::ShortBuffer { required: name.len() });
                prop_assert!(buf.iter().all(|b| *b == 0xEE));
            }
        }
    }
}
