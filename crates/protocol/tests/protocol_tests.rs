//! Integration tests for stream selection, device identity, and framing
//!
//! Run with: `cargo test -p protocol --test protocol_tests`

use protocol::{
    HEADER_LEN, MAX_TRANSFER_SIZE, MAX_VIDEO_PAYLOAD, PacketHeader, PacketKind, ProtocolError,
    StreamKind, StreamRequest, matches_identity, parse_serial_identifier, SERIAL_PREFIX,
    USB_PRODUCT_ID, USB_VENDOR_ID,
};
use proptest::prelude::*;

mod stream_request {
    use super::*;

    proptest! {
        #[test]
        fn derived_values_are_pure(video in any::<bool>(), audio in any::<bool>()) {
            let first = StreamRequest::new(video, audio);
            let second = StreamRequest::new(video, audio);
            prop_assert_eq!(&first, &second);

            match first {
                Ok(request) => {
                    prop_assert!(video || audio);
                    prop_assert_eq!(request.wants_video(), video);
                    prop_assert_eq!(request.wants_audio(), audio);
                    prop_assert_eq!(request.magic(), request.kind().magic());
                }
                Err(err) => {
                    prop_assert!(!video && !audio);
                    prop_assert_eq!(err, ProtocolError::EmptyStreamRequest);
                }
            }
        }
    }

    #[test]
    fn test_each_kind_has_distinct_magic() {
        let kinds = [StreamKind::Video, StreamKind::Audio, StreamKind::Both];
        for a in kinds {
            for b in kinds {
                assert_eq!(a == b, a.magic() == b.magic());
            }
        }
    }

    #[test]
    fn test_every_magic_is_a_repeated_byte() {
        for kind in [StreamKind::Video, StreamKind::Audio, StreamKind::Both] {
            let magic = kind.magic();
            assert!(magic.iter().all(|b| *b == magic[0]), "{:?}", kind);
        }
    }
}

mod identity {
    use super::*;

    proptest! {
        #[test]
        fn accepted_serials_always_carry_the_prefix(serial in "\\PC{0,24}") {
            if let Some(identifier) = parse_serial_identifier(&serial) {
                let trimmed = serial.trim();
                prop_assert!(trimmed.to_ascii_lowercase().starts_with(SERIAL_PREFIX));
                prop_assert_eq!(&trimmed[SERIAL_PREFIX.len()..], identifier.as_str());
            }
        }

        #[test]
        fn prefix_is_stripped_exactly(id in "[A-Za-z0-9_-]{1,16}") {
            let serial = format!("{}{}", SERIAL_PREFIX, id);
            prop_assert_eq!(parse_serial_identifier(&serial), Some(id));
        }
    }

    #[test]
    fn test_reference_identity() {
        assert!(matches_identity(USB_VENDOR_ID, USB_PRODUCT_ID));
        assert_eq!(
            parse_serial_identifier("sysdvr:ABC123"),
            Some("ABC123".to_string())
        );
    }
}

mod framing {
    use super::*;

    #[test]
    fn test_largest_frame_fits_one_transfer() {
        assert_eq!(HEADER_LEN + MAX_VIDEO_PAYLOAD, MAX_TRANSFER_SIZE);
    }

    #[test]
    fn test_header_write_then_parse() {
        let header = PacketHeader {
            kind: PacketKind::Video,
            data_size: 1234,
            timestamp_us: 99_000,
        };
        let mut bytes = vec![0u8; HEADER_LEN + 4];
        header.write(&mut bytes);

        // Trailing payload bytes do not affect parsing
        bytes[HEADER_LEN..].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(PacketHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_handshake_magic_is_not_a_packet_magic() {
        for kind in [StreamKind::Video, StreamKind::Audio, StreamKind::Both] {
            let mut bytes = [0u8; HEADER_LEN];
            bytes[..4].copy_from_slice(&kind.magic());
            assert!(matches!(
                PacketHeader::parse(&bytes),
                Err(ProtocolError::UnknownMagic(_))
            ));
        }
    }
}
