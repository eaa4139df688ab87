//! Integration tests for the wire protocol.

use bytes::{Bytes, BytesMut};
use dali_types::{Cursor, InfoKind, Packet, PacketId, PacketTime, WritePacket};

use crate::capabilities::{Capabilities, ProtocolVersion};
use crate::error::WireError;
use crate::frame::{Direction, Frame, MAX_PAYLOAD_SIZE};
use crate::message::{Command, Position, Reply};

fn sample_packet() -> Packet {
    Packet {
        stream_id: "IU_ANMO_00_BHZ/MSEED".to_string(),
        id: PacketId::new(1234),
        time: PacketTime::from_micros(1_700_000_000_500_000),
        data_start: PacketTime::from_micros(1_700_000_000_000_000),
        data_end: PacketTime::from_micros(1_700_000_000_400_000),
        payload: Bytes::from(vec![7u8; 512]),
    }
}

/// Pushes a frame through the byte encoding and back.
fn over_the_wire(frame: &Frame, direction: Direction) -> Frame {
    let mut buf = BytesMut::from(&frame.encode_to_bytes()[..]);
    let decoded = Frame::decode(&mut buf, direction, MAX_PAYLOAD_SIZE)
        .unwrap()
        .unwrap();
    assert!(buf.is_empty());
    decoded
}

// ============================================================================
// Commands
// ============================================================================

#[test]
fn test_identify_header() {
    let frame = Command::Identify {
        client_id: "slarchive:alice:123:x86_64".to_string(),
    }
    .to_frame()
    .unwrap();

    assert_eq!(frame.header, "ID slarchive:alice:123:x86_64");
    assert!(frame.payload.is_empty());
}

#[test]
fn test_identify_rejects_whitespace() {
    let result = Command::Identify {
        client_id: "two words".to_string(),
    }
    .to_frame();

    assert!(matches!(
        result,
        Err(WireError::InvalidField {
            field: "client id",
            ..
        })
    ));
}

#[test]
fn test_match_pattern_travels_in_payload() {
    // Patterns may contain spaces and be longer than any header.
    let pattern = format!("^(IU|II)_.* {}", "X".repeat(400));
    let frame = Command::Match {
        pattern: pattern.clone(),
    }
    .to_frame()
    .unwrap();

    assert_eq!(frame.header, format!("MATCH {}", pattern.len()));

    let decoded = Command::from_frame(&over_the_wire(&frame, Direction::ToServer)).unwrap();
    assert_eq!(decoded, Command::Match { pattern });
}

#[test]
fn test_position_headers() {
    let cursor = Cursor::new(PacketId::new(42), PacketTime::from_micros(1_000_001));

    let set = Command::Position(Position::Packet(cursor)).to_frame().unwrap();
    assert_eq!(set.header, "POSITION SET 42 1000001");

    let earliest = Command::Position(Position::Earliest).to_frame().unwrap();
    assert_eq!(earliest.header, "POSITION SET EARLIEST");

    let after = Command::PositionAfter {
        data_time: PacketTime::from_micros(5),
    }
    .to_frame()
    .unwrap();
    assert_eq!(after.header, "POSITION AFTER 5");

    assert_eq!(
        Command::from_frame(&set).unwrap(),
        Command::Position(Position::Packet(cursor))
    );
    assert_eq!(
        Command::from_frame(&Command::Position(Position::Latest).to_frame().unwrap()).unwrap(),
        Command::Position(Position::Latest)
    );
}

#[test]
fn test_write_command() {
    let packet = WritePacket::new(
        "XX_TEST/RAW",
        PacketTime::from_micros(10),
        PacketTime::from_micros(20),
        Bytes::from_static(b"payload"),
    );
    let frame = Command::Write {
        packet: packet.clone(),
        ack: true,
    }
    .to_frame()
    .unwrap();

    assert_eq!(frame.header, "WRITE XX_TEST/RAW 10 20 A 7");

    let decoded = Command::from_frame(&over_the_wire(&frame, Direction::ToServer)).unwrap();
    assert_eq!(decoded, Command::Write { packet, ack: true });
}

#[test]
fn test_write_rejects_bad_stream_id() {
    let packet = WritePacket::new("", PacketTime::ZERO, PacketTime::ZERO, Bytes::new());
    let result = Command::Write { packet, ack: false }.to_frame();
    assert!(matches!(result, Err(WireError::InvalidField { .. })));
}

#[test]
fn test_info_command_with_and_without_pattern() {
    let plain = Command::Info {
        kind: InfoKind::Status,
        pattern: None,
    };
    assert_eq!(plain.to_frame().unwrap().header, "INFO STATUS");

    let matching = Command::Info {
        kind: InfoKind::Streams,
        pattern: Some("IU_.*".to_string()),
    };
    let frame = matching.to_frame().unwrap();
    assert_eq!(frame.header, "INFO STREAMS IU_.*");
    assert_eq!(
        Command::from_frame(&over_the_wire(&frame, Direction::ToServer)).unwrap(),
        matching
    );
}

#[test]
fn test_unknown_command() {
    let frame = Frame::header_only("FROB 1").unwrap();
    assert!(matches!(
        Command::from_frame(&frame),
        Err(WireError::UnknownMessage(_))
    ));
}

// ============================================================================
// Replies
// ============================================================================

#[test]
fn test_packet_reply_cycle() {
    let packet = sample_packet();
    let frame = Reply::Packet(packet.clone()).to_frame().unwrap();

    assert_eq!(
        frame.header,
        "PACKET IU_ANMO_00_BHZ/MSEED 1234 1700000000500000 1700000000000000 1700000000400000 512"
    );

    let decoded = Reply::from_frame(&over_the_wire(&frame, Direction::ToClient)).unwrap();
    assert_eq!(decoded, Reply::Packet(packet));
}

#[test]
fn test_packet_reply_with_bad_id() {
    let frame = Frame::header_only("PACKET X abc 1 2 3 0").unwrap();
    assert!(matches!(
        Reply::from_frame(&frame),
        Err(WireError::Malformed { .. })
    ));
}

#[test]
fn test_ok_and_error_messages() {
    let ok = Reply::Ok {
        value: 17,
        message: "17 streams matched".to_string(),
    };
    let decoded = Reply::from_frame(&over_the_wire(&ok.to_frame().unwrap(), Direction::ToClient))
        .unwrap();
    assert_eq!(decoded, ok);

    // Servers may NUL-terminate message text.
    let frame = Frame::new("ERROR 0 9", Bytes::from_static(b"not found")).unwrap();
    let padded = Frame::new("ERROR 0 11", Bytes::from_static(b"not found\0\0")).unwrap();
    for frame in [frame, padded] {
        assert_eq!(
            Reply::from_frame(&frame).unwrap(),
            Reply::Error {
                value: 0,
                message: "not found".to_string()
            }
        );
    }
}

#[test]
fn test_info_reply_keeps_xml_verbatim() {
    let xml = "<DataLink Version=\"1.0\"><Status StartTime=\"2024-01-01\"/></DataLink>";
    let reply = Reply::Info {
        kind: InfoKind::Status,
        xml: xml.to_string(),
    };

    let decoded =
        Reply::from_frame(&over_the_wire(&reply.to_frame().unwrap(), Direction::ToClient))
            .unwrap();
    assert_eq!(decoded, reply);
}

#[test]
fn test_id_reply_with_capabilities() {
    let frame = Frame::header_only("ID DataLink 2020.075 :: DLPROTO:1.0 PACKETSIZE:512 WRITE")
        .unwrap();

    let Reply::Id {
        server,
        capabilities,
    } = Reply::from_frame(&frame).unwrap()
    else {
        panic!("expected ID reply");
    };

    assert_eq!(server, "DataLink 2020.075");
    assert_eq!(capabilities.protocol_version, Some(ProtocolVersion::new(1, 0)));
    assert_eq!(capabilities.packet_size, Some(512));
    assert!(capabilities.write);
}

#[test]
fn test_id_reply_without_capabilities() {
    let frame = Frame::header_only("ID DataLink 2008.123").unwrap();
    let reply = Reply::from_frame(&frame).unwrap();

    assert_eq!(
        reply,
        Reply::Id {
            server: "DataLink 2008.123".to_string(),
            capabilities: Capabilities::default(),
        }
    );
    assert_eq!(reply.to_frame().unwrap(), frame);
}

#[test]
fn test_capabilities_any_order_and_unknown_tokens() {
    let capabilities = Capabilities::parse("WRITE FOO:bar PACKETSIZE:1024 DLPROTO:1 PACKETSIZE:x");

    assert!(capabilities.write);
    assert_eq!(capabilities.packet_size, Some(1024));
    assert_eq!(capabilities.protocol_version, Some(ProtocolVersion::new(1, 0)));
    assert_eq!(capabilities.other, vec!["FOO:bar", "PACKETSIZE:x"]);
}

#[test]
fn test_protocol_version_default_is_unknown() {
    assert!(ProtocolVersion::default().is_unknown());
    assert_eq!(ProtocolVersion::default().to_string(), "0.0");
    assert!("one.two".parse::<ProtocolVersion>().is_err());
}

// ============================================================================
// Stream decoding
// ============================================================================

#[test]
fn test_streaming_decode() {
    // Simulate receiving bytes one at a time
    let wire_bytes = Reply::Packet(sample_packet())
        .to_frame()
        .unwrap()
        .encode_to_bytes();
    let mut buf = BytesMut::new();

    for (i, &byte) in wire_bytes.iter().enumerate() {
        buf.extend_from_slice(&[byte]);
        let result = Frame::decode(&mut buf, Direction::ToClient, MAX_PAYLOAD_SIZE).unwrap();

        if i + 1 < wire_bytes.len() {
            assert!(result.is_none(), "decoded early at byte {i}");
            assert_eq!(buf.len(), i + 1);
        } else {
            let frame = result.expect("complete frame");
            assert_eq!(Reply::from_frame(&frame).unwrap(), Reply::Packet(sample_packet()));
        }
    }
}

#[test]
fn test_large_payload() {
    let mut packet = sample_packet();
    packet.payload = Bytes::from(vec![1u8; 100_000]);

    let frame = Reply::Packet(packet).to_frame().unwrap();
    let decoded = Reply::from_frame(&over_the_wire(&frame, Direction::ToClient)).unwrap();

    let Reply::Packet(decoded) = decoded else {
        panic!("expected PACKET reply");
    };
    assert_eq!(decoded.size(), 100_000);
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn packet_header_fields_survive(
            id in 0i64..i64::MAX,
            time in any::<i64>(),
            start in any::<i64>(),
            stream in "[A-Z0-9_]{1,40}/[A-Z]{2,6}",
            payload in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            let packet = Packet {
                stream_id: stream,
                id: PacketId::new(id),
                time: PacketTime::from_micros(time),
                data_start: PacketTime::from_micros(start),
                data_end: PacketTime::from_micros(start),
                payload: Bytes::from(payload),
            };

            let frame = Reply::Packet(packet.clone()).to_frame().unwrap();
            let decoded = Reply::from_frame(&over_the_wire(&frame, Direction::ToClient)).unwrap();
            prop_assert_eq!(decoded, Reply::Packet(packet));
        }
    }
}
