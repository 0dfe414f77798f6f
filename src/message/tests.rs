use std::num::NonZeroU32;

use crate::error::Result;
use crate::proto::Endianness;
use crate::{Field, Flags, Message, MessageKind, ObjectPath, Signature};

use super::next_message_size;

#[rustfmt::skip]
const LE_BLOB: [u8; 36] = [
    // fixed header: LE, method_return, NO_REPLY_EXPECTED, version 1
    b'l', 0x02, 0x01, 0x01,
    // body length = 4
    0x04, 0x00, 0x00, 0x00,
    // serial = 0x11223344
    0x44, 0x33, 0x22, 0x11,
    // header field array, 15 bytes
    0x0f, 0x00, 0x00, 0x00,
    // reply serial = 0x0badcafe
    0x05, 0x01, b'u', 0x00,
    0xfe, 0xca, 0xad, 0x0b,
    // signature = u
    0x08, 0x01, b'g', 0x00,
    0x01, b'u', 0x00,
    // padding to 8
    0x00,
    // body: 0xfeedface
    0xce, 0xfa, 0xed, 0xfe,
];

#[rustfmt::skip]
const BE_BLOB: [u8; 36] = [
    // fixed header: BE, method_return, NO_REPLY_EXPECTED, version 1
    b'B', 0x02, 0x01, 0x01,
    // body length = 4
    0x00, 0x00, 0x00, 0x04,
    // serial = 0x11223344
    0x11, 0x22, 0x33, 0x44,
    // header field array, 15 bytes
    0x00, 0x00, 0x00, 0x0f,
    // reply serial = 0x0badcafe
    0x05, 0x01, b'u', 0x00,
    0x0b, 0xad, 0xca, 0xfe,
    // signature = u
    0x08, 0x01, b'g', 0x00,
    0x01, b'u', 0x00,
    // padding to 8
    0x00,
    // body: 0xfeedface
    0xfe, 0xed, 0xfa, 0xce,
];

#[test]
fn parse_little_endian_blob() -> Result<()> {
    let message = Message::parse(&LE_BLOB)?;

    assert_eq!(
        *message.kind(),
        MessageKind::MethodReturn {
            reply_serial: NonZeroU32::new(0x0badcafe).unwrap(),
        }
    );
    assert_eq!(message.serial(), NonZeroU32::new(0x11223344));
    assert!(message.flags() & Flags::NO_REPLY_EXPECTED);
    assert_eq!(message.signature(), Signature::UINT32);

    let mut body = message.body();
    assert_eq!(body.read_u32()?, 0xfeedface);
    body.finish()?;
    Ok(())
}

#[test]
fn parse_big_endian_blob() -> Result<()> {
    // Both byte orders decode to the same message.
    let le = Message::parse(&LE_BLOB)?;
    let be = Message::parse(&BE_BLOB)?;

    assert_eq!(le.kind(), be.kind());
    assert_eq!(le.serial(), be.serial());

    let mut body = be.body();
    assert_eq!(body.read_u32()?, 0xfeedface);
    body.finish()?;
    Ok(())
}

#[test]
fn encode_is_deterministic() -> Result<()> {
    let mut message = Message::method_call(ObjectPath::ROOT, "M")
        .with_interface("x.Y")
        .with_serial(NonZeroU32::new(1).unwrap());

    message.body_buf().append_arguments(Signature::new(b"(yu)")?)?;
    message.body_buf().begin_struct()?;
    message.body_buf().append_byte(0x11)?;
    message.body_buf().append_u32(0x55443322)?;
    message.body_buf().end_struct()?;

    assert_eq!(message.to_wire()?, message.to_wire()?);
    Ok(())
}

#[test]
fn method_call_round_trip() -> Result<()> {
    // The scenario from the wire format documentation: a method call with a
    // single (yu) struct argument.
    for endianness in [Endianness::LITTLE, Endianness::BIG] {
        let mut message = Message::method_call(ObjectPath::ROOT, "M")
            .with_interface("x.Y")
            .with_serial(NonZeroU32::new(1).unwrap());

        *message.body_buf() = crate::BodyBuf::with_endianness(endianness);
        message.body_buf().append_arguments(Signature::new(b"(yu)")?)?;
        message.body_buf().begin_struct()?;
        message.body_buf().append_byte(0x11)?;
        message.body_buf().append_u32(0x55443322)?;
        message.body_buf().end_struct()?;

        let wire = message.to_wire()?;
        let parsed = Message::parse(&wire)?;

        assert!(matches!(
            parsed.kind(),
            MessageKind::MethodCall { path, member }
                if **path == *ObjectPath::ROOT && &**member == "M"
        ));
        assert_eq!(parsed.interface(), Some("x.Y"));
        assert_eq!(parsed.signature().as_str(), "(yu)");

        let mut body = parsed.body();
        assert!(matches!(body.next()?, Some(Field::StructBegin { .. })));
        assert_eq!(body.next()?, Some(Field::Byte(0x11)));
        assert_eq!(body.next()?, Some(Field::UInt32(0x55443322)));
        assert_eq!(body.next()?, Some(Field::StructEnd));
        assert_eq!(body.next()?, None);
    }

    Ok(())
}

#[test]
fn signal_round_trip() -> Result<()> {
    let mut message = Message::signal(ObjectPath::new("/com/example")?, "com.example", "Sig")
        .with_sender(":1.10")
        .with_serial(NonZeroU32::new(9).unwrap());

    message.body_buf().append_arguments(Signature::STRING)?;
    message.body_buf().append_str("payload")?;

    let parsed = Message::parse(&message.to_wire()?)?;

    assert_eq!(parsed.path().map(|p| p.as_str()), Some("/com/example"));
    assert_eq!(parsed.interface(), Some("com.example"));
    assert_eq!(parsed.member(), Some("Sig"));
    assert_eq!(parsed.sender(), Some(":1.10"));

    let mut body = parsed.body();
    assert_eq!(body.read_str()?, "payload");
    Ok(())
}

#[test]
fn error_round_trip() -> Result<()> {
    let message = Message::error("com.example.Error.Failed", NonZeroU32::new(7).unwrap())
        .with_destination(":1.2")
        .with_serial(NonZeroU32::new(8).unwrap());

    let parsed = Message::parse(&message.to_wire()?)?;

    assert_eq!(
        *parsed.kind(),
        MessageKind::Error {
            error_name: Box::from("com.example.Error.Failed"),
            reply_serial: NonZeroU32::new(7).unwrap(),
        }
    );
    Ok(())
}

#[test]
fn next_message_size_peeks() -> Result<()> {
    assert_eq!(next_message_size(&LE_BLOB[..8])?, None);
    assert_eq!(next_message_size(&LE_BLOB)?, Some(36));
    assert_eq!(next_message_size(&BE_BLOB)?, Some(36));
    Ok(())
}

#[test]
fn invalid_endianness_marker() {
    let mut blob = LE_BLOB;
    blob[0] = b'x';
    assert!(Message::parse(&blob).is_err());
}

#[test]
fn invalid_version() {
    let mut blob = LE_BLOB;
    blob[3] = 2;
    assert!(Message::parse(&blob).is_err());
}

#[test]
fn zero_serial_rejected() {
    let mut blob = LE_BLOB;
    blob[8..12].copy_from_slice(&[0, 0, 0, 0]);
    assert!(Message::parse(&blob).is_err());
}

#[test]
fn truncated_message_rejected() {
    assert!(Message::parse(&LE_BLOB[..35]).is_err());
}

#[test]
fn array_length_cap_enforced() -> Result<()> {
    let mut message = Message::method_return(NonZeroU32::new(1).unwrap())
        .with_serial(NonZeroU32::new(2).unwrap());

    message.body_buf().append_arguments(Signature::new(b"ay")?)?;
    message.body_buf().begin_array()?;
    message.body_buf().end_array()?;

    let mut wire = message.to_wire()?;

    // Claim an array length past the cap. The length prefix is the last
    // four bytes of the body.
    let at = wire.len() - 4;
    wire[at..].copy_from_slice(&((1u32 << 26) + 1).to_le_bytes());

    assert!(Message::parse(&wire).is_err());
    Ok(())
}

#[test]
fn message_length_cap_enforced() {
    // A fixed header claiming a body past the whole-message cap.
    let mut blob = [0u8; 16];
    blob[0] = b'l';
    blob[1] = 0x01;
    blob[3] = 0x01;
    blob[4..8].copy_from_slice(&(1u32 << 27).to_le_bytes());
    blob[8..12].copy_from_slice(&1u32.to_le_bytes());

    assert!(next_message_size(&blob).is_err());
}

#[test]
fn string_validation_on_parse() -> Result<()> {
    let mut message = Message::method_return(NonZeroU32::new(1).unwrap())
        .with_serial(NonZeroU32::new(2).unwrap());

    message.body_buf().append_arguments(Signature::STRING)?;
    message.body_buf().append_str("foo")?;

    let wire = message.to_wire()?;

    // The body is the last 8 bytes: length, "foo", NUL.
    let body = wire.len() - 8;

    // Embedded NUL.
    let mut bad = wire.clone();
    bad[body + 5] = 0;
    assert!(Message::parse(&bad).is_err());

    // Invalid UTF-8.
    let mut bad = wire.clone();
    bad[body + 5] = 0xff;
    assert!(Message::parse(&bad).is_err());

    // Missing trailing NUL.
    let mut bad = wire;
    bad[body + 7] = b'x';
    assert!(Message::parse(&bad).is_err());
    Ok(())
}

#[test]
fn overlong_utf8_rejected() -> Result<()> {
    let mut message = Message::method_return(NonZeroU32::new(1).unwrap())
        .with_serial(NonZeroU32::new(2).unwrap());

    message.body_buf().append_arguments(Signature::STRING)?;
    message.body_buf().append_str("ab")?;

    let mut wire = message.to_wire()?;

    // Replace "ab" with the overlong encoding of '/'.
    let body = wire.len() - 7;
    wire[body + 4] = 0xc0;
    wire[body + 5] = 0xaf;

    assert!(Message::parse(&wire).is_err());
    Ok(())
}
