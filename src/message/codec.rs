//! Encoding and decoding of the on-wire message representation.

use std::num::NonZeroU32;
use std::str::from_utf8;

use crate::buf::{padding_to, BodyBuf, OwnedBuf};
use crate::error::{Error, ErrorKind, Result};
use crate::names::{is_valid_bus_name, is_valid_interface_name, is_valid_member_name};
use crate::object_path::ObjectPath;
use crate::proto::{
    self, Endianness, HeaderField, MessageType, Type, EXTENDED_HEADER_SIZE, MAX_ARRAY_LENGTH,
    MAX_MESSAGE_LENGTH,
};
use crate::signature::{next_type, validate, OwnedSignature, Signature};

use super::{Message, MessageKind};

/// The maximum container nesting accepted in a message body.
const MAX_NESTING: usize = 64;

/// Peek the extended header and return the expected total size of the next
/// message, or `None` when not enough bytes are available to determine it.
pub(crate) fn next_message_size(data: &[u8]) -> Result<Option<usize>> {
    if data.len() < EXTENDED_HEADER_SIZE {
        return Ok(None);
    }

    let endianness = match data[0] {
        b'l' => Endianness::LITTLE,
        b'B' => Endianness::BIG,
        _ => return Err(Error::new(ErrorKind::InvalidProtocol)),
    };

    let body_length = read_u32(data, 4, endianness);
    let headers_length = read_u32(data, 12, endianness);

    if headers_length > MAX_ARRAY_LENGTH {
        return Err(Error::new(ErrorKind::ArrayTooLong(headers_length)));
    }

    let headers_end = EXTENDED_HEADER_SIZE + headers_length as usize;
    let total = headers_end + padding_to(8, headers_end) + body_length as usize;

    if total > MAX_MESSAGE_LENGTH as usize {
        return Err(Error::new(ErrorKind::MessageTooLong(total)));
    }

    Ok(Some(total))
}

/// Encode `message` into `buf`, which takes on the byte order of the message
/// body.
pub(crate) fn encode(message: &Message, buf: &mut OwnedBuf) -> Result<()> {
    message.body.ensure_complete()?;

    let Some(serial) = message.serial else {
        return Err(Error::new(ErrorKind::ZeroSerial));
    };

    buf.set_endianness(message.body.endianness());

    buf.store(proto::Header {
        endianness: buf.endianness(),
        message_type: message.message_type(),
        flags: message.flags,
        version: 1,
        body_length: message.body.len() as u32,
        serial: serial.get(),
    });

    let headers_len = buf.alloc::<u32>();
    buf.align(8);
    let start = buf.written();

    match &message.kind {
        MessageKind::MethodCall { path, member } => {
            write_string_field(buf, HeaderField::PATH, Signature::OBJECT_PATH, path.as_bytes());
            write_string_field(buf, HeaderField::MEMBER, Signature::STRING, member.as_bytes());
        }
        MessageKind::MethodReturn { reply_serial } => {
            write_u32_field(buf, HeaderField::REPLY_SERIAL, reply_serial.get());
        }
        MessageKind::Error {
            error_name,
            reply_serial,
        } => {
            write_string_field(
                buf,
                HeaderField::ERROR_NAME,
                Signature::STRING,
                error_name.as_bytes(),
            );
            write_u32_field(buf, HeaderField::REPLY_SERIAL, reply_serial.get());
        }
        MessageKind::Signal {
            path,
            interface,
            member,
        } => {
            write_string_field(buf, HeaderField::PATH, Signature::OBJECT_PATH, path.as_bytes());
            write_string_field(
                buf,
                HeaderField::INTERFACE,
                Signature::STRING,
                interface.as_bytes(),
            );
            write_string_field(buf, HeaderField::MEMBER, Signature::STRING, member.as_bytes());
        }
    }

    if !matches!(message.kind, MessageKind::Signal { .. }) {
        if let Some(interface) = &message.interface {
            write_string_field(
                buf,
                HeaderField::INTERFACE,
                Signature::STRING,
                interface.as_bytes(),
            );
        }
    }

    if let Some(destination) = &message.destination {
        write_string_field(
            buf,
            HeaderField::DESTINATION,
            Signature::STRING,
            destination.as_bytes(),
        );
    }

    if let Some(sender) = &message.sender {
        write_string_field(buf, HeaderField::SENDER, Signature::STRING, sender.as_bytes());
    }

    let signature = message.body.signature();

    if !signature.is_empty() {
        buf.align(8);
        buf.store(HeaderField::SIGNATURE.0);
        buf.store(1u8);
        buf.extend_from_slice_nul(Signature::SIGNATURE.as_bytes());
        buf.store(signature.len() as u8);
        buf.extend_from_slice_nul(signature.as_bytes());
    }

    let len = buf.written() - start;
    buf.store_at(headers_len, len as u32);

    buf.align(8);
    buf.extend_from_slice(message.body.get());

    if buf.written() > MAX_MESSAGE_LENGTH as usize {
        return Err(Error::new(ErrorKind::MessageTooLong(buf.written())));
    }

    Ok(())
}

fn write_string_field(buf: &mut OwnedBuf, field: HeaderField, sig: &Signature, value: &[u8]) {
    buf.align(8);
    buf.store(field.0);
    buf.store(sig.len() as u8);
    buf.extend_from_slice_nul(sig.as_bytes());
    buf.store(value.len() as u32);
    buf.extend_from_slice_nul(value);
}

fn write_u32_field(buf: &mut OwnedBuf, field: HeaderField, value: u32) {
    buf.align(8);
    buf.store(field.0);
    buf.store(1u8);
    buf.extend_from_slice_nul(Signature::UINT32.as_bytes());
    buf.store(value);
}

/// Parse a whole on-wire message.
///
/// The input must be exactly one message. Messages in the non-native byte
/// order are byte-swapped in place while being validated, so the resulting
/// message body is always walked in native order.
pub(crate) fn parse(data: &[u8]) -> Result<Message> {
    let Some(total) = next_message_size(data)? else {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    };

    if data.len() != total {
        return Err(Error::new(ErrorKind::SizeMismatch));
    }

    let endianness = Endianness(data[0]);
    let message_type = MessageType(data[1]);

    if !matches!(
        message_type,
        MessageType::METHOD_CALL | MessageType::METHOD_RETURN | MessageType::ERROR | MessageType::SIGNAL
    ) {
        return Err(Error::new(ErrorKind::InvalidProtocol));
    }

    let flags = proto::Flags(data[2]);
    let version = data[3];

    if version != 1 {
        return Err(Error::new(ErrorKind::InvalidVersion(version)));
    }

    let mut owned = data.to_vec();
    let swap = endianness != Endianness::NATIVE;

    if swap {
        owned[4..8].reverse();
        owned[8..12].reverse();
        owned[12..16].reverse();
    }

    let body_length = read_u32(&owned, 4, Endianness::NATIVE) as usize;
    let serial = read_u32(&owned, 8, Endianness::NATIVE);
    let headers_length = read_u32(&owned, 12, Endianness::NATIVE) as usize;

    let Some(serial) = NonZeroU32::new(serial) else {
        return Err(Error::new(ErrorKind::ZeroSerial));
    };

    let end = EXTENDED_HEADER_SIZE + headers_length;

    let mut path = None;
    let mut interface = None;
    let mut member = None;
    let mut error_name = None;
    let mut reply_serial = None;
    let mut destination = None;
    let mut sender = None;
    let mut body_sig = None;

    let mut pos = EXTENDED_HEADER_SIZE;

    while pos < end {
        pos += padding_to(8, pos);

        if pos + 2 > end {
            return Err(Error::new(ErrorKind::InvalidHeaderField));
        }

        let code = owned[pos];
        pos += 1;

        let sig = read_signature_field(&owned, &mut pos, end)?.to_vec();

        match (HeaderField(code), sig.as_slice()) {
            (HeaderField::PATH, b"o") => {
                path = Some(read_string_value(&mut owned, &mut pos, end, swap)?);
            }
            (HeaderField::INTERFACE, b"s") => {
                interface = Some(read_string_value(&mut owned, &mut pos, end, swap)?);
            }
            (HeaderField::MEMBER, b"s") => {
                member = Some(read_string_value(&mut owned, &mut pos, end, swap)?);
            }
            (HeaderField::ERROR_NAME, b"s") => {
                error_name = Some(read_string_value(&mut owned, &mut pos, end, swap)?);
            }
            (HeaderField::REPLY_SERIAL, b"u") => {
                reply_serial = Some(read_u32_value(&mut owned, &mut pos, end, swap)?);
            }
            (HeaderField::DESTINATION, b"s") => {
                destination = Some(read_string_value(&mut owned, &mut pos, end, swap)?);
            }
            (HeaderField::SENDER, b"s") => {
                sender = Some(read_string_value(&mut owned, &mut pos, end, swap)?);
            }
            (HeaderField::SIGNATURE, b"g") => {
                let mut at = pos;
                let range = {
                    let bytes = read_signature_field(&owned, &mut at, end)?;
                    (at - bytes.len() - 1, at - 1)
                };
                pos = at;
                body_sig = Some(range);
            }
            (
                HeaderField::PATH
                | HeaderField::INTERFACE
                | HeaderField::MEMBER
                | HeaderField::ERROR_NAME
                | HeaderField::REPLY_SERIAL
                | HeaderField::DESTINATION
                | HeaderField::SENDER
                | HeaderField::SIGNATURE,
                _,
            ) => return Err(Error::new(ErrorKind::InvalidHeaderField)),
            _ => {
                // Unknown header fields are skipped, but their contents must
                // still be well-formed (and byte-swapped).
                if next_type(&sig) != Some(sig.len()) {
                    return Err(Error::new(ErrorKind::InvalidHeaderField));
                }

                let (at, _) = walk_value(&mut owned, pos, end, &sig, 0, swap, 0)?;
                pos = at;
            }
        }
    }

    if pos != end {
        return Err(Error::new(ErrorKind::InvalidHeaderField));
    }

    // Validate and byte-swap the body against its declared signature.
    let signature = match body_sig {
        Some((start, end)) => {
            let sig = owned[start..end].to_vec();
            // SAFETY: The signature was validated when the header field was
            // read.
            unsafe { OwnedSignature::from_raw_vec(sig) }
        }
        None => OwnedSignature::new(),
    };

    let body_start = end + padding_to(8, end);
    let body_end = body_start + body_length;

    let mut at = body_start;
    let mut spos = 0;

    while spos < signature.len() {
        let (next_at, next_spos) =
            walk_value(&mut owned, at, body_end, signature.as_bytes(), spos, swap, 0)?;
        at = next_at;
        spos = next_spos;
    }

    if at != body_end {
        return Err(Error::new(ErrorKind::SizeMismatch));
    }

    // Extract and validate the header strings.
    let path = match path {
        Some(range) => {
            let value = str_at(&owned, range)?;
            Some(ObjectPath::new(value)?.to_owned())
        }
        None => None,
    };

    let interface = check_name(&owned, interface, is_valid_interface_name, ErrorKind::InvalidInterfaceName)?;
    let member = check_name(&owned, member, is_valid_member_name, ErrorKind::InvalidMemberName)?;
    let error_name = check_name(&owned, error_name, is_valid_interface_name, ErrorKind::InvalidInterfaceName)?;
    let destination = check_name(&owned, destination, is_valid_bus_name, ErrorKind::InvalidBusName)?;
    let sender = check_name(&owned, sender, is_valid_bus_name, ErrorKind::InvalidBusName)?;

    let reply_serial = match reply_serial {
        Some(value) => {
            let Some(value) = NonZeroU32::new(value) else {
                return Err(Error::new(ErrorKind::ZeroReplySerial));
            };

            Some(value)
        }
        None => None,
    };

    let (kind, interface) = match message_type {
        MessageType::METHOD_CALL => {
            let Some(path) = path else {
                return Err(Error::new(ErrorKind::MissingPath));
            };

            let Some(member) = member else {
                return Err(Error::new(ErrorKind::MissingMember));
            };

            (MessageKind::MethodCall { path, member }, interface)
        }
        MessageType::METHOD_RETURN => {
            let Some(reply_serial) = reply_serial else {
                return Err(Error::new(ErrorKind::MissingReplySerial));
            };

            (MessageKind::MethodReturn { reply_serial }, interface)
        }
        MessageType::ERROR => {
            let Some(error_name) = error_name else {
                return Err(Error::new(ErrorKind::MissingErrorName));
            };

            let Some(reply_serial) = reply_serial else {
                return Err(Error::new(ErrorKind::MissingReplySerial));
            };

            (
                MessageKind::Error {
                    error_name,
                    reply_serial,
                },
                interface,
            )
        }
        MessageType::SIGNAL => {
            let Some(path) = path else {
                return Err(Error::new(ErrorKind::MissingPath));
            };

            let Some(interface) = interface else {
                return Err(Error::new(ErrorKind::MissingInterface));
            };

            let Some(member) = member else {
                return Err(Error::new(ErrorKind::MissingMember));
            };

            (
                MessageKind::Signal {
                    path,
                    interface,
                    member,
                },
                None,
            )
        }
        _ => return Err(Error::new(ErrorKind::InvalidProtocol)),
    };

    let body = BodyBuf::from_parts(
        owned[body_start..body_end].to_vec(),
        signature,
        Endianness::NATIVE,
    );

    Ok(Message {
        kind,
        serial: Some(serial),
        flags,
        interface,
        destination,
        sender,
        body,
    })
}

fn read_u32(data: &[u8], at: usize, endianness: Endianness) -> u32 {
    let bytes = [data[at], data[at + 1], data[at + 2], data[at + 3]];

    match endianness {
        Endianness::BIG => u32::from_be_bytes(bytes),
        _ => u32::from_le_bytes(bytes),
    }
}

fn str_at(data: &[u8], (start, end): (usize, usize)) -> Result<&str> {
    Ok(from_utf8(&data[start..end])?)
}

fn check_name(
    data: &[u8],
    range: Option<(usize, usize)>,
    valid: fn(&str) -> bool,
    kind: ErrorKind,
) -> Result<Option<Box<str>>> {
    let Some(range) = range else {
        return Ok(None);
    };

    let value = str_at(data, range)?;

    if !valid(value) {
        return Err(Error::new(kind));
    }

    Ok(Some(Box::from(value)))
}

/// Read a signature field (u8 length, bytes, NUL) and validate it.
fn read_signature_field<'d>(data: &'d [u8], pos: &mut usize, limit: usize) -> Result<&'d [u8]> {
    if *pos + 1 > limit {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    let len = data[*pos] as usize;
    *pos += 1;

    if *pos + len + 1 > limit {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    let bytes = &data[*pos..*pos + len];

    if data[*pos + len] != 0 {
        return Err(Error::new(ErrorKind::NotNullTerminated));
    }

    validate(bytes)?;
    *pos += len + 1;
    Ok(bytes)
}

/// Read a string value in a header field, returning its byte range. The
/// length prefix is byte-swapped in place when required.
fn read_string_value(
    data: &mut [u8],
    pos: &mut usize,
    limit: usize,
    swap: bool,
) -> Result<(usize, usize)> {
    *pos += padding_to(4, *pos);

    if *pos + 4 > limit {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    if swap {
        data[*pos..*pos + 4].reverse();
    }

    let len = read_u32(data, *pos, Endianness::NATIVE) as usize;
    *pos += 4;

    if *pos + len + 1 > limit {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    if data[*pos + len] != 0 {
        return Err(Error::new(ErrorKind::NotNullTerminated));
    }

    let range = (*pos, *pos + len);

    if data[range.0..range.1].contains(&0) {
        return Err(Error::new(ErrorKind::EmbeddedNull));
    }

    *pos += len + 1;
    Ok(range)
}

fn read_u32_value(data: &mut [u8], pos: &mut usize, limit: usize, swap: bool) -> Result<u32> {
    *pos += padding_to(4, *pos);

    if *pos + 4 > limit {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    if swap {
        data[*pos..*pos + 4].reverse();
    }

    let value = read_u32(data, *pos, Endianness::NATIVE);
    *pos += 4;
    Ok(value)
}

/// Walk one complete value at `sig[spos]`, validating it and byte-swapping
/// fixed-width scalars in place when `swap` is set.
///
/// Returns the updated data offset and signature position.
fn walk_value(
    data: &mut Vec<u8>,
    at: usize,
    limit: usize,
    sig: &[u8],
    spos: usize,
    swap: bool,
    depth: usize,
) -> Result<(usize, usize)> {
    if depth > MAX_NESTING {
        return Err(Error::new(ErrorKind::InvalidProtocol));
    }

    let Some(&code) = sig.get(spos) else {
        return Err(Error::new(ErrorKind::InvalidProtocol));
    };

    match Type(code) {
        Type::BYTE => {
            let at = advance(at, 1, 1, limit)?;
            Ok((at, spos + 1))
        }
        Type::BOOLEAN => {
            let start = aligned(at, 4, limit)?;
            let at = advance(at, 4, 4, limit)?;

            if swap {
                data[start..start + 4].reverse();
            }

            let value = read_u32(data, start, Endianness::NATIVE);

            if value > 1 {
                return Err(Error::new(ErrorKind::InvalidBoolean(value)));
            }

            Ok((at, spos + 1))
        }
        Type::INT16 | Type::UINT16 => {
            let start = aligned(at, 2, limit)?;
            let at = advance(at, 2, 2, limit)?;

            if swap {
                data[start..start + 2].reverse();
            }

            Ok((at, spos + 1))
        }
        Type::INT32 | Type::UINT32 => {
            let start = aligned(at, 4, limit)?;
            let at = advance(at, 4, 4, limit)?;

            if swap {
                data[start..start + 4].reverse();
            }

            Ok((at, spos + 1))
        }
        Type::INT64 | Type::UINT64 | Type::DOUBLE => {
            let start = aligned(at, 8, limit)?;
            let at = advance(at, 8, 8, limit)?;

            if swap {
                data[start..start + 8].reverse();
            }

            Ok((at, spos + 1))
        }
        Type::STRING | Type::OBJECT_PATH => {
            let mut pos = at;
            let range = read_string_value(data, &mut pos, limit, swap)?;
            let value = from_utf8(&data[range.0..range.1])?;

            if code == Type::OBJECT_PATH.0 && ObjectPath::new(value).is_err() {
                return Err(Error::new(ErrorKind::InvalidProtocol));
            }

            Ok((pos, spos + 1))
        }
        Type::SIGNATURE => {
            let mut pos = at;
            read_signature_field(data, &mut pos, limit)?;
            Ok((pos, spos + 1))
        }
        Type::ARRAY => {
            let element_start = spos + 1;

            let Some(n) = next_type(&sig[element_start..]) else {
                return Err(Error::new(ErrorKind::InvalidProtocol));
            };

            let element_end = element_start + n;

            let start = aligned(at, 4, limit)?;
            let mut at = advance(at, 4, 4, limit)?;

            if swap {
                data[start..start + 4].reverse();
            }

            let len = read_u32(data, start, Endianness::NATIVE);

            if len > MAX_ARRAY_LENGTH {
                return Err(Error::new(ErrorKind::ArrayTooLong(len)));
            }

            at = aligned(at, Type(sig[element_start]).alignment(), limit)?;
            let data_end = at + len as usize;

            if data_end > limit {
                return Err(Error::new(ErrorKind::BufferUnderflow));
            }

            while at < data_end {
                let (next_at, _) =
                    walk_value(data, at, data_end, sig, element_start, swap, depth + 1)?;
                at = next_at;
            }

            if at != data_end {
                return Err(Error::new(ErrorKind::SizeMismatch));
            }

            Ok((at, element_end))
        }
        Type::OPEN_PAREN => {
            let mut at = aligned(at, 8, limit)?;
            let mut spos = spos + 1;

            while sig.get(spos) != Some(&Type::CLOSE_PAREN.0) {
                let (next_at, next_spos) = walk_value(data, at, limit, sig, spos, swap, depth + 1)?;
                at = next_at;
                spos = next_spos;
            }

            Ok((at, spos + 1))
        }
        Type::OPEN_BRACE => {
            let mut at = aligned(at, 8, limit)?;
            let mut spos = spos + 1;

            while sig.get(spos) != Some(&Type::CLOSE_BRACE.0) {
                let (next_at, next_spos) = walk_value(data, at, limit, sig, spos, swap, depth + 1)?;
                at = next_at;
                spos = next_spos;
            }

            Ok((at, spos + 1))
        }
        Type::VARIANT => {
            let mut pos = at;
            let inner = read_signature_field(data, &mut pos, limit)?.to_vec();

            if inner.is_empty() || next_type(&inner) != Some(inner.len()) {
                return Err(Error::new(ErrorKind::InvalidVariant));
            }

            let (at, _) = walk_value(data, pos, limit, &inner, 0, swap, depth + 1)?;
            Ok((at, spos + 1))
        }
        _ => Err(Error::new(ErrorKind::InvalidProtocol)),
    }
}

/// Align `at`, checking bounds.
fn aligned(at: usize, align: usize, limit: usize) -> Result<usize> {
    let at = at + padding_to(align, at);

    if at > limit {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    Ok(at)
}

/// Align `at` and advance it past `size` bytes, checking bounds.
fn advance(at: usize, align: usize, size: usize, limit: usize) -> Result<usize> {
    let at = aligned(at, align, limit)?;

    if at + size > limit {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    Ok(at + size)
}
