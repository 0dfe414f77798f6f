//! Low level details for the D-Bus protocol implementation.

use crate::frame::Frame;

/// The maximum length in bytes of the data section of an array.
pub(crate) const MAX_ARRAY_LENGTH: u32 = 1u32 << 26;
/// The maximum length in bytes of a whole message.
pub(crate) const MAX_MESSAGE_LENGTH: u32 = 1u32 << 27;

/// The fixed part of a message header.
///
/// On the wire this is followed by the `a(yv)` header field array, padding to
/// an 8-byte boundary, and the body.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct Header {
    pub(crate) endianness: Endianness,
    pub(crate) message_type: MessageType,
    pub(crate) flags: Flags,
    pub(crate) version: u8,
    pub(crate) body_length: u32,
    pub(crate) serial: u32,
}

/// Size of the fixed header plus the header field array length prefix.
pub(crate) const EXTENDED_HEADER_SIZE: usize = 16;

unsafe impl Frame for Header {
    fn adjust(&mut self, endianness: Endianness) {
        self.body_length.adjust(endianness);
        self.serial.adjust(endianness);
    }
}

raw_enum! {
    /// The endianness of a message.
    #[repr(u8)]
    pub enum Endianness {
        /// Little endian.
        LITTLE = b'l',
        /// Big endian.
        BIG = b'B',
    }
}

impl Endianness {
    /// Native endian.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Self::LITTLE;
    /// Native endian.
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = Self::BIG;
}

raw_enum! {
    /// The type of a message.
    #[repr(u8)]
    pub enum MessageType {
        /// Method call. This message type may prompt a reply.
        METHOD_CALL = 1,
        /// Method reply with returned data.
        METHOD_RETURN = 2,
        /// Error reply. If the first argument exists and is a string, it is an
        /// error message.
        ERROR = 3,
        /// Signal emission.
        SIGNAL = 4,
    }
}

raw_set! {
    /// Flags inside of a D-Bus message.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_wire::Flags;
    ///
    /// let flags = Flags::EMPTY;
    /// assert!(!(flags & Flags::NO_REPLY_EXPECTED));
    ///
    /// let flags = Flags::EMPTY | Flags::NO_REPLY_EXPECTED;
    /// assert!(flags & Flags::NO_REPLY_EXPECTED);
    /// assert!(!(flags & Flags::NO_AUTO_START));
    /// ```
    #[repr(u8)]
    pub enum Flags {
        /// An empty set of flags.
        EMPTY = 0,
        /// This message does not expect method return replies or error
        /// replies, even if it is of a type that can have a reply; the reply
        /// should be omitted.
        NO_REPLY_EXPECTED = 1,
        /// The bus must not launch an owner for the destination name in
        /// response to this message.
        NO_AUTO_START = 2,
    }
}

raw_enum! {
    /// Field codes in the message header field array.
    #[repr(u8)]
    pub(crate) enum HeaderField {
        /// The object to send a call to, or the object a signal is emitted
        /// from.
        PATH = 1,
        /// The interface to invoke a method call on, or that a signal is
        /// emitted from. Optional for method calls, required for signals.
        INTERFACE = 2,
        /// The member, either the method name or signal name.
        MEMBER = 3,
        /// The name of the error that occurred, for errors.
        ERROR_NAME = 4,
        /// The serial number of the message this message is a reply to.
        REPLY_SERIAL = 5,
        /// The name of the connection this message is intended for.
        DESTINATION = 6,
        /// Unique name of the sending connection.
        SENDER = 7,
        /// The signature of the message body. If omitted, it is assumed to be
        /// the empty signature "" (i.e. the body must be 0-length).
        SIGNATURE = 8,
    }
}

unsafe impl Frame for HeaderField {
    #[inline]
    fn adjust(&mut self, _: Endianness) {
        // Single byte, nothing to adjust.
    }
}

raw_enum! {
    /// The type codes which may appear inside of a signature.
    #[repr(u8)]
    pub(crate) enum Type {
        /// Not a valid type code, used to terminate signatures.
        INVALID = b'\0',
        /// 8-bit unsigned integer.
        BYTE = b'y',
        /// Boolean value, 0 is FALSE and 1 is TRUE. Everything else is
        /// invalid.
        BOOLEAN = b'b',
        /// 16-bit signed integer.
        INT16 = b'n',
        /// 16-bit unsigned integer.
        UINT16 = b'q',
        /// 32-bit signed integer.
        INT32 = b'i',
        /// 32-bit unsigned integer.
        UINT32 = b'u',
        /// 64-bit signed integer.
        INT64 = b'x',
        /// 64-bit unsigned integer.
        UINT64 = b't',
        /// IEEE 754 double.
        DOUBLE = b'd',
        /// UTF-8 string. Must be nul terminated and contain no other nul
        /// bytes.
        STRING = b's',
        /// Name of an object instance.
        OBJECT_PATH = b'o',
        /// A type signature.
        SIGNATURE = b'g',
        /// Array.
        ARRAY = b'a',
        /// Variant type (the type of the value is part of the value itself).
        VARIANT = b'v',
        OPEN_PAREN = b'(',
        CLOSE_PAREN = b')',
        OPEN_BRACE = b'{',
        CLOSE_BRACE = b'}',
    }
}

impl Type {
    /// The wire alignment required by this type code.
    pub(crate) fn alignment(self) -> usize {
        match self {
            Type::BYTE | Type::SIGNATURE | Type::VARIANT => 1,
            Type::INT16 | Type::UINT16 => 2,
            Type::BOOLEAN | Type::INT32 | Type::UINT32 => 4,
            Type::STRING | Type::OBJECT_PATH | Type::ARRAY => 4,
            Type::INT64 | Type::UINT64 | Type::DOUBLE => 8,
            Type::OPEN_PAREN | Type::OPEN_BRACE => 8,
            _ => 1,
        }
    }

}
