use std::num::NonZeroU32;

use crate::buf::{Body, BodyBuf};
use crate::error::Result;
use crate::object_path::ObjectPath;
use crate::proto::{Flags, MessageType};
use crate::signature::Signature;

use super::MessageKind;

/// A D-Bus message: header fields plus a marshalled body.
///
/// # Examples
///
/// ```
/// use dbus_wire::{Message, MessageKind, ObjectPath, Signature};
///
/// const PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");
///
/// let mut m = Message::method_call(PATH, "Hello")
///     .with_destination("org.freedesktop.DBus");
///
/// m.body_buf().append_arguments(Signature::STRING)?;
/// m.body_buf().append_str("hello")?;
///
/// assert!(matches!(m.kind(), MessageKind::MethodCall { .. }));
/// assert_eq!(m.signature(), Signature::STRING);
/// # Ok::<_, dbus_wire::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The type of the message.
    pub(crate) kind: MessageKind,
    /// Serial of the message, assigned when it is sent.
    pub(crate) serial: Option<NonZeroU32>,
    /// Flags in the message.
    pub(crate) flags: Flags,
    /// The interface of a method call.
    pub(crate) interface: Option<Box<str>>,
    /// The destination of the message.
    pub(crate) destination: Option<Box<str>>,
    /// The sender of the message.
    pub(crate) sender: Option<Box<str>>,
    /// The body associated with the message.
    pub(crate) body: BodyBuf,
}

impl Message {
    fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            serial: None,
            flags: Flags::EMPTY,
            interface: None,
            destination: None,
            sender: None,
            body: BodyBuf::new(),
        }
    }

    /// Construct a method call message.
    pub fn method_call(path: &ObjectPath, member: &str) -> Self {
        Self::new(MessageKind::MethodCall {
            path: path.to_owned(),
            member: member.into(),
        })
    }

    /// Construct a method return message replying to `reply_serial`.
    pub fn method_return(reply_serial: NonZeroU32) -> Self {
        Self::new(MessageKind::MethodReturn { reply_serial })
    }

    /// Construct an error message replying to `reply_serial`.
    pub fn error(error_name: &str, reply_serial: NonZeroU32) -> Self {
        Self::new(MessageKind::Error {
            error_name: error_name.into(),
            reply_serial,
        })
    }

    /// Construct a signal message.
    pub fn signal(path: &ObjectPath, interface: &str, member: &str) -> Self {
        Self::new(MessageKind::Signal {
            path: path.to_owned(),
            interface: interface.into(),
            member: member.into(),
        })
    }

    /// Derive a method return for this message, with sender and destination
    /// swapped.
    ///
    /// # Panics
    ///
    /// Panics if this message has not been assigned a serial.
    pub fn reply(&self) -> Self {
        let serial = self.serial.expect("reply to a message without a serial");

        Self {
            kind: MessageKind::MethodReturn {
                reply_serial: serial,
            },
            serial: None,
            flags: Flags::EMPTY,
            interface: None,
            destination: self.sender.clone(),
            sender: self.destination.clone(),
            body: BodyBuf::with_endianness(self.body.endianness()),
        }
    }

    /// Derive an error reply for this message, with sender and destination
    /// swapped.
    ///
    /// # Panics
    ///
    /// Panics if this message has not been assigned a serial.
    pub fn error_reply(&self, error_name: &str) -> Self {
        let serial = self.serial.expect("reply to a message without a serial");

        Self {
            kind: MessageKind::Error {
                error_name: error_name.into(),
                reply_serial: serial,
            },
            serial: None,
            flags: Flags::EMPTY,
            interface: None,
            destination: self.sender.clone(),
            sender: self.destination.clone(),
            body: BodyBuf::with_endianness(self.body.endianness()),
        }
    }

    /// Get the kind of the message.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// The object path of a method call or signal.
    pub fn path(&self) -> Option<&ObjectPath> {
        match &self.kind {
            MessageKind::MethodCall { path, .. } => Some(path),
            MessageKind::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The member of a method call or signal.
    pub fn member(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::MethodCall { member, .. } => Some(member),
            MessageKind::Signal { member, .. } => Some(member),
            _ => None,
        }
    }

    /// The interface of the message, from the signal kind or the optional
    /// header field.
    pub fn interface(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Signal { interface, .. } => Some(interface),
            _ => self.interface.as_deref(),
        }
    }

    /// The error name of an error message.
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }

    /// The serial this message replies to, if any.
    pub fn reply_serial(&self) -> Option<NonZeroU32> {
        match &self.kind {
            MessageKind::MethodReturn { reply_serial } => Some(*reply_serial),
            MessageKind::Error { reply_serial, .. } => Some(*reply_serial),
            _ => None,
        }
    }

    /// The serial of the message, if it has been assigned.
    pub fn serial(&self) -> Option<NonZeroU32> {
        self.serial
    }

    /// Modify the serial of the message.
    #[must_use]
    pub fn with_serial(mut self, serial: NonZeroU32) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Get the flags of the message.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Modify the flags of the message.
    #[must_use]
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Modify the interface of the message.
    #[must_use]
    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Get the destination of the message.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Modify the destination of the message.
    #[must_use]
    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Get the sender of the message.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Modify the sender of the message.
    #[must_use]
    pub fn with_sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// The signature of the message body.
    pub fn signature(&self) -> &Signature {
        self.body.signature()
    }

    /// The argument marshaller bound to the message body. The signature
    /// marshalled into it is emitted in the message header.
    pub fn body_buf(&mut self) -> &mut BodyBuf {
        &mut self.body
    }

    /// Replace the message body.
    #[must_use]
    pub fn with_body(mut self, body: BodyBuf) -> Self {
        self.body = body;
        self
    }

    /// Get a reader over the message arguments, positioned at the first
    /// argument.
    pub fn body(&self) -> Body<'_> {
        self.body.peek()
    }

    /// Encode the message to its on-wire representation.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        let mut buf = crate::buf::OwnedBuf::with_endianness(self.body.endianness());
        super::encode(self, &mut buf)?;
        Ok(buf.get().to_vec())
    }

    /// Parse a whole message from its on-wire representation.
    pub fn parse(data: &[u8]) -> Result<Self> {
        super::parse(data)
    }

    pub(crate) fn message_type(&self) -> MessageType {
        match self.kind {
            MessageKind::MethodCall { .. } => MessageType::METHOD_CALL,
            MessageKind::MethodReturn { .. } => MessageType::METHOD_RETURN,
            MessageKind::Error { .. } => MessageType::ERROR,
            MessageKind::Signal { .. } => MessageType::SIGNAL,
        }
    }
}
