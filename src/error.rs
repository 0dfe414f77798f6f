use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::object_path::ObjectPathError;
use crate::signature::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Test if the error indicates that a handler consumed an argument of the
    /// wrong type.
    #[inline]
    pub fn is_mismatch(&self) -> bool {
        matches!(self.kind, ErrorKind::ArgumentMismatch)
    }

    /// The D-Bus error name used when this error is serialized as an error
    /// reply by the dispatcher.
    pub(crate) fn error_name(&self) -> &'static str {
        match self.kind {
            ErrorKind::ObjectNotFound => "rs.dbuswire.Error.ObjectNotFound",
            ErrorKind::InterfaceNotFound => "rs.dbuswire.Error.InterfaceNotFound",
            ErrorKind::MethodNotFound => "rs.dbuswire.Error.MethodNotFound",
            ErrorKind::PropertyNotFound => "rs.dbuswire.Error.PropertyNotFound",
            ErrorKind::ReadOnlyProperty => "rs.dbuswire.Error.ReadOnlyProperty",
            ErrorKind::WriteOnlyProperty => "rs.dbuswire.Error.WriteOnlyProperty",
            ErrorKind::ArgumentMismatch => "rs.dbuswire.Error.InvalidArgument",
            _ => "rs.dbuswire.Error.Failed",
        }
    }

    /// Human readable text for the error reply body.
    pub(crate) fn error_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::ObjectNotFound => "No object exists for the requested path.",
            ErrorKind::InterfaceNotFound => {
                "The requested path does not export the requested interface."
            }
            ErrorKind::MethodNotFound => {
                "The method you invoked isn't known by the object you invoked it on."
            }
            ErrorKind::PropertyNotFound => {
                "The requested object and interface do not export the requested property."
            }
            ErrorKind::ReadOnlyProperty => "The requested property is read only.",
            ErrorKind::WriteOnlyProperty => "The requested property is write only.",
            ErrorKind::ArgumentMismatch => "Invalid arguments passed to a method call.",
            _ => "The method call failed.",
        }
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<ObjectPathError> for Error {
    #[inline]
    fn from(error: ObjectPathError) -> Self {
        Self::new(ErrorKind::ObjectPath(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::new(ErrorKind::Io(error))
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::ObjectPath(error) => error.fmt(f),
            ErrorKind::Utf8Error(error) => error.fmt(f),
            ErrorKind::BufferUnderflow => write!(f, "Buffer underflow"),
            ErrorKind::NotNullTerminated => write!(f, "String is not null terminated"),
            ErrorKind::EmbeddedNull => write!(f, "String contains an embedded null byte"),
            ErrorKind::InvalidProtocol => write!(f, "Invalid protocol"),
            ErrorKind::InvalidVersion(version) => {
                write!(f, "Unsupported protocol version {version}")
            }
            ErrorKind::InvalidBoolean(value) => write!(f, "Invalid boolean wire value {value}"),
            ErrorKind::SizeMismatch => write!(f, "Message data does not match its declared size"),
            ErrorKind::SignatureEnded => {
                write!(f, "Write attempted past the end of the declared signature")
            }
            ErrorKind::SignatureMismatch { expected, found } => write!(
                f,
                "Signature mismatch, expected `{}` but found `{}`",
                *expected as char, *found as char
            ),
            ErrorKind::NotInContainer => write!(f, "No open container scope"),
            ErrorKind::ContainersStillOpen => {
                write!(f, "Operation requires all containers to be closed")
            }
            ErrorKind::IncompleteContainer => {
                write!(f, "Container closed before its contents were complete")
            }
            ErrorKind::InvalidVariant => {
                write!(f, "Variant signature must be a single complete type")
            }
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::MessageTooLong(length) => {
                write!(f, "Message of length {length} is too long (max is 134217728)")
            }
            ErrorKind::ArgumentMismatch => {
                write!(f, "Argument does not match the expected type")
            }
            ErrorKind::ZeroSerial => write!(f, "Zero in header serial"),
            ErrorKind::ZeroReplySerial => write!(f, "Zero REPLY_SERIAL header"),
            ErrorKind::MissingPath => write!(f, "Missing required PATH header"),
            ErrorKind::MissingMember => write!(f, "Missing required MEMBER header"),
            ErrorKind::MissingInterface => write!(f, "Missing required INTERFACE header"),
            ErrorKind::MissingReplySerial => write!(f, "Missing required REPLY_SERIAL header"),
            ErrorKind::MissingErrorName => write!(f, "Missing required ERROR_NAME header"),
            ErrorKind::InvalidHeaderField => write!(f, "Malformed header field entry"),
            ErrorKind::InvalidInterfaceName => write!(f, "Invalid interface name"),
            ErrorKind::InvalidMemberName => write!(f, "Invalid member name"),
            ErrorKind::InvalidBusName => write!(f, "Invalid bus name"),
            ErrorKind::CorruptStream => write!(f, "Stream is corrupt from an earlier parse error"),
            ErrorKind::InvalidAddress => write!(f, "Invalid d-bus address"),
            ErrorKind::InvalidSasl => write!(f, "Invalid SASL message"),
            ErrorKind::SaslRejected => write!(f, "SASL authentication rejected by server"),
            ErrorKind::MissingCookie => {
                write!(f, "Cookie not present in the local keyring")
            }
            ErrorKind::MissingLocalId => {
                write!(f, "No local identity available for authentication")
            }
            ErrorKind::ObjectNotFound => write!(f, "No object exists for the requested path"),
            ErrorKind::InterfaceAlreadyBound => {
                write!(f, "An interface with the same name is already bound to the path")
            }
            ErrorKind::InterfaceNotFound => {
                write!(f, "The requested path does not export the requested interface")
            }
            ErrorKind::MethodNotFound => write!(f, "Method not found on the requested object"),
            ErrorKind::PropertyNotFound => write!(f, "Property not found on the interface"),
            ErrorKind::ReadOnlyProperty => write!(f, "The requested property is read only"),
            ErrorKind::WriteOnlyProperty => write!(f, "The requested property is write only"),
            ErrorKind::BusFailure(code) => {
                write!(f, "Bus daemon returned failure code {code}")
            }
            ErrorKind::NotConnected => write!(f, "Not connected to a message bus"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::ObjectPath(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    ObjectPath(ObjectPathError),
    Utf8Error(Utf8Error),
    BufferUnderflow,
    NotNullTerminated,
    EmbeddedNull,
    InvalidProtocol,
    InvalidVersion(u8),
    InvalidBoolean(u32),
    SizeMismatch,
    SignatureEnded,
    SignatureMismatch { expected: u8, found: u8 },
    NotInContainer,
    ContainersStillOpen,
    IncompleteContainer,
    InvalidVariant,
    ArrayTooLong(u32),
    MessageTooLong(usize),
    ArgumentMismatch,
    ZeroSerial,
    ZeroReplySerial,
    MissingPath,
    MissingMember,
    MissingInterface,
    MissingReplySerial,
    MissingErrorName,
    InvalidHeaderField,
    InvalidInterfaceName,
    InvalidMemberName,
    InvalidBusName,
    CorruptStream,
    InvalidAddress,
    InvalidSasl,
    SaslRejected,
    MissingCookie,
    MissingLocalId,
    ObjectNotFound,
    InterfaceAlreadyBound,
    InterfaceNotFound,
    MethodNotFound,
    PropertyNotFound,
    ReadOnlyProperty,
    WriteOnlyProperty,
    BusFailure(u32),
    NotConnected,
}
