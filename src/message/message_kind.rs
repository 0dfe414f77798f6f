use std::num::NonZeroU32;

use crate::object_path::OwnedObjectPath;

/// The kind of a D-Bus message.
///
/// Each variant carries the header fields which are mandatory for that
/// message type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageKind {
    /// Method call. This message type may prompt a reply.
    MethodCall {
        /// The path of the object being called.
        path: OwnedObjectPath,
        /// The method being called.
        member: Box<str>,
    },
    /// Method reply with returned data.
    MethodReturn {
        /// The serial this is a reply to.
        reply_serial: NonZeroU32,
    },
    /// Error reply. If the first argument exists and is a string, it is an
    /// error message.
    Error {
        /// The name of the error.
        error_name: Box<str>,
        /// The serial this is a reply to.
        reply_serial: NonZeroU32,
    },
    /// Signal emission.
    Signal {
        /// The path of the object the signal is emitted from.
        path: OwnedObjectPath,
        /// The interface the signal belongs to.
        interface: Box<str>,
        /// The signal name.
        member: Box<str>,
    },
}
