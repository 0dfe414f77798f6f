//! A sans-I/O implementation of the client side of the D-Bus protocol:
//! binary wire codec, stream framing, SASL authentication, and a
//! connection-level dispatcher exposing methods, signals and properties at
//! hierarchical object paths.
//!
//! The crate performs no transport I/O of its own. Outgoing messages are
//! handed to an installed send callback, and bytes received from the
//! transport are framed with [`StreamBuf`] and routed with
//! [`Connection::dispatch`].

#[macro_use]
mod macros;

pub use self::address::Address;
mod address;

pub use self::buf::{Body, BodyBuf, Field};
mod buf;

pub use self::connection::{
    Connection, MatchCallback, NameReplyCallback, ReleaseNameCallback, SendCallback,
};
mod connection;

pub use self::error::{Error, Result};
mod error;

mod frame;

pub use self::interface::{
    CallDetails, Direction, Interface, Member, MethodCallback, PropertyGetter, PropertySetter,
};
mod interface;

pub use self::match_rule::MatchRule;
mod match_rule;

pub use self::message::{Message, MessageKind};
mod message;

mod names;

pub use self::object_path::{ObjectPath, ObjectPathError, OwnedObjectPath};
mod object_path;

pub mod org_freedesktop_dbus;

pub use self::proto::{Endianness, Flags, MessageType};
mod proto;

pub mod sasl;

pub use self::signature::{OwnedSignature, Signature, SignatureError};
mod signature;

pub use self::stream::StreamBuf;
mod stream;
