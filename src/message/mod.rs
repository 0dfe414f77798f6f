//! D-Bus messages and their wire representation.

pub use self::message::Message;
mod message;

pub use self::message_kind::MessageKind;
mod message_kind;

pub(crate) use self::codec::{encode, next_message_size, parse};
mod codec;

#[cfg(test)]
mod tests;
