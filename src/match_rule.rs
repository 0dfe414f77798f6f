//! Subscription rules matched against inbound messages.

use std::fmt::Write;
use std::num::NonZeroU32;

use crate::buf::Field;
use crate::object_path::{ObjectPath, OwnedObjectPath};
use crate::proto::MessageType;
use crate::{Message, Result};

/// A filter for inbound messages.
///
/// Every field is optional; an absent field matches anything, a present
/// field must equal the corresponding message field. Rules are installed
/// with [`Connection::add_match`].
///
/// [`Connection::add_match`]: crate::Connection::add_match
///
/// # Examples
///
/// ```
/// use dbus_wire::{MatchRule, MessageType};
///
/// let rule = MatchRule::new()
///     .with_message_type(MessageType::SIGNAL)
///     .with_sender("com.example")
///     .with_member("StateChanged")
///     .with_argument(0, "ready");
/// ```
#[derive(Debug, Default, Clone)]
pub struct MatchRule {
    pub(crate) message_type: Option<MessageType>,
    pub(crate) sender: Option<Box<str>>,
    pub(crate) destination: Option<Box<str>>,
    pub(crate) interface: Option<Box<str>>,
    pub(crate) path: Option<OwnedObjectPath>,
    pub(crate) member: Option<Box<str>>,
    pub(crate) error_name: Option<Box<str>>,
    pub(crate) reply_serial: Option<NonZeroU32>,
    pub(crate) arguments: Vec<(usize, Box<str>)>,
    pub(crate) add_to_bus: bool,
    pub(crate) one_shot: bool,
    pub(crate) id: Option<NonZeroU32>,
}

impl MatchRule {
    /// Construct an empty rule which matches every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only match messages of the given type.
    #[must_use]
    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Only match messages from this sender.
    ///
    /// When the sender is a well-known service name the connection resolves
    /// it to the owning unique name and compares against that.
    #[must_use]
    pub fn with_sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Only match messages addressed to this destination.
    #[must_use]
    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Only match messages carrying this interface.
    #[must_use]
    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Only match messages for this object path.
    #[must_use]
    pub fn with_path(mut self, path: &ObjectPath) -> Self {
        self.path = Some(path.to_owned());
        self
    }

    /// Only match messages with this member.
    #[must_use]
    pub fn with_member(mut self, member: &str) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Only match error messages with this error name.
    #[must_use]
    pub fn with_error_name(mut self, error_name: &str) -> Self {
        self.error_name = Some(error_name.into());
        self
    }

    /// Only match replies to the given serial. This effectively turns the
    /// rule into a pending-call handler.
    #[must_use]
    pub fn with_reply_serial(mut self, reply_serial: NonZeroU32) -> Self {
        self.reply_serial = Some(reply_serial);
        self
    }

    /// Only match messages whose string argument at `position` equals
    /// `value`.
    #[must_use]
    pub fn with_argument(mut self, position: usize, value: &str) -> Self {
        self.arguments.push((position, value.into()));
        self
    }

    /// Also install the rule with the bus daemon via `AddMatch`.
    #[must_use]
    pub fn add_to_bus_daemon(mut self) -> Self {
        self.add_to_bus = true;
        self
    }

    /// Remove the rule after its first match.
    #[must_use]
    pub fn one_shot(mut self) -> Self {
        self.one_shot = true;
        self
    }

    /// Use a caller-chosen registration id instead of an assigned one.
    #[must_use]
    pub fn with_id(mut self, id: NonZeroU32) -> Self {
        self.id = Some(id);
        self
    }

    /// Render the rule in the bus daemon's match rule syntax.
    ///
    /// Reply serials and error names have no rule-string key; they remain
    /// local-only filters.
    pub(crate) fn rule_string(&self) -> String {
        let mut out = String::new();

        match self.message_type {
            Some(MessageType::METHOD_CALL) => out.push_str("type='method_call',"),
            Some(MessageType::METHOD_RETURN) => out.push_str("type='method_return',"),
            Some(MessageType::ERROR) => out.push_str("type='error',"),
            Some(MessageType::SIGNAL) => out.push_str("type='signal',"),
            _ => {}
        }

        let mut field = |name: &str, value: Option<&str>| {
            if let Some(value) = value {
                let _ = write!(out, "{name}='{value}',");
            }
        };

        field("sender", self.sender.as_deref());
        field("interface", self.interface.as_deref());
        field("member", self.member.as_deref());
        field("path", self.path.as_deref().map(ObjectPath::as_str));
        field("destination", self.destination.as_deref());

        for (position, value) in &self.arguments {
            let _ = write!(out, "arg{position}='{value}',");
        }

        if out.ends_with(',') {
            out.pop();
        }

        out
    }

    /// Test every filter except the sender, which the connection resolves
    /// through its service table first.
    pub(crate) fn matches_except_sender(&self, message: &Message) -> bool {
        if let Some(message_type) = self.message_type {
            if message_type != message.message_type() {
                return false;
            }
        }

        if let Some(reply_serial) = self.reply_serial {
            if message.reply_serial() != Some(reply_serial) {
                return false;
            }
        }

        if !field_matches(self.destination.as_deref(), message.destination()) {
            return false;
        }

        if let Some(path) = &self.path {
            if message.path() != Some(&**path) {
                return false;
            }
        }

        if !field_matches(self.interface.as_deref(), message.interface()) {
            return false;
        }

        if !field_matches(self.member.as_deref(), message.member()) {
            return false;
        }

        if !field_matches(self.error_name.as_deref(), message.error_name()) {
            return false;
        }

        self.arguments
            .iter()
            .all(|(position, value)| argument_matches(message, *position, value))
    }
}

/// An absent filter field matches anything; a present one requires the
/// message field to be present and equal.
fn field_matches(filter: Option<&str>, value: Option<&str>) -> bool {
    match filter {
        Some(filter) => value == Some(filter),
        None => true,
    }
}

/// Test whether the string argument at `position` equals `value`.
///
/// Arguments are counted as complete top-level values; a malformed body
/// simply does not match.
fn argument_matches(message: &Message, position: usize, value: &str) -> bool {
    fn walk(message: &Message, position: usize, value: &str) -> Result<bool> {
        let mut body = message.body();
        let mut index = 0;
        let mut depth = 0usize;

        while let Some(field) = body.next()? {
            match field {
                Field::ArrayBegin { .. }
                | Field::StructBegin { .. }
                | Field::DictEntryBegin { .. }
                | Field::VariantBegin { .. } => {
                    if depth == 0 && index == position {
                        // The requested position is not a string.
                        return Ok(false);
                    }

                    if depth == 0 {
                        index += 1;
                    }

                    depth += 1;
                }
                Field::ArrayEnd | Field::StructEnd | Field::DictEntryEnd | Field::VariantEnd => {
                    depth -= 1;
                }
                Field::String(s) if depth == 0 => {
                    if index == position {
                        return Ok(s == value);
                    }

                    index += 1;
                }
                _ => {
                    if depth == 0 {
                        if index == position {
                            return Ok(false);
                        }

                        index += 1;
                    }
                }
            }
        }

        Ok(false)
    }

    walk(message, position, value).unwrap_or(false)
}
