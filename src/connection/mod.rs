//! The connection-level dispatcher and its registries.

mod bus;
mod dispatch;
mod introspect;
pub(crate) mod objects;

#[cfg(test)]
mod tests;

pub use self::bus::{NameReplyCallback, ReleaseNameCallback};

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::rc::Rc;

use log::debug;

use crate::buf::OwnedBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::interface::Interface;
use crate::match_rule::MatchRule;
use crate::message::encode;
use crate::names::requires_service_lookup;
use crate::object_path::{ObjectPath, OwnedObjectPath};
use crate::org_freedesktop_dbus;
use crate::proto::MessageType;
use crate::signature::Signature;
use crate::Message;

use self::introspect::{introspectable_interface, properties_interface};
use self::objects::ObjectNode;

/// Callback invoked when a match registration fires.
///
/// The callback receives the connection and the matched message; a fresh
/// argument reader is obtained with [`Message::body`].
pub type MatchCallback = Rc<dyn Fn(&mut Connection, &Message) -> Result<()>>;

/// Callback invoked with the encoded bytes of each outgoing message.
pub type SendCallback = Box<dyn FnMut(&[u8]) -> Result<()>>;

pub(crate) struct MatchEntry {
    pub(crate) id: NonZeroU32,
    pub(crate) rule: MatchRule,
    pub(crate) callback: MatchCallback,
    /// Set when the rule's sender is a well-known name being tracked
    /// through the service table.
    pub(crate) service: Option<Box<str>>,
}

/// A tracked well-known service name and its resolved unique name.
pub(crate) struct Service {
    pub(crate) unique: Option<Box<str>>,
    pub(crate) refs: usize,
    pub(crate) signal_match: Option<NonZeroU32>,
}

/// A single-threaded D-Bus connection engine.
///
/// The connection owns the server-side object tree, the match and service
/// registrations and the outgoing serial counter. It performs no I/O of its
/// own: outgoing messages are handed to the installed send callback and
/// inbound messages are delivered to [`dispatch`].
///
/// [`dispatch`]: Self::dispatch
pub struct Connection {
    serial: u32,
    match_id: u32,
    pub(crate) unique_name: Option<Box<str>>,
    pub(crate) connected: bool,
    pub(crate) objects: BTreeMap<OwnedObjectPath, ObjectNode>,
    pub(crate) matches: Vec<MatchEntry>,
    pub(crate) services: HashMap<Box<str>, Service>,
    send: Option<SendCallback>,
    send_buf: OwnedBuf,
    pub(crate) introspectable: Rc<Interface>,
    pub(crate) properties: Rc<Interface>,
}

impl Connection {
    /// Construct a new connection with no send callback installed.
    pub fn new() -> Self {
        Self {
            serial: 0,
            match_id: 0,
            unique_name: None,
            connected: false,
            objects: BTreeMap::new(),
            matches: Vec::new(),
            services: HashMap::new(),
            send: None,
            send_buf: OwnedBuf::new(),
            introspectable: Rc::new(introspectable_interface()),
            properties: Rc::new(properties_interface()),
        }
    }

    /// Install the callback receiving encoded outgoing messages.
    pub fn set_send_callback(&mut self, callback: SendCallback) {
        self.send = Some(callback);
    }

    /// The unique bus name, once the bus registration has completed.
    pub fn unique_name(&self) -> Option<&str> {
        self.unique_name.as_deref()
    }

    /// Whether the bus registration has completed.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The next outgoing message serial. Serials wrap around and never take
    /// the value zero.
    pub fn next_serial(&mut self) -> NonZeroU32 {
        loop {
            self.serial = self.serial.wrapping_add(1);

            if let Some(serial) = NonZeroU32::new(self.serial) {
                break serial;
            }
        }
    }

    /// The next match registration id, wrapping and skipping zero like the
    /// serial counter.
    pub(crate) fn next_match_id(&mut self) -> NonZeroU32 {
        loop {
            self.match_id = self.match_id.wrapping_add(1);

            if let Some(id) = NonZeroU32::new(self.match_id) {
                break id;
            }
        }
    }

    /// Encode and transmit a message through the send callback, assigning a
    /// serial when the message does not carry one.
    pub fn send_message(&mut self, mut message: Message) -> Result<NonZeroU32> {
        let serial = match message.serial {
            Some(serial) => serial,
            None => {
                let serial = self.next_serial();
                message.serial = Some(serial);
                serial
            }
        };

        let Some(mut send) = self.send.take() else {
            return Err(Error::new(ErrorKind::NotConnected));
        };

        self.send_buf.clear();

        let result = match encode(&message, &mut self.send_buf) {
            Ok(()) => send(self.send_buf.get()),
            Err(error) => Err(error),
        };

        self.send = Some(send);
        result?;
        Ok(serial)
    }

    /// Construct a signal message emitted from a bound path, with the
    /// connection's unique name as the sender.
    pub fn signal(&self, path: &ObjectPath, interface: &str, member: &str) -> Message {
        let message = Message::signal(path, interface, member);

        match &self.unique_name {
            Some(name) => message.with_sender(name),
            None => message,
        }
    }

    /// Install a match registration.
    ///
    /// The rule is deep-copied. When it carries no id one is assigned; when
    /// `add_to_bus_daemon` is set an `AddMatch` call is sent to the broker.
    /// A well-known sender name additionally installs service tracking so
    /// the rule matches the owner's unique name.
    pub fn add_match(&mut self, rule: MatchRule, callback: MatchCallback) -> Result<NonZeroU32> {
        let mut rule = rule;

        let id = match rule.id {
            Some(id) => id,
            None => self.next_match_id(),
        };

        rule.id = Some(id);

        if rule.add_to_bus {
            let rule_string = rule.rule_string();
            let mut message = self.bus_method_call("AddMatch");
            let body = message.body_buf();
            body.append_arguments(Signature::STRING)?;
            body.append_str(&rule_string)?;
            self.send_message(message)?;
        }

        let service = match &rule.sender {
            Some(sender) if requires_service_lookup(sender) => Some(Box::<str>::from(&**sender)),
            _ => None,
        };

        self.matches.push(MatchEntry {
            id,
            rule,
            callback,
            service: service.clone(),
        });

        if let Some(name) = service {
            self.ref_service(&name)?;
        }

        debug!("installed match {id}");
        Ok(id)
    }

    /// Remove a match registration, sending `RemoveMatch` when it was
    /// installed with the bus daemon. Unknown ids are ignored.
    pub fn remove_match(&mut self, id: NonZeroU32) -> Result<()> {
        self.remove_match_inner(id, true)
    }

    pub(crate) fn remove_match_inner(&mut self, id: NonZeroU32, notify_daemon: bool) -> Result<()> {
        let Some(index) = self.matches.iter().position(|entry| entry.id == id) else {
            return Ok(());
        };

        let entry = self.matches.remove(index);

        if notify_daemon && entry.rule.add_to_bus {
            let rule_string = entry.rule.rule_string();
            let mut message = self.bus_method_call("RemoveMatch");
            let body = message.body_buf();
            body.append_arguments(Signature::STRING)?;
            body.append_str(&rule_string)?;
            self.send_message(message)?;
        }

        // Unreference the service after the match is gone, since dropping
        // the service removes further matches.
        if let Some(service) = entry.service {
            self.unref_service(&service)?;
        }

        debug!("removed match {id}");
        Ok(())
    }

    /// Track ownership of a well-known service name, installing the
    /// `NameOwnerChanged` subscription and seeding the current owner on
    /// first use.
    fn ref_service(&mut self, name: &str) -> Result<()> {
        if let Some(service) = self.services.get_mut(name) {
            service.refs += 1;
            return Ok(());
        }

        self.services.insert(
            name.into(),
            Service {
                unique: None,
                refs: 1,
                signal_match: None,
            },
        );

        let tracked: Rc<str> = name.into();

        let rule = MatchRule::new()
            .with_message_type(MessageType::SIGNAL)
            .with_sender(org_freedesktop_dbus::DESTINATION)
            .with_path(ObjectPath::new_const(b"/org/freedesktop/DBus"))
            .with_interface(org_freedesktop_dbus::INTERFACE)
            .with_member("NameOwnerChanged")
            .with_argument(0, name)
            .add_to_bus_daemon();

        let service_name = tracked.clone();

        let signal_match = self.add_match(
            rule,
            Rc::new(move |conn, message| {
                let mut body = message.body();
                let _name = body.read_str()?;
                let _old_owner = body.read_str()?;
                let new_owner = body.read_str()?;

                if let Some(service) = conn.services.get_mut(&*service_name) {
                    service.unique = if new_owner.is_empty() {
                        None
                    } else {
                        Some(new_owner.into())
                    };
                }

                Ok(())
            }),
        )?;

        if let Some(service) = self.services.get_mut(name) {
            service.signal_match = Some(signal_match);
        }

        // Seed the current owner after the NameOwnerChanged subscription is
        // in place to avoid a race with ownership changes.
        self.issue_get_name_owner(tracked)?;
        Ok(())
    }

    fn unref_service(&mut self, name: &str) -> Result<()> {
        let Some(service) = self.services.get_mut(name) else {
            return Ok(());
        };

        service.refs -= 1;

        if service.refs > 0 {
            return Ok(());
        }

        let signal_match = service.signal_match;
        self.services.remove(name);

        if let Some(id) = signal_match {
            self.remove_match(id)?;
        }

        Ok(())
    }
}

impl Default for Connection {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
