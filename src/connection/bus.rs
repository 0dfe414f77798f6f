//! Calls into the `org.freedesktop.DBus` bus daemon.

use std::rc::Rc;

use log::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::match_rule::MatchRule;
use crate::object_path::ObjectPath;
use crate::org_freedesktop_dbus::{self, NameFlag, NameReply, ReleaseNameReply};
use crate::signature::Signature;
use crate::{Message, MessageKind};

use super::Connection;

/// Callback receiving the typed result of a `RequestName` call.
pub type NameReplyCallback = Rc<dyn Fn(&mut Connection, Result<NameReply>) -> Result<()>>;

/// Callback receiving the typed result of a `ReleaseName` call.
pub type ReleaseNameCallback = Rc<dyn Fn(&mut Connection, Result<ReleaseNameReply>) -> Result<()>>;

const BUS_PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");

impl Connection {
    /// A method call addressed to the bus daemon.
    pub(crate) fn bus_method_call(&self, member: &str) -> Message {
        Message::method_call(BUS_PATH, member)
            .with_destination(org_freedesktop_dbus::DESTINATION)
            .with_interface(org_freedesktop_dbus::INTERFACE)
    }

    /// Register with the bus daemon.
    ///
    /// Sends `Hello` and installs a one-shot reply handler which stores the
    /// returned unique name and marks the connection as connected.
    pub fn connect_to_bus(&mut self) -> Result<()> {
        let serial = self.next_serial();
        let message = self.bus_method_call("Hello").with_serial(serial);

        let rule = MatchRule::new()
            .with_sender(org_freedesktop_dbus::DESTINATION)
            .with_reply_serial(serial)
            .one_shot();

        self.add_match(
            rule,
            Rc::new(|conn, reply| {
                if let MessageKind::MethodReturn { .. } = reply.kind() {
                    let mut body = reply.body();
                    let unique = body.read_str()?;
                    conn.unique_name = Some(unique.into());
                    conn.connected = true;
                    debug!("connected to bus as {unique}");
                }

                Ok(())
            }),
        )?;

        self.send_message(message)?;
        Ok(())
    }

    /// Request ownership of a well-known name, invoking `callback` with the
    /// typed result code.
    pub fn request_name(
        &mut self,
        name: &str,
        flags: NameFlag,
        callback: Option<NameReplyCallback>,
    ) -> Result<()> {
        let serial = self.next_serial();
        let mut message = self.bus_method_call("RequestName").with_serial(serial);

        let body = message.body_buf();
        body.append_arguments(Signature::new_const(b"su"))?;
        body.append_str(name)?;
        body.append_u32(flags.0)?;

        if let Some(callback) = callback {
            let rule = MatchRule::new()
                .with_sender(org_freedesktop_dbus::DESTINATION)
                .with_reply_serial(serial)
                .one_shot();

            self.add_match(
                rule,
                Rc::new(move |conn, reply| callback(conn, request_name_reply(reply))),
            )?;
        }

        self.send_message(message)?;
        Ok(())
    }

    /// Give up ownership of a well-known name, invoking `callback` with the
    /// typed result code.
    pub fn release_name(
        &mut self,
        name: &str,
        callback: Option<ReleaseNameCallback>,
    ) -> Result<()> {
        let serial = self.next_serial();
        let mut message = self.bus_method_call("ReleaseName").with_serial(serial);

        let body = message.body_buf();
        body.append_arguments(Signature::STRING)?;
        body.append_str(name)?;

        if let Some(callback) = callback {
            let rule = MatchRule::new()
                .with_sender(org_freedesktop_dbus::DESTINATION)
                .with_reply_serial(serial)
                .one_shot();

            self.add_match(
                rule,
                Rc::new(move |conn, reply| callback(conn, release_name_reply(reply))),
            )?;
        }

        self.send_message(message)?;
        Ok(())
    }

    /// Ask the bus daemon for the current owner of a well-known name and
    /// store it in the service table.
    pub(crate) fn issue_get_name_owner(&mut self, service: Rc<str>) -> Result<()> {
        let serial = self.next_serial();
        let mut message = self.bus_method_call("GetNameOwner").with_serial(serial);

        let body = message.body_buf();
        body.append_arguments(Signature::STRING)?;
        body.append_str(&service)?;

        let rule = MatchRule::new()
            .with_sender(org_freedesktop_dbus::DESTINATION)
            .with_reply_serial(serial)
            .one_shot();

        self.add_match(
            rule,
            Rc::new(move |conn, reply| {
                if let MessageKind::MethodReturn { .. } = reply.kind() {
                    let mut body = reply.body();
                    let unique = body.read_str()?;

                    if let Some(entry) = conn.services.get_mut(&*service) {
                        entry.unique = Some(unique.into());
                    }
                }

                Ok(())
            }),
        )?;

        self.send_message(message)?;
        Ok(())
    }
}

fn request_name_reply(reply: &Message) -> Result<NameReply> {
    match reply.kind() {
        MessageKind::MethodReturn { .. } => {
            let mut body = reply.body();
            let code = body.read_u32()?;

            match NameReply(code) {
                reply @ (NameReply::PRIMARY_OWNER
                | NameReply::IN_QUEUE
                | NameReply::EXISTS
                | NameReply::ALREADY_OWNER) => Ok(reply),
                _ => Err(Error::new(ErrorKind::BusFailure(code))),
            }
        }
        _ => Err(Error::new(ErrorKind::BusFailure(0))),
    }
}

fn release_name_reply(reply: &Message) -> Result<ReleaseNameReply> {
    match reply.kind() {
        MessageKind::MethodReturn { .. } => {
            let mut body = reply.body();
            let code = body.read_u32()?;

            match ReleaseNameReply(code) {
                reply @ (ReleaseNameReply::RELEASED
                | ReleaseNameReply::NON_EXISTENT
                | ReleaseNameReply::NOT_OWNER) => Ok(reply),
                _ => Err(Error::new(ErrorKind::BusFailure(code))),
            }
        }
        _ => Err(Error::new(ErrorKind::BusFailure(0))),
    }
}
