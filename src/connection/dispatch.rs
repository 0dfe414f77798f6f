//! Routing of inbound messages to method handlers and match registrations.

use std::any::Any;
use std::num::NonZeroU32;
use std::rc::Rc;

use log::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::interface::{CallDetails, MethodCallback};
use crate::object_path::ObjectPath;
use crate::org_freedesktop_dbus::{INTROSPECTABLE, PROPERTIES};
use crate::proto::Flags;
use crate::signature::Signature;
use crate::{Message, MessageKind};

use super::Connection;

/// How a method call resolved inside the object tree.
enum Resolved {
    User(MethodCallback, Option<Rc<dyn Any>>),
    Builtin(&'static str),
}

impl Connection {
    /// Dispatch one inbound message.
    ///
    /// Method calls are routed to the bound object first; afterwards the
    /// match registrations are scanned in insertion order. Handlers run on
    /// the dispatching thread and may reenter the connection, except to
    /// drop it.
    pub fn dispatch(&mut self, message: &Message) -> Result<()> {
        if matches!(message.kind(), MessageKind::MethodCall { .. }) {
            self.dispatch_method_call(message)?;
        }

        self.dispatch_matches(message)
    }

    fn dispatch_method_call(&mut self, message: &Message) -> Result<()> {
        let (Some(path), Some(member)) = (message.path(), message.member()) else {
            return Ok(());
        };

        let reply_expected =
            !(message.flags() & Flags::NO_REPLY_EXPECTED) && message.serial().is_some();

        let mut details = CallDetails {
            args: message.body(),
            reply: reply_expected.then(|| message.reply()),
            manual_reply: false,
            binding: None,
            message,
        };

        let outcome = match self.resolve_method(path, message.interface(), member) {
            Ok(Resolved::User(callback, binding)) => {
                details.binding = binding;
                callback(self, &mut details)
            }
            Ok(Resolved::Builtin(interface)) => {
                self.dispatch_builtin(path, interface, member, &mut details)
            }
            Err(error) => Err(error),
        };

        if let Err(error) = outcome {
            debug!("method call {path} {member} failed: {error}");

            details.manual_reply = false;
            details.reply = None;

            if reply_expected {
                let mut reply = message.error_reply(error.error_name());
                let body = reply.body_buf();
                body.append_arguments(Signature::STRING)?;
                body.append_str(error.error_message())?;
                details.reply = Some(reply);
            }
        }

        if !details.manual_reply {
            if let Some(reply) = details.reply.take() {
                self.send_message(reply)?;
            }
        }

        Ok(())
    }

    fn resolve_method(
        &self,
        path: &ObjectPath,
        interface: Option<&str>,
        member: &str,
    ) -> Result<Resolved> {
        let Some(node) = self.objects.get(path) else {
            return Err(Error::new(ErrorKind::ObjectNotFound));
        };

        match interface {
            Some(interface_name) => {
                if let Some(bound) = node.interfaces.get(interface_name) {
                    let Some(callback) = bound
                        .interface
                        .method(member)
                        .and_then(|member| member.method_callback())
                    else {
                        return Err(Error::new(ErrorKind::MethodNotFound));
                    };

                    return Ok(Resolved::User(callback, bound.binding.clone()));
                }

                if interface_name == INTROSPECTABLE {
                    return Ok(Resolved::Builtin(INTROSPECTABLE));
                }

                if interface_name == PROPERTIES {
                    return Ok(Resolved::Builtin(PROPERTIES));
                }

                Err(Error::new(ErrorKind::InterfaceNotFound))
            }
            None => {
                // Without an interface header, scan the bound interfaces for
                // the first one exporting the member.
                for bound in node.interfaces.values() {
                    if let Some(callback) = bound
                        .interface
                        .method(member)
                        .and_then(|member| member.method_callback())
                    {
                        return Ok(Resolved::User(callback, bound.binding.clone()));
                    }
                }

                match member {
                    "Introspect" => Ok(Resolved::Builtin(INTROSPECTABLE)),
                    "Get" | "GetAll" | "Set" => Ok(Resolved::Builtin(PROPERTIES)),
                    _ => Err(Error::new(ErrorKind::MethodNotFound)),
                }
            }
        }
    }

    fn dispatch_builtin(
        &mut self,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        details: &mut CallDetails<'_>,
    ) -> Result<()> {
        match (interface, member) {
            (INTROSPECTABLE, "Introspect") => self.builtin_introspect(path, details),
            (PROPERTIES, "Get") => self.builtin_property_get(path, details),
            (PROPERTIES, "GetAll") => self.builtin_property_get_all(path, details),
            (PROPERTIES, "Set") => self.builtin_property_set(path, details),
            _ => Err(Error::new(ErrorKind::MethodNotFound)),
        }
    }

    /// Scan the match registrations in insertion order. One-shot entries
    /// are removed after their callback has been invoked.
    fn dispatch_matches(&mut self, message: &Message) -> Result<()> {
        // Snapshot the ids so callbacks may add and remove registrations
        // while the scan is in progress.
        let ids: Vec<NonZeroU32> = self.matches.iter().map(|entry| entry.id).collect();

        for id in ids {
            let Some(entry) = self.matches.iter().find(|entry| entry.id == id) else {
                continue;
            };

            let sender_ok = match &entry.service {
                Some(service) => {
                    // Compare against the resolved unique name of the
                    // tracked service.
                    let unique = self
                        .services
                        .get(&**service)
                        .and_then(|service| service.unique.as_deref());

                    match (unique, message.sender()) {
                        (Some(unique), Some(sender)) => unique == sender,
                        _ => false,
                    }
                }
                None => match &entry.rule.sender {
                    Some(sender) => message.sender() == Some(&**sender),
                    None => true,
                },
            };

            if !sender_ok || !entry.rule.matches_except_sender(message) {
                continue;
            }

            let callback = entry.callback.clone();
            let one_shot = entry.rule.one_shot;

            debug!("match {id} fired");
            let result = callback(self, message);

            if one_shot {
                self.remove_match_inner(id, false)?;
            }

            result?;
        }

        Ok(())
    }
}
