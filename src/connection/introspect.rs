//! The built-in `Introspectable` and `Properties` interfaces carried by
//! every bound object.

use std::rc::Rc;

use crate::error::{Error, ErrorKind, Result};
use crate::interface::{CallDetails, Direction, Interface, Member, MemberKind};
use crate::object_path::ObjectPath;
use crate::org_freedesktop_dbus::{INTROSPECTABLE, PROPERTIES};
use crate::signature::Signature;

use super::Connection;

const PROPERTY_DICT: &Signature = Signature::new_const(b"a{sv}");

/// The descriptor of `org.freedesktop.DBus.Introspectable`.
pub(super) fn introspectable_interface() -> Interface {
    let mut interface = Interface::new_static(INTROSPECTABLE);

    interface
        .add_static_method("Introspect")
        .add_argument(Direction::Out, Some("xml_data"), Signature::STRING);

    interface
}

/// The descriptor of `org.freedesktop.DBus.Properties`.
pub(super) fn properties_interface() -> Interface {
    let mut interface = Interface::new_static(PROPERTIES);

    interface
        .add_static_method("Get")
        .add_argument(Direction::In, Some("interface_name"), Signature::STRING)
        .add_argument(Direction::In, Some("property_name"), Signature::STRING)
        .add_argument(Direction::Out, Some("value"), Signature::VARIANT);

    interface
        .add_static_method("GetAll")
        .add_argument(Direction::In, Some("interface_name"), Signature::STRING)
        .add_argument(Direction::Out, Some("properties"), PROPERTY_DICT);

    interface
        .add_static_method("Set")
        .add_argument(Direction::In, Some("interface_name"), Signature::STRING)
        .add_argument(Direction::In, Some("property_name"), Signature::STRING)
        .add_argument(Direction::In, Some("value"), Signature::VARIANT);

    interface
}

impl Connection {
    /// Render the introspection XML for the node at `path`.
    pub fn introspect_path(&self, path: &ObjectPath) -> Result<String> {
        let Some(node) = self.objects.get(path) else {
            return Err(Error::new(ErrorKind::ObjectNotFound));
        };

        let mut out = String::from(
            "<!DOCTYPE node PUBLIC \"-//freedesktop/DTD D-BUS Object Introspection 1.0//EN\"\n\
             \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n\
             <node>\n",
        );

        introspect_interface(&self.introspectable, &mut out);
        introspect_interface(&self.properties, &mut out);

        for bound in node.interfaces.values() {
            introspect_interface(&bound.interface, &mut out);
        }

        for child in &node.children {
            out.push_str("\t<node name=\"");
            out.push_str(child.tail());
            out.push_str("\"/>\n");
        }

        out.push_str("</node>\n");
        Ok(out)
    }

    pub(super) fn builtin_introspect(
        &mut self,
        path: &ObjectPath,
        details: &mut CallDetails<'_>,
    ) -> Result<()> {
        let xml = self.introspect_path(path)?;

        if let Some(reply) = &mut details.reply {
            let body = reply.body_buf();
            body.append_arguments(Signature::STRING)?;
            body.append_str(&xml)?;
        }

        Ok(())
    }

    pub(super) fn builtin_property_get(
        &mut self,
        path: &ObjectPath,
        details: &mut CallDetails<'_>,
    ) -> Result<()> {
        let interface_name = details.args.read_str()?;
        let property_name = details.args.read_str()?;
        details.args.finish()?;

        let interface = self.bound_interface(path, interface_name)?;

        let Some(property) = interface.property(property_name) else {
            return Err(Error::new(ErrorKind::PropertyNotFound));
        };

        let Some(getter) = property.getter() else {
            return Err(Error::new(ErrorKind::WriteOnlyProperty));
        };

        let Some(signature) = property.property_signature() else {
            return Err(Error::new(ErrorKind::PropertyNotFound));
        };

        let Some(reply) = &mut details.reply else {
            return Ok(());
        };

        let body = reply.body_buf();
        body.append_arguments(Signature::VARIANT)?;
        body.begin_variant(signature)?;
        getter(body)?;
        body.end_variant()?;
        Ok(())
    }

    pub(super) fn builtin_property_get_all(
        &mut self,
        path: &ObjectPath,
        details: &mut CallDetails<'_>,
    ) -> Result<()> {
        let interface_name = details.args.read_str()?;
        details.args.finish()?;

        let interface = self.bound_interface(path, interface_name)?;

        let Some(reply) = &mut details.reply else {
            return Ok(());
        };

        let body = reply.body_buf();
        body.append_arguments(PROPERTY_DICT)?;
        body.begin_array()?;

        for member in interface.members.values() {
            if !member.readable() {
                continue;
            }

            let (Some(getter), Some(signature)) = (member.getter(), member.property_signature())
            else {
                continue;
            };

            body.begin_dict_entry()?;
            body.append_str(member.name())?;
            body.begin_variant(signature)?;
            getter(body)?;
            body.end_variant()?;
            body.end_dict_entry()?;
        }

        body.end_array()?;
        Ok(())
    }

    pub(super) fn builtin_property_set(
        &mut self,
        path: &ObjectPath,
        details: &mut CallDetails<'_>,
    ) -> Result<()> {
        let interface_name = details.args.read_str()?;
        let property_name = details.args.read_str()?;

        let interface = self.bound_interface(path, interface_name)?;

        let Some(property) = interface.property(property_name) else {
            return Err(Error::new(ErrorKind::PropertyNotFound));
        };

        let Some(setter) = property.setter() else {
            return Err(Error::new(ErrorKind::ReadOnlyProperty));
        };

        let Some(expected) = property.property_signature() else {
            return Err(Error::new(ErrorKind::PropertyNotFound));
        };

        let (_, inner) = details.args.read_variant_begin()?;

        if inner != expected {
            return Err(Error::new(ErrorKind::ArgumentMismatch));
        }

        setter(&mut details.args)?;
        details.args.read_variant_end()?;
        details.args.finish()?;
        Ok(())
    }

    fn bound_interface(&self, path: &ObjectPath, name: &str) -> Result<Rc<Interface>> {
        let Some(node) = self.objects.get(path) else {
            return Err(Error::new(ErrorKind::ObjectNotFound));
        };

        let Some(bound) = node.interfaces.get(name) else {
            return Err(Error::new(ErrorKind::InterfaceNotFound));
        };

        Ok(bound.interface.clone())
    }
}

fn introspect_interface(interface: &Interface, out: &mut String) {
    out.push_str("\t<interface name=\"");
    out.push_str(interface.name());
    out.push_str("\">\n");

    for member in interface.members.values() {
        introspect_member(member, out);
    }

    out.push_str("\t</interface>\n");
}

fn introspect_member(member: &Member, out: &mut String) {
    match &member.kind {
        MemberKind::Method { .. } => {
            out.push_str("\t\t<method name=\"");
            out.push_str(member.name());
            out.push_str("\">\n");
            introspect_annotations(member, out);
            introspect_arguments(member, out);
            out.push_str("\t\t</method>\n");
        }
        MemberKind::Signal => {
            out.push_str("\t\t<signal name=\"");
            out.push_str(member.name());
            out.push_str("\">\n");
            introspect_annotations(member, out);
            introspect_arguments(member, out);
            out.push_str("\t\t</signal>\n");
        }
        MemberKind::Property { signature, .. } => {
            let access = match (member.readable(), member.writable()) {
                (true, true) => "readwrite",
                (true, false) => "read",
                (false, true) => "write",
                // A property with neither accessor is not exported.
                (false, false) => return,
            };

            out.push_str("\t\t<property name=\"");
            out.push_str(member.name());
            out.push_str("\" type=\"");
            out.push_str(signature.as_str());
            out.push_str("\" access=\"");
            out.push_str(access);

            if member.annotations.is_empty() {
                out.push_str("\"/>\n");
            } else {
                out.push_str("\">\n");
                introspect_annotations(member, out);
                out.push_str("\t\t</property>\n");
            }
        }
    }
}

fn introspect_arguments(member: &Member, out: &mut String) {
    for direction in [Direction::In, Direction::Out] {
        for argument in member.arguments.iter().filter(|a| a.direction == direction) {
            out.push_str("\t\t\t<arg type=\"");
            out.push_str(argument.signature.as_str());

            if let Some(name) = &argument.name {
                out.push_str("\" name=\"");
                out.push_str(name);
            }

            match direction {
                Direction::In => out.push_str("\" direction=\"in\"/>\n"),
                Direction::Out => out.push_str("\" direction=\"out\"/>\n"),
            }
        }
    }
}

fn introspect_annotations(member: &Member, out: &mut String) {
    for (key, value) in &member.annotations {
        out.push_str("\t\t\t<annotation name=\"");
        out.push_str(key);
        out.push_str("\" value=\"");
        out.push_str(value);
        out.push_str("\"/>\n");
    }
}
