//! Interfaces and their members, bound to object paths by the connection.

use std::any::Any;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::buf::{Body, BodyBuf};
use crate::error::{Error, ErrorKind, Result};
use crate::names::{is_valid_interface_name, is_valid_member_name};
use crate::signature::{OwnedSignature, Signature};
use crate::{Connection, Message};

/// Handler invoked when a bound method is called.
pub type MethodCallback = Rc<dyn Fn(&mut Connection, &mut CallDetails<'_>) -> Result<()>>;

/// Handler producing the current value of a property.
///
/// The marshaller is scoped inside a variant of the declared property type,
/// so the handler appends exactly one value of that type.
pub type PropertyGetter = Rc<dyn Fn(&mut BodyBuf) -> Result<()>>;

/// Handler consuming a new value for a property.
///
/// The reader is positioned inside the variant, at a value of the declared
/// property type.
pub type PropertySetter = Rc<dyn Fn(&mut Body<'_>) -> Result<()>>;

/// Everything a method handler needs to service one call.
pub struct CallDetails<'a> {
    /// Reader over the call arguments, positioned at the first argument.
    pub args: Body<'a>,
    /// Pre-built reply scaffold, absent when the caller asked for no reply.
    pub reply: Option<Message>,
    /// When set by the handler, the dispatcher does not send the reply
    /// automatically.
    pub manual_reply: bool,
    /// Data attached to the interface binding.
    pub binding: Option<Rc<dyn Any>>,
    /// The message being dispatched.
    pub message: &'a Message,
}

/// The direction of a member argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// A named argument of a method or signal.
#[derive(Clone)]
pub(crate) struct Argument {
    pub(crate) name: Option<Box<str>>,
    pub(crate) signature: OwnedSignature,
    pub(crate) direction: Direction,
}

pub(crate) enum MemberKind {
    Method {
        callback: Option<MethodCallback>,
    },
    Signal,
    Property {
        signature: OwnedSignature,
        getter: Option<PropertyGetter>,
        setter: Option<PropertySetter>,
    },
}

/// A single member of an interface: a method, signal or property.
pub struct Member {
    pub(crate) name: Box<str>,
    pub(crate) kind: MemberKind,
    pub(crate) arguments: Vec<Argument>,
    pub(crate) annotations: BTreeMap<Box<str>, Box<str>>,
}

impl Member {
    fn new(name: &str, kind: MemberKind) -> Self {
        Self {
            name: name.into(),
            kind,
            arguments: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// The name of the member.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare an argument. Only meaningful for methods and signals.
    pub fn add_argument(
        &mut self,
        direction: Direction,
        name: Option<&str>,
        signature: &Signature,
    ) -> &mut Self {
        self.arguments.push(Argument {
            name: name.map(Box::from),
            signature: signature.to_owned(),
            direction,
        });

        self
    }

    /// Attach an annotation to the member.
    pub fn add_annotation(&mut self, key: &str, value: &str) -> &mut Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Install the handler invoked when this method is called.
    ///
    /// # Panics
    ///
    /// Panics when the member is not a method.
    pub fn set_method_callback(&mut self, callback: MethodCallback) -> &mut Self {
        let MemberKind::Method { callback: slot } = &mut self.kind else {
            panic!("set_method_callback on a member which is not a method");
        };

        *slot = Some(callback);
        self
    }

    /// Change the declared type of a property.
    ///
    /// # Panics
    ///
    /// Panics when the member is not a property.
    pub fn set_property_type(&mut self, signature: &Signature) -> &mut Self {
        let MemberKind::Property { signature: slot, .. } = &mut self.kind else {
            panic!("set_property_type on a member which is not a property");
        };

        *slot = signature.to_owned();
        self
    }

    /// Install the getter of a property, making it readable.
    ///
    /// # Panics
    ///
    /// Panics when the member is not a property.
    pub fn set_getter(&mut self, getter: PropertyGetter) -> &mut Self {
        let MemberKind::Property { getter: slot, .. } = &mut self.kind else {
            panic!("set_getter on a member which is not a property");
        };

        *slot = Some(getter);
        self
    }

    /// Install the setter of a property, making it writable.
    ///
    /// # Panics
    ///
    /// Panics when the member is not a property.
    pub fn set_setter(&mut self, setter: PropertySetter) -> &mut Self {
        let MemberKind::Property { setter: slot, .. } = &mut self.kind else {
            panic!("set_setter on a member which is not a property");
        };

        *slot = Some(setter);
        self
    }

    pub(crate) fn is_method(&self) -> bool {
        matches!(self.kind, MemberKind::Method { .. })
    }

    pub(crate) fn is_property(&self) -> bool {
        matches!(self.kind, MemberKind::Property { .. })
    }

    pub(crate) fn method_callback(&self) -> Option<MethodCallback> {
        match &self.kind {
            MemberKind::Method { callback } => callback.clone(),
            _ => None,
        }
    }

    pub(crate) fn property_signature(&self) -> Option<&Signature> {
        match &self.kind {
            MemberKind::Property { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub(crate) fn getter(&self) -> Option<PropertyGetter> {
        match &self.kind {
            MemberKind::Property { getter, .. } => getter.clone(),
            _ => None,
        }
    }

    pub(crate) fn setter(&self) -> Option<PropertySetter> {
        match &self.kind {
            MemberKind::Property { setter, .. } => setter.clone(),
            _ => None,
        }
    }

    pub(crate) fn readable(&self) -> bool {
        matches!(&self.kind, MemberKind::Property { getter: Some(_), .. })
    }

    pub(crate) fn writable(&self) -> bool {
        matches!(&self.kind, MemberKind::Property { setter: Some(_), .. })
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MemberKind::Method { .. } => "method",
            MemberKind::Signal => "signal",
            MemberKind::Property { .. } => "property",
        };

        f.debug_struct("Member")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// A named collection of methods, signals and properties.
///
/// Interfaces are built up front and bound to object paths with
/// [`Connection::bind_interface`]. Adding a member with a name that already
/// exists replaces the previous member.
///
/// [`Connection::bind_interface`]: crate::Connection::bind_interface
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
///
/// use dbus_wire::{Direction, Interface, Signature};
///
/// let mut interface = Interface::new("com.example.Calculator")?;
///
/// interface
///     .add_method("Add")?
///     .add_argument(Direction::In, Some("a"), Signature::INT32)
///     .add_argument(Direction::In, Some("b"), Signature::INT32)
///     .add_argument(Direction::Out, Some("sum"), Signature::INT32)
///     .set_method_callback(Rc::new(|_conn, details| {
///         let a = details.args.read_i32()?;
///         let b = details.args.read_i32()?;
///
///         if let Some(reply) = &mut details.reply {
///             let body = reply.body_buf();
///             body.append_arguments(Signature::INT32)?;
///             body.append_i32(a + b)?;
///         }
///
///         Ok(())
///     }));
/// # Ok::<_, dbus_wire::Error>(())
/// ```
pub struct Interface {
    name: Box<str>,
    pub(crate) members: BTreeMap<Box<str>, Member>,
}

impl Interface {
    /// Construct a new empty interface with a validated name.
    pub fn new(name: &str) -> Result<Self> {
        if !is_valid_interface_name(name) {
            return Err(Error::new(ErrorKind::InvalidInterfaceName));
        }

        Ok(Self {
            name: name.into(),
            members: BTreeMap::new(),
        })
    }

    /// Construct an interface whose name is a known-valid constant.
    pub(crate) fn new_static(name: &'static str) -> Self {
        debug_assert!(is_valid_interface_name(name));

        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    /// The name of the interface.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a method member.
    pub fn add_method(&mut self, name: &str) -> Result<&mut Member> {
        self.add_member(name, MemberKind::Method { callback: None })
    }

    /// Add a signal member.
    pub fn add_signal(&mut self, name: &str) -> Result<&mut Member> {
        self.add_member(name, MemberKind::Signal)
    }

    /// Add a property member of the given type.
    pub fn add_property(&mut self, name: &str, signature: &Signature) -> Result<&mut Member> {
        self.add_member(
            name,
            MemberKind::Property {
                signature: signature.to_owned(),
                getter: None,
                setter: None,
            },
        )
    }

    /// Add a method member whose name is a known-valid constant.
    pub(crate) fn add_static_method(&mut self, name: &'static str) -> &mut Member {
        debug_assert!(is_valid_member_name(name));
        self.insert_member(name, MemberKind::Method { callback: None })
    }

    fn add_member(&mut self, name: &str, kind: MemberKind) -> Result<&mut Member> {
        if !is_valid_member_name(name) {
            return Err(Error::new(ErrorKind::InvalidMemberName));
        }

        Ok(self.insert_member(name, kind))
    }

    fn insert_member(&mut self, name: &str, kind: MemberKind) -> &mut Member {
        let member = Member::new(name, kind);

        match self.members.entry(name.into()) {
            Entry::Occupied(mut entry) => {
                entry.insert(member);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(member),
        }
    }

    /// Look up a method by name.
    pub(crate) fn method(&self, name: &str) -> Option<&Member> {
        self.members.get(name).filter(|m| m.is_method())
    }

    /// Look up a property by name.
    pub(crate) fn property(&self, name: &str) -> Option<&Member> {
        self.members.get(name).filter(|m| m.is_property())
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("members", &self.members.len())
            .finish()
    }
}
