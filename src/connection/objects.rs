//! The hierarchical tree of server-side objects.

use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::interface::Interface;
use crate::object_path::{ObjectPath, OwnedObjectPath};

use super::Connection;

/// An interface bound to an object path together with its per-binding data.
pub(crate) struct BoundInterface {
    pub(crate) interface: Rc<Interface>,
    pub(crate) binding: Option<Rc<dyn Any>>,
}

/// One node in the object tree.
///
/// Every node implicitly carries the `org.freedesktop.DBus.Introspectable`
/// and `org.freedesktop.DBus.Properties` interfaces; only user bindings are
/// stored here.
#[derive(Default)]
pub(crate) struct ObjectNode {
    pub(crate) interfaces: BTreeMap<Box<str>, BoundInterface>,
    pub(crate) children: Vec<OwnedObjectPath>,
}

impl Connection {
    /// Get or create the object node at `path`, creating parent nodes as
    /// needed. The path is canonicalized first and returned in canonical
    /// form.
    pub fn get_object(&mut self, path: &str) -> Result<OwnedObjectPath> {
        let path = ObjectPath::canonicalize(path)?;
        self.ensure_object(&path);
        Ok(path)
    }

    /// Test whether an object node exists at `path`.
    pub fn has_object(&self, path: &str) -> bool {
        match ObjectPath::canonicalize(path) {
            Ok(path) => self.objects.contains_key(&path),
            Err(_) => false,
        }
    }

    fn ensure_object(&mut self, path: &ObjectPath) {
        if self.objects.contains_key(path) {
            return;
        }

        self.objects.insert(path.to_owned(), ObjectNode::default());
        debug!("created object {path}");

        if let Some(parent) = path.parent() {
            self.ensure_object(parent);

            if let Some(node) = self.objects.get_mut(parent) {
                node.children.push(path.to_owned());
            }
        }
    }

    /// Bind an interface to the node at `path`, creating the node when
    /// necessary. `binding` is surfaced to method handlers through the call
    /// details.
    pub fn bind_interface(
        &mut self,
        path: &str,
        interface: Rc<Interface>,
        binding: Option<Rc<dyn Any>>,
    ) -> Result<OwnedObjectPath> {
        let path = self.get_object(path)?;

        let Some(node) = self.objects.get_mut(&path) else {
            return Err(Error::new(ErrorKind::ObjectNotFound));
        };

        if node.interfaces.contains_key(interface.name()) {
            return Err(Error::new(ErrorKind::InterfaceAlreadyBound));
        }

        debug!("bound {} at {path}", interface.name());
        node.interfaces.insert(
            interface.name().into(),
            BoundInterface { interface, binding },
        );

        Ok(path)
    }

    /// Unbind a previously bound interface, pruning nodes that are left
    /// with no user bindings and no children.
    pub fn unbind_interface(&mut self, path: &str, interface: &Rc<Interface>) -> Result<()> {
        let path = ObjectPath::canonicalize(path)?;

        let Some(node) = self.objects.get_mut(&path) else {
            return Err(Error::new(ErrorKind::ObjectNotFound));
        };

        match node.interfaces.get(interface.name()) {
            Some(bound) if Rc::ptr_eq(&bound.interface, interface) => {}
            _ => return Err(Error::new(ErrorKind::InterfaceNotFound)),
        }

        node.interfaces.remove(interface.name());
        debug!("unbound {} at {path}", interface.name());

        self.prune_object(&path);
        Ok(())
    }

    /// Remove the node at `path` when it has no user bindings and no
    /// children, repeating for its parents.
    fn prune_object(&mut self, path: &ObjectPath) {
        let Some(node) = self.objects.get(path) else {
            return;
        };

        if !node.interfaces.is_empty() || !node.children.is_empty() {
            return;
        }

        self.objects.remove(path);
        debug!("pruned object {path}");

        if let Some(parent) = path.parent() {
            if let Some(parent_node) = self.objects.get_mut(parent) {
                parent_node.children.retain(|child| **child != *path);
            }

            self.prune_object(parent);
        }
    }
}
