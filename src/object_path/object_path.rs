use std::fmt;
use std::str::from_utf8_unchecked;

use super::{validate, ObjectPathError, OwnedObjectPath};

/// A validated D-Bus object path.
///
/// Object paths are hierarchical identifiers with POSIX-path-like syntax: a
/// leading `/`, non-empty `[A-Za-z0-9_]` segments, and no trailing slash
/// except for the root path itself.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ObjectPath([u8]);

impl ObjectPath {
    /// The special `"/"` object path.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_wire::ObjectPath;
    ///
    /// assert_eq!(ObjectPath::ROOT, ObjectPath::new("/")?);
    /// # Ok::<_, dbus_wire::Error>(())
    /// ```
    pub const ROOT: &'static Self = Self::new_const(b"/");

    /// Construct a new object path, panicking if it is invalid.
    #[track_caller]
    pub const fn new_const(path: &[u8]) -> &Self {
        if !validate(path) {
            panic!("Invalid D-Bus object path");
        }

        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Self::new_unchecked(path) }
    }

    /// Construct a new validated object path.
    pub fn new<P>(path: &P) -> Result<&Self, ObjectPathError>
    where
        P: ?Sized + AsRef<[u8]>,
    {
        let path = path.as_ref();

        if !validate(path) {
            return Err(ObjectPathError);
        }

        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Ok(Self::new_unchecked(path)) }
    }

    /// Canonicalize a path-like string into an owned object path.
    ///
    /// A missing leading `/` is prepended, runs of slashes are collapsed,
    /// trailing slashes are dropped except at the root, and any characters
    /// outside the object path grammar are rejected. Canonicalization is
    /// idempotent.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_wire::ObjectPath;
    ///
    /// assert_eq!(ObjectPath::canonicalize("")?.as_str(), "/");
    /// assert_eq!(ObjectPath::canonicalize("//a//b/")?.as_str(), "/a/b");
    /// assert_eq!(ObjectPath::canonicalize("/a/b")?.as_str(), "/a/b");
    /// # Ok::<_, dbus_wire::Error>(())
    /// ```
    pub fn canonicalize<P>(path: &P) -> Result<OwnedObjectPath, ObjectPathError>
    where
        P: ?Sized + AsRef<[u8]>,
    {
        let path = path.as_ref();
        let mut out = Vec::with_capacity(path.len() + 1);
        out.push(b'/');

        for &c in path {
            match c {
                b'/' => {
                    if out.last() != Some(&b'/') {
                        out.push(b'/');
                    }
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => out.push(c),
                _ => return Err(ObjectPathError),
            }
        }

        if out.len() > 1 && out.last() == Some(&b'/') {
            out.pop();
        }

        // SAFETY: The construction above only emits valid paths.
        Ok(unsafe { OwnedObjectPath::from_raw_vec(out) })
    }

    /// Construct a new unchecked object path.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the path is a valid object path.
    pub(crate) const unsafe fn new_unchecked(path: &[u8]) -> &Self {
        &*(path as *const _ as *const Self)
    }

    /// Get the parent of this path, or `None` for the root.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_wire::ObjectPath;
    ///
    /// let path = ObjectPath::new("/foo/bar")?;
    /// assert_eq!(path.parent(), Some(ObjectPath::new("/foo")?));
    /// assert_eq!(ObjectPath::ROOT.parent(), None);
    /// # Ok::<_, dbus_wire::Error>(())
    /// ```
    pub fn parent(&self) -> Option<&ObjectPath> {
        if self.0.len() == 1 {
            return None;
        }

        let n = self.0.iter().rposition(|&c| c == b'/')?;
        let end = if n == 0 { 1 } else { n };
        // SAFETY: A prefix of a valid path up to a separator is valid.
        Some(unsafe { ObjectPath::new_unchecked(&self.0[..end]) })
    }

    /// The last segment of the path, or the empty string for the root.
    pub fn tail(&self) -> &str {
        let Some(n) = self.0.iter().rposition(|&c| c == b'/') else {
            return "";
        };

        // SAFETY: Validation ensures the path is ASCII.
        unsafe { from_utf8_unchecked(&self.0[n + 1..]) }
    }

    /// Get the object path as a string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation ensures that the path is ASCII.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Get the object path as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl fmt::Debug for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl AsRef<ObjectPath> for ObjectPath {
    #[inline]
    fn as_ref(&self) -> &ObjectPath {
        self
    }
}

impl AsRef<[u8]> for ObjectPath {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl ToOwned for ObjectPath {
    type Owned = OwnedObjectPath;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        // SAFETY: This type ensures it contains a valid path.
        unsafe { OwnedObjectPath::from_raw_vec(self.0.to_vec()) }
    }
}

impl PartialEq<str> for ObjectPath {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<ObjectPath> for str {
    #[inline]
    fn eq(&self, other: &ObjectPath) -> bool {
        *self.as_bytes() == other.0
    }
}
