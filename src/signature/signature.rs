use std::fmt;
use std::str::from_utf8_unchecked;

use super::{validate, OwnedSignature, SignatureError};

/// A validated D-Bus type signature.
///
/// # Examples
///
/// ```
/// use dbus_wire::Signature;
///
/// const SIG: &Signature = Signature::new_const(b"a{sv}");
///
/// assert!(Signature::new(b"aai").is_ok());
/// assert!(Signature::new(b"(a)").is_err());
/// ```
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature([u8]);

impl Signature {
    /// The empty signature.
    pub const EMPTY: &'static Signature = Signature::new_const(b"");

    /// A single byte.
    pub const BYTE: &'static Signature = Signature::new_const(b"y");

    /// A boolean.
    pub const BOOLEAN: &'static Signature = Signature::new_const(b"b");

    /// Signed 16-bit integer.
    pub const INT16: &'static Signature = Signature::new_const(b"n");

    /// Unsigned 16-bit integer.
    pub const UINT16: &'static Signature = Signature::new_const(b"q");

    /// Signed 32-bit integer.
    pub const INT32: &'static Signature = Signature::new_const(b"i");

    /// Unsigned 32-bit integer.
    pub const UINT32: &'static Signature = Signature::new_const(b"u");

    /// Signed 64-bit integer.
    pub const INT64: &'static Signature = Signature::new_const(b"x");

    /// Unsigned 64-bit integer.
    pub const UINT64: &'static Signature = Signature::new_const(b"t");

    /// IEEE 754 double-precision floating point.
    pub const DOUBLE: &'static Signature = Signature::new_const(b"d");

    /// A UTF-8 string.
    pub const STRING: &'static Signature = Signature::new_const(b"s");

    /// An object path.
    pub const OBJECT_PATH: &'static Signature = Signature::new_const(b"o");

    /// A type signature.
    pub const SIGNATURE: &'static Signature = Signature::new_const(b"g");

    /// A variant.
    pub const VARIANT: &'static Signature = Signature::new_const(b"v");

    /// Construct a new signature with validation inside of a constant
    /// context.
    ///
    /// This will panic in case the signature is invalid.
    ///
    /// ```compile_fail
    /// use dbus_wire::Signature;
    ///
    /// const BAD: &Signature = Signature::new_const(b"(a)");
    /// ```
    #[track_caller]
    pub const fn new_const(signature: &[u8]) -> &Signature {
        if validate(signature).is_err() {
            panic!("Invalid D-Bus signature");
        }

        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Self::new_unchecked(signature) }
    }

    /// Try to construct a new signature with validation.
    pub const fn new(signature: &[u8]) -> Result<&Signature, SignatureError> {
        if let Err(error) = validate(signature) {
            return Err(error);
        }

        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Ok(Self::new_unchecked(signature)) }
    }

    /// Construct a new signature without validation. The caller is
    /// responsible for ensuring that the signature is valid.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the signature is a valid signature.
    pub(crate) const unsafe fn new_unchecked(signature: &[u8]) -> &Self {
        &*(signature as *const _ as *const Signature)
    }

    /// Test if the signature is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the length of the signature in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the signature as a string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation ensures that the signature is ASCII.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Get the signature as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl fmt::Debug for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl AsRef<Signature> for Signature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl PartialEq<[u8]> for Signature {
    #[inline]
    fn eq(&self, other: &[u8]) -> bool {
        &self.0 == other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Signature {
    #[inline]
    fn eq(&self, other: &[u8; N]) -> bool {
        self.0 == other[..]
    }
}

impl<const N: usize> PartialEq<[u8; N]> for &Signature {
    #[inline]
    fn eq(&self, other: &[u8; N]) -> bool {
        self.0 == other[..]
    }
}

impl PartialEq<str> for Signature {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl ToOwned for Signature {
    type Owned = OwnedSignature;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        // SAFETY: This type ensures it contains a valid signature.
        unsafe { OwnedSignature::from_raw_vec(self.0.to_vec()) }
    }
}
