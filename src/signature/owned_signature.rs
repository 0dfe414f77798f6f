use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use super::Signature;

/// An owned growable signature.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct OwnedSignature(Vec<u8>);

impl OwnedSignature {
    /// Construct a new empty signature.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Construct directly from a vector of bytes.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the vector is a valid signature.
    pub(crate) const unsafe fn from_raw_vec(vec: Vec<u8>) -> Self {
        Self(vec)
    }

    /// Append another signature.
    pub(crate) fn extend_from_signature<S>(&mut self, other: S)
    where
        S: AsRef<Signature>,
    {
        self.0.extend_from_slice(other.as_ref().as_bytes());
    }

    /// Clear the signature.
    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

impl Deref for OwnedSignature {
    type Target = Signature;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: The container is guaranteed to hold a valid signature.
        unsafe { Signature::new_unchecked(&self.0) }
    }
}

impl AsRef<Signature> for OwnedSignature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl Borrow<Signature> for OwnedSignature {
    #[inline]
    fn borrow(&self) -> &Signature {
        self
    }
}

impl From<&Signature> for OwnedSignature {
    #[inline]
    fn from(signature: &Signature) -> Self {
        signature.to_owned()
    }
}

impl fmt::Debug for OwnedSignature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl fmt::Display for OwnedSignature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl PartialEq<Signature> for OwnedSignature {
    #[inline]
    fn eq(&self, other: &Signature) -> bool {
        **self == *other
    }
}

impl PartialEq<&Signature> for OwnedSignature {
    #[inline]
    fn eq(&self, other: &&Signature) -> bool {
        **self == **other
    }
}
