use std::fmt;

use crate::error::{Error, ErrorKind, Result};
use crate::proto::{Endianness, Type, MAX_ARRAY_LENGTH};
use crate::signature::{next_type, OwnedSignature, Signature};
use crate::ObjectPath;

use super::owned_buf::{Alloc, OwnedBuf};
use super::Body;

/// One open container on the marshaller's scope stack.
enum Scope {
    Array {
        /// Location of the length prefix to backfill.
        len_at: Alloc<u32>,
        /// Data offset of the first element, past the element alignment
        /// padding.
        start: usize,
        /// Bounds of the element type in the active signature.
        element_start: usize,
        element_end: usize,
    },
    Struct,
    DictEntry,
    Variant {
        /// The signature marshalled inside the variant.
        inner: OwnedSignature,
        /// Cursor within `inner`.
        pos: usize,
    },
}

/// A buffer marshalling a message body against a declared signature.
///
/// The signature is declared up front with [`append_arguments`] and every
/// typed append is checked against it. Containers are entered and left with
/// the paired `begin_*`/`end_*` operations.
///
/// [`append_arguments`]: Self::append_arguments
///
/// # Examples
///
/// ```
/// use dbus_wire::{BodyBuf, Endianness, Signature};
///
/// let mut body = BodyBuf::with_endianness(Endianness::LITTLE);
/// body.append_arguments(Signature::new(b"yu")?)?;
/// body.append_byte(0x11)?;
/// body.append_u32(0x22334455)?;
///
/// assert_eq!(body.get(), &[0x11, 0, 0, 0, 0x55, 0x44, 0x33, 0x22]);
/// # Ok::<_, dbus_wire::Error>(())
/// ```
pub struct BodyBuf {
    buf: OwnedBuf,
    sig: OwnedSignature,
    cursor: usize,
    stack: Vec<Scope>,
}

impl BodyBuf {
    /// Construct a new empty body in the native byte order.
    pub fn new() -> Self {
        Self::with_endianness(Endianness::NATIVE)
    }

    /// Construct a new empty body with the specified byte order.
    pub fn with_endianness(endianness: Endianness) -> Self {
        Self {
            buf: OwnedBuf::with_endianness(endianness),
            sig: OwnedSignature::new(),
            cursor: 0,
            stack: Vec::new(),
        }
    }

    /// Construct from already marshalled parts.
    pub(crate) fn from_parts(
        data: Vec<u8>,
        sig: OwnedSignature,
        endianness: Endianness,
    ) -> Self {
        let cursor = sig.len();

        Self {
            buf: OwnedBuf::from_vec(data, endianness),
            sig,
            cursor,
            stack: Vec::new(),
        }
    }

    /// Get the byte order of the body.
    pub fn endianness(&self) -> Endianness {
        self.buf.endianness()
    }

    /// The signature declared for this body.
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// The marshalled bytes.
    pub fn get(&self) -> &[u8] {
        self.buf.get()
    }

    /// The length of the marshalled bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Test if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Clear the body, its signature and any open scopes.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.sig.clear();
        self.cursor = 0;
        self.stack.clear();
    }

    /// Get a reader over the marshalled contents.
    pub fn peek(&self) -> Body<'_> {
        Body::new(self.buf.get(), &self.sig, self.buf.endianness())
    }

    /// Declare the signature of the arguments about to be appended.
    ///
    /// May be called repeatedly at the outermost scope, each time extending
    /// the body signature by one or more complete types.
    pub fn append_arguments<S>(&mut self, signature: S) -> Result<()>
    where
        S: AsRef<Signature>,
    {
        if !self.stack.is_empty() {
            return Err(Error::new(ErrorKind::ContainersStillOpen));
        }

        self.sig.extend_from_signature(signature.as_ref());
        Ok(())
    }

    /// Verify that the declared signature has been fully marshalled.
    pub(crate) fn ensure_complete(&self) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(Error::new(ErrorKind::ContainersStillOpen));
        }

        if self.cursor != self.sig.len() {
            return Err(Error::new(ErrorKind::IncompleteContainer));
        }

        Ok(())
    }

    /// Append an 8-bit unsigned integer.
    pub fn append_byte(&mut self, value: u8) -> Result<()> {
        self.expect(Type::BYTE)?;
        self.buf.store(value);
        self.complete_value();
        Ok(())
    }

    /// Append a boolean. The wire representation is a 32-bit 0 or 1.
    pub fn append_bool(&mut self, value: bool) -> Result<()> {
        self.expect(Type::BOOLEAN)?;
        self.buf.store(value as u32);
        self.complete_value();
        Ok(())
    }

    /// Append a 16-bit signed integer.
    pub fn append_i16(&mut self, value: i16) -> Result<()> {
        self.expect(Type::INT16)?;
        self.buf.store(value);
        self.complete_value();
        Ok(())
    }

    /// Append a 16-bit unsigned integer.
    pub fn append_u16(&mut self, value: u16) -> Result<()> {
        self.expect(Type::UINT16)?;
        self.buf.store(value);
        self.complete_value();
        Ok(())
    }

    /// Append a 32-bit signed integer.
    pub fn append_i32(&mut self, value: i32) -> Result<()> {
        self.expect(Type::INT32)?;
        self.buf.store(value);
        self.complete_value();
        Ok(())
    }

    /// Append a 32-bit unsigned integer.
    pub fn append_u32(&mut self, value: u32) -> Result<()> {
        self.expect(Type::UINT32)?;
        self.buf.store(value);
        self.complete_value();
        Ok(())
    }

    /// Append a 64-bit signed integer.
    pub fn append_i64(&mut self, value: i64) -> Result<()> {
        self.expect(Type::INT64)?;
        self.buf.store(value);
        self.complete_value();
        Ok(())
    }

    /// Append a 64-bit unsigned integer.
    pub fn append_u64(&mut self, value: u64) -> Result<()> {
        self.expect(Type::UINT64)?;
        self.buf.store(value);
        self.complete_value();
        Ok(())
    }

    /// Append an IEEE 754 double.
    pub fn append_double(&mut self, value: f64) -> Result<()> {
        self.expect(Type::DOUBLE)?;
        self.buf.store(value);
        self.complete_value();
        Ok(())
    }

    /// Append a string.
    pub fn append_str(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(Error::new(ErrorKind::EmbeddedNull));
        }

        self.expect(Type::STRING)?;
        self.buf.store(value.len() as u32);
        self.buf.extend_from_slice_nul(value.as_bytes());
        self.complete_value();
        Ok(())
    }

    /// Append an object path.
    pub fn append_object_path(&mut self, value: &ObjectPath) -> Result<()> {
        self.expect(Type::OBJECT_PATH)?;
        self.buf.store(value.as_bytes().len() as u32);
        self.buf.extend_from_slice_nul(value.as_bytes());
        self.complete_value();
        Ok(())
    }

    /// Append a signature value.
    pub fn append_signature(&mut self, value: &Signature) -> Result<()> {
        self.expect(Type::SIGNATURE)?;
        self.buf.store(value.len() as u8);
        self.buf.extend_from_slice_nul(value.as_bytes());
        self.complete_value();
        Ok(())
    }

    /// Begin marshalling an array.
    ///
    /// Emits the length prefix placeholder, pads to the element alignment
    /// and remembers the bounds of the element type so each appended element
    /// is checked against it.
    pub fn begin_array(&mut self) -> Result<()> {
        self.expect_code(Type::ARRAY)?;

        let (sig, pos) = self.active();
        let element_start = pos + 1;

        let Some(n) = next_type(&sig[element_start..]) else {
            return Err(Error::new(ErrorKind::SignatureEnded));
        };

        let element_end = element_start + n;
        let element = Type(sig[element_start]);

        let len_at = self.buf.alloc::<u32>();
        self.buf.align(element.alignment());
        let start = self.buf.written();

        self.set_active_pos(element_start);
        self.stack.push(Scope::Array {
            len_at,
            start,
            element_start,
            element_end,
        });

        Ok(())
    }

    /// Finish an array, backfilling its length prefix and skipping the
    /// signature cursor past the element type.
    pub fn end_array(&mut self) -> Result<()> {
        let Some(Scope::Array { element_start, .. }) = self.stack.last() else {
            return Err(Error::new(ErrorKind::NotInContainer));
        };

        if self.active_pos() != *element_start {
            return Err(Error::new(ErrorKind::IncompleteContainer));
        }

        let Some(Scope::Array {
            len_at,
            start,
            element_end,
            ..
        }) = self.stack.pop()
        else {
            return Err(Error::new(ErrorKind::NotInContainer));
        };

        let len = self.buf.written() - start;

        if len > MAX_ARRAY_LENGTH as usize {
            return Err(Error::new(ErrorKind::ArrayTooLong(len as u32)));
        }

        self.buf.store_at(len_at, len as u32);
        self.set_active_pos(element_end);
        self.complete_value();
        Ok(())
    }

    /// Begin marshalling a struct. Structs are aligned to 8.
    pub fn begin_struct(&mut self) -> Result<()> {
        self.expect_code(Type::OPEN_PAREN)?;
        self.buf.align(8);
        self.advance_active(1);
        self.stack.push(Scope::Struct);
        Ok(())
    }

    /// Finish a struct.
    pub fn end_struct(&mut self) -> Result<()> {
        if !matches!(self.stack.last(), Some(Scope::Struct)) {
            return Err(Error::new(ErrorKind::NotInContainer));
        }

        self.expect_code(Type::CLOSE_PAREN)
            .map_err(|_| Error::new(ErrorKind::IncompleteContainer))?;
        self.advance_active(1);
        self.stack.pop();
        self.complete_value();
        Ok(())
    }

    /// Begin marshalling a dict entry. Dict entries are aligned to 8.
    pub fn begin_dict_entry(&mut self) -> Result<()> {
        self.expect_code(Type::OPEN_BRACE)?;
        self.buf.align(8);
        self.advance_active(1);
        self.stack.push(Scope::DictEntry);
        Ok(())
    }

    /// Finish a dict entry.
    pub fn end_dict_entry(&mut self) -> Result<()> {
        if !matches!(self.stack.last(), Some(Scope::DictEntry)) {
            return Err(Error::new(ErrorKind::NotInContainer));
        }

        self.expect_code(Type::CLOSE_BRACE)
            .map_err(|_| Error::new(ErrorKind::IncompleteContainer))?;
        self.advance_active(1);
        self.stack.pop();
        self.complete_value();
        Ok(())
    }

    /// Begin marshalling a variant holding a single complete type described
    /// by `signature`.
    ///
    /// The signature is emitted as a signature field and subsequent appends
    /// marshal against it until [`end_variant`] restores the outer cursor.
    ///
    /// [`end_variant`]: Self::end_variant
    pub fn begin_variant(&mut self, signature: &Signature) -> Result<()> {
        if signature.is_empty() || next_type(signature.as_bytes()) != Some(signature.len()) {
            return Err(Error::new(ErrorKind::InvalidVariant));
        }

        self.expect_code(Type::VARIANT)?;
        self.buf.store(signature.len() as u8);
        self.buf.extend_from_slice_nul(signature.as_bytes());
        self.stack.push(Scope::Variant {
            inner: signature.to_owned(),
            pos: 0,
        });
        Ok(())
    }

    /// Finish a variant, restoring the outer signature cursor.
    pub fn end_variant(&mut self) -> Result<()> {
        let Some(Scope::Variant { inner, pos }) = self.stack.last() else {
            return Err(Error::new(ErrorKind::NotInContainer));
        };

        if *pos != inner.len() {
            return Err(Error::new(ErrorKind::IncompleteContainer));
        }

        self.stack.pop();
        self.advance_active(1);
        self.complete_value();
        Ok(())
    }

    /// The active signature and cursor position, accounting for any variant
    /// scope currently marshalled into.
    fn active(&self) -> (&[u8], usize) {
        for scope in self.stack.iter().rev() {
            if let Scope::Variant { inner, pos } = scope {
                return (inner.as_bytes(), *pos);
            }
        }

        (self.sig.as_bytes(), self.cursor)
    }

    fn active_pos(&self) -> usize {
        self.active().1
    }

    fn set_active_pos(&mut self, pos: usize) {
        for scope in self.stack.iter_mut().rev() {
            if let Scope::Variant { pos: p, .. } = scope {
                *p = pos;
                return;
            }
        }

        self.cursor = pos;
    }

    fn advance_active(&mut self, n: usize) {
        let pos = self.active_pos();
        self.set_active_pos(pos + n);
    }

    /// Check that the next expected type code is `code` without consuming
    /// it.
    fn expect_code(&self, code: Type) -> Result<()> {
        let (sig, pos) = self.active();

        let Some(&found) = sig.get(pos) else {
            return Err(Error::new(ErrorKind::SignatureEnded));
        };

        if found != code.0 {
            return Err(Error::new(ErrorKind::SignatureMismatch {
                expected: found,
                found: code.0,
            }));
        }

        Ok(())
    }

    /// Consume one basic type code from the signature cursor.
    fn expect(&mut self, code: Type) -> Result<()> {
        self.expect_code(code)?;
        self.advance_active(1);
        Ok(())
    }

    /// After a complete value, wrap the cursor back to the element start of
    /// an enclosing array so further elements marshal against the same type.
    fn complete_value(&mut self) {
        if let Some(Scope::Array {
            element_start,
            element_end,
            ..
        }) = self.stack.last()
        {
            let (element_start, element_end) = (*element_start, *element_end);

            if self.active_pos() == element_end {
                self.set_active_pos(element_start);
            }
        }
    }
}

impl Default for BodyBuf {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BodyBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyBuf")
            .field("signature", &self.sig)
            .field("len", &self.len())
            .finish()
    }
}

impl PartialEq for BodyBuf {
    fn eq(&self, other: &Self) -> bool {
        self.sig == other.sig && self.get() == other.get()
    }
}

impl Eq for BodyBuf {}

impl Clone for BodyBuf {
    fn clone(&self) -> Self {
        Self::from_parts(
            self.get().to_vec(),
            self.sig.clone(),
            self.buf.endianness(),
        )
    }
}
