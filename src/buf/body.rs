use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr;
use std::str::from_utf8;

use crate::error::{Error, ErrorKind, Result};
use crate::frame::Frame;
use crate::object_path::ObjectPath;
use crate::proto::{Endianness, Type, MAX_ARRAY_LENGTH};
use crate::signature::{next_type, Signature};

use super::padding_to;

/// One field produced by walking a message body.
///
/// Container boundaries carry the `scope` at which the container was
/// entered, which can be handed back to [`Body::scope_at_end`] and
/// [`Body::skip_array`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Byte(u8),
    Boolean(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(&'a str),
    ObjectPath(&'a ObjectPath),
    Signature(&'a Signature),
    ArrayBegin { scope: usize },
    ArrayEnd,
    StructBegin { scope: usize },
    StructEnd,
    DictEntryBegin { scope: usize },
    DictEntryEnd,
    VariantBegin { scope: usize, signature: &'a Signature },
    VariantEnd,
}

enum Scope<'a> {
    Array {
        data_end: usize,
        element_start: usize,
        element_end: usize,
    },
    Struct,
    DictEntry,
    Variant {
        inner: &'a Signature,
        pos: usize,
    },
}

/// A reader walking a message body against its signature.
///
/// The reader borrows from the message buffer and must not outlive it.
/// Offsets are counted from the start of the body, which the wire format
/// guarantees is 8-aligned.
///
/// # Examples
///
/// ```
/// use dbus_wire::{BodyBuf, Signature};
///
/// let mut buf = BodyBuf::new();
/// buf.append_arguments(Signature::new(b"su")?)?;
/// buf.append_str("hello")?;
/// buf.append_u32(42)?;
///
/// let mut body = buf.peek();
/// assert_eq!(body.read_str()?, "hello");
/// assert_eq!(body.read_u32()?, 42);
/// body.finish()?;
/// # Ok::<_, dbus_wire::Error>(())
/// ```
pub struct Body<'a> {
    data: &'a [u8],
    at: usize,
    sig: &'a Signature,
    cursor: usize,
    stack: Vec<Scope<'a>>,
    endianness: Endianness,
}

impl<'a> Body<'a> {
    /// Construct a new reader over `data` with the given signature.
    pub(crate) fn new(data: &'a [u8], sig: &'a Signature, endianness: Endianness) -> Self {
        Self {
            data,
            at: 0,
            sig,
            cursor: 0,
            stack: Vec::new(),
            endianness,
        }
    }

    /// The signature this body is walked against.
    pub fn signature(&self) -> &'a Signature {
        self.sig
    }

    /// The byte order scalar loads are adjusted from.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Walk the same bytes against a different signature.
    pub fn with_signature(self, sig: &'a Signature) -> Self {
        Self { sig, ..self }
    }

    /// Read the next field, or `None` once all arguments are consumed.
    pub fn next(&mut self) -> Result<Option<Field<'a>>> {
        match self.stack.last() {
            Some(Scope::Array {
                data_end,
                element_end,
                ..
            }) => {
                if self.at == *data_end {
                    let element_end = *element_end;
                    self.stack.pop();
                    self.set_active_pos(element_end);
                    self.complete_value();
                    return Ok(Some(Field::ArrayEnd));
                }
            }
            Some(Scope::Struct) => {
                if self.active_code() == Some(Type::CLOSE_PAREN.0) {
                    self.advance_active(1);
                    self.stack.pop();
                    self.complete_value();
                    return Ok(Some(Field::StructEnd));
                }
            }
            Some(Scope::DictEntry) => {
                if self.active_code() == Some(Type::CLOSE_BRACE.0) {
                    self.advance_active(1);
                    self.stack.pop();
                    self.complete_value();
                    return Ok(Some(Field::DictEntryEnd));
                }
            }
            Some(Scope::Variant { inner, pos }) => {
                if *pos == inner.len() {
                    self.stack.pop();
                    self.advance_active(1);
                    self.complete_value();
                    return Ok(Some(Field::VariantEnd));
                }
            }
            None => {
                if self.cursor == self.sig.len() {
                    return Ok(None);
                }
            }
        }

        let Some(code) = self.active_code() else {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        };

        let field = match Type(code) {
            Type::BYTE => {
                let value = self.load::<u8>()?;
                self.consume_basic();
                Field::Byte(value)
            }
            Type::BOOLEAN => {
                let value = match self.load::<u32>()? {
                    0 => false,
                    1 => true,
                    other => return Err(Error::new(ErrorKind::InvalidBoolean(other))),
                };

                self.consume_basic();
                Field::Boolean(value)
            }
            Type::INT16 => {
                let value = self.load::<i16>()?;
                self.consume_basic();
                Field::Int16(value)
            }
            Type::UINT16 => {
                let value = self.load::<u16>()?;
                self.consume_basic();
                Field::UInt16(value)
            }
            Type::INT32 => {
                let value = self.load::<i32>()?;
                self.consume_basic();
                Field::Int32(value)
            }
            Type::UINT32 => {
                let value = self.load::<u32>()?;
                self.consume_basic();
                Field::UInt32(value)
            }
            Type::INT64 => {
                let value = self.load::<i64>()?;
                self.consume_basic();
                Field::Int64(value)
            }
            Type::UINT64 => {
                let value = self.load::<u64>()?;
                self.consume_basic();
                Field::UInt64(value)
            }
            Type::DOUBLE => {
                let value = self.load::<f64>()?;
                self.consume_basic();
                Field::Double(value)
            }
            Type::STRING => {
                let value = self.load_string()?;
                self.consume_basic();
                Field::String(value)
            }
            Type::OBJECT_PATH => {
                let value = self.load_string()?;
                let path = ObjectPath::new(value)
                    .map_err(|_| Error::new(ErrorKind::InvalidProtocol))?;
                self.consume_basic();
                Field::ObjectPath(path)
            }
            Type::SIGNATURE => {
                let value = self.load_signature()?;
                self.consume_basic();
                Field::Signature(value)
            }
            Type::ARRAY => {
                let (sig, pos) = self.active();
                let element_start = pos + 1;

                let Some(n) = next_type(&sig[element_start..]) else {
                    return Err(Error::new(ErrorKind::InvalidProtocol));
                };

                let element_end = element_start + n;
                let element = Type(sig[element_start]);

                let len = self.load::<u32>()?;

                if len > MAX_ARRAY_LENGTH {
                    return Err(Error::new(ErrorKind::ArrayTooLong(len)));
                }

                self.align(element.alignment())?;
                let data_end = self.at + len as usize;

                if data_end > self.data.len() {
                    return Err(Error::new(ErrorKind::BufferUnderflow));
                }

                self.set_active_pos(element_start);
                self.stack.push(Scope::Array {
                    data_end,
                    element_start,
                    element_end,
                });

                Field::ArrayBegin {
                    scope: self.stack.len(),
                }
            }
            Type::OPEN_PAREN => {
                self.align(8)?;
                self.advance_active(1);
                self.stack.push(Scope::Struct);

                Field::StructBegin {
                    scope: self.stack.len(),
                }
            }
            Type::OPEN_BRACE => {
                self.align(8)?;
                self.advance_active(1);
                self.stack.push(Scope::DictEntry);

                Field::DictEntryBegin {
                    scope: self.stack.len(),
                }
            }
            Type::VARIANT => {
                let inner = self.load_signature()?;

                if inner.is_empty() || next_type(inner.as_bytes()) != Some(inner.len()) {
                    return Err(Error::new(ErrorKind::InvalidVariant));
                }

                self.stack.push(Scope::Variant { inner, pos: 0 });

                Field::VariantBegin {
                    scope: self.stack.len(),
                    signature: inner,
                }
            }
            _ => return Err(Error::new(ErrorKind::InvalidProtocol)),
        };

        Ok(Some(field))
    }

    /// Read one byte, failing unless it is the next field.
    pub fn read_byte(&mut self) -> Result<u8> {
        match self.next()? {
            Some(Field::Byte(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one boolean, failing unless it is the next field.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.next()? {
            Some(Field::Boolean(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one 16-bit signed integer, failing unless it is the next field.
    pub fn read_i16(&mut self) -> Result<i16> {
        match self.next()? {
            Some(Field::Int16(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one 16-bit unsigned integer, failing unless it is the next
    /// field.
    pub fn read_u16(&mut self) -> Result<u16> {
        match self.next()? {
            Some(Field::UInt16(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one 32-bit signed integer, failing unless it is the next field.
    pub fn read_i32(&mut self) -> Result<i32> {
        match self.next()? {
            Some(Field::Int32(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one 32-bit unsigned integer, failing unless it is the next
    /// field.
    pub fn read_u32(&mut self) -> Result<u32> {
        match self.next()? {
            Some(Field::UInt32(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one 64-bit signed integer, failing unless it is the next field.
    pub fn read_i64(&mut self) -> Result<i64> {
        match self.next()? {
            Some(Field::Int64(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one 64-bit unsigned integer, failing unless it is the next
    /// field.
    pub fn read_u64(&mut self) -> Result<u64> {
        match self.next()? {
            Some(Field::UInt64(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one double, failing unless it is the next field.
    pub fn read_double(&mut self) -> Result<f64> {
        match self.next()? {
            Some(Field::Double(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one string, failing unless it is the next field.
    pub fn read_str(&mut self) -> Result<&'a str> {
        match self.next()? {
            Some(Field::String(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one object path, failing unless it is the next field.
    pub fn read_object_path(&mut self) -> Result<&'a ObjectPath> {
        match self.next()? {
            Some(Field::ObjectPath(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Read one signature value, failing unless it is the next field.
    pub fn read_signature(&mut self) -> Result<&'a Signature> {
        match self.next()? {
            Some(Field::Signature(value)) => Ok(value),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Enter an array, returning its scope.
    pub fn read_array_begin(&mut self) -> Result<usize> {
        match self.next()? {
            Some(Field::ArrayBegin { scope }) => Ok(scope),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Leave an array.
    pub fn read_array_end(&mut self) -> Result<()> {
        match self.next()? {
            Some(Field::ArrayEnd) => Ok(()),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Enter a struct, returning its scope.
    pub fn read_struct_begin(&mut self) -> Result<usize> {
        match self.next()? {
            Some(Field::StructBegin { scope }) => Ok(scope),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Leave a struct.
    pub fn read_struct_end(&mut self) -> Result<()> {
        match self.next()? {
            Some(Field::StructEnd) => Ok(()),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Enter a dict entry, returning its scope.
    pub fn read_dict_entry_begin(&mut self) -> Result<usize> {
        match self.next()? {
            Some(Field::DictEntryBegin { scope }) => Ok(scope),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Leave a dict entry.
    pub fn read_dict_entry_end(&mut self) -> Result<()> {
        match self.next()? {
            Some(Field::DictEntryEnd) => Ok(()),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Enter a variant, returning its scope and inner signature.
    pub fn read_variant_begin(&mut self) -> Result<(usize, &'a Signature)> {
        match self.next()? {
            Some(Field::VariantBegin { scope, signature }) => Ok((scope, signature)),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Leave a variant.
    pub fn read_variant_end(&mut self) -> Result<()> {
        match self.next()? {
            Some(Field::VariantEnd) => Ok(()),
            _ => Err(Error::new(ErrorKind::ArgumentMismatch)),
        }
    }

    /// Fail unless every argument has been consumed.
    pub fn finish(&mut self) -> Result<()> {
        if self.next()?.is_some() {
            return Err(Error::new(ErrorKind::ArgumentMismatch));
        }

        Ok(())
    }

    /// Test if the container entered at `scope` has been fully consumed.
    ///
    /// Scope 0 refers to the argument list itself.
    pub fn scope_at_end(&self, scope: usize) -> bool {
        if self.stack.len() < scope {
            return true;
        }

        if self.stack.len() > scope {
            return false;
        }

        match self.stack.last() {
            Some(Scope::Array { data_end, .. }) => self.at == *data_end,
            Some(Scope::Struct) => self.active_code() == Some(Type::CLOSE_PAREN.0),
            Some(Scope::DictEntry) => self.active_code() == Some(Type::CLOSE_BRACE.0),
            Some(Scope::Variant { inner, pos }) => *pos == inner.len(),
            None => self.cursor == self.sig.len(),
        }
    }

    /// Fast-forward to the end of the array entered at `scope` without
    /// visiting its remaining elements. The matching [`Field::ArrayEnd`] is
    /// still produced by the next read.
    pub fn skip_array(&mut self, scope: usize) -> Result<()> {
        if self.stack.len() != scope {
            return Err(Error::new(ErrorKind::NotInContainer));
        }

        let Some(Scope::Array { data_end, .. }) = self.stack.last() else {
            return Err(Error::new(ErrorKind::NotInContainer));
        };

        self.at = *data_end;
        Ok(())
    }

    fn active(&self) -> (&'a [u8], usize) {
        for scope in self.stack.iter().rev() {
            if let Scope::Variant { inner, pos } = scope {
                return (inner.as_bytes(), *pos);
            }
        }

        (self.sig.as_bytes(), self.cursor)
    }

    fn active_code(&self) -> Option<u8> {
        let (sig, pos) = self.active();
        sig.get(pos).copied()
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
        let (_, pos) = self.active();
        self.set_active_pos(pos + n);
    }

    /// Consume one basic type code and apply the array element wrap-around.
    fn consume_basic(&mut self) {
        self.advance_active(1);
        self.complete_value();
    }

    fn complete_value(&mut self) {
        if let Some(Scope::Array {
            element_start,
            element_end,
            ..
        }) = self.stack.last()
        {
            let (element_start, element_end) = (*element_start, *element_end);

            if self.active().1 == element_end {
                self.set_active_pos(element_start);
            }
        }
    }

    fn align(&mut self, align: usize) -> Result<()> {
        let padding = padding_to(align, self.at);

        if self.at + padding > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        self.at += padding;
        Ok(())
    }

    fn load<T>(&mut self) -> Result<T>
    where
        T: Frame,
    {
        self.align(align_of::<T>())?;

        if self.at + size_of::<T>() > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        // SAFETY: The range was verified to be in bounds just above.
        let mut value =
            unsafe { ptr::read_unaligned(self.data.as_ptr().add(self.at).cast::<T>()) };
        self.at += size_of::<T>();
        value.adjust(self.endianness);
        Ok(value)
    }

    fn load_slice_nul(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.at + len + 1 > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        if self.data[self.at + len] != 0 {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        let bytes = &self.data[self.at..self.at + len];

        if bytes.contains(&0) {
            return Err(Error::new(ErrorKind::EmbeddedNull));
        }

        self.at += len + 1;
        Ok(bytes)
    }

    fn load_string(&mut self) -> Result<&'a str> {
        let len = self.load::<u32>()? as usize;
        let bytes = self.load_slice_nul(len)?;
        Ok(from_utf8(bytes)?)
    }

    fn load_signature(&mut self) -> Result<&'a Signature> {
        let len = self.load::<u8>()? as usize;
        let bytes = self.load_slice_nul(len)?;
        Ok(Signature::new(bytes)?)
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("signature", &self.sig)
            .field("len", &self.data.len())
            .finish()
    }
}
