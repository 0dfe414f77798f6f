use std::error;
use std::fmt;

/// Detailed errors raised when validation of a [`Signature`] fails.
///
/// [`Signature`]: crate::Signature
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureError {
    kind: SignatureErrorKind,
}

impl SignatureError {
    pub(crate) const fn new(kind: SignatureErrorKind) -> Self {
        Self { kind }
    }
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SignatureErrorKind::SignatureTooLong => {
                write!(f, "Signature is longer than 255 bytes")
            }
            SignatureErrorKind::UnknownTypeCode(code) => {
                write!(f, "Unknown type code `{}`", code as char)
            }
            SignatureErrorKind::MissingArrayElementType => {
                write!(f, "Array is missing its element type")
            }
            SignatureErrorKind::StructEndedButNotStarted => {
                write!(f, "Struct ended but was never started")
            }
            SignatureErrorKind::StructHasNoFields => {
                write!(f, "Struct has no fields")
            }
            SignatureErrorKind::DictEndedButNotStarted => {
                write!(f, "Dict entry ended but was never started")
            }
            SignatureErrorKind::DictEntryHasNoFields => {
                write!(f, "Dict entry has no fields")
            }
            SignatureErrorKind::DictEntryHasOnlyOneField => {
                write!(f, "Dict entry has only one field")
            }
            SignatureErrorKind::DictEntryHasTooManyFields => {
                write!(f, "Dict entry has too many fields")
            }
            SignatureErrorKind::DictEntryNotInsideArray => {
                write!(f, "Dict entry must be the element type of an array")
            }
            SignatureErrorKind::DictKeyMustBeBasic => {
                write!(f, "Dict entry key must be a basic type")
            }
            SignatureErrorKind::ExceededMaximumDepth => {
                write!(f, "Exceeded maximum container depth")
            }
            SignatureErrorKind::UnterminatedContainer => {
                write!(f, "Unterminated container in signature")
            }
        }
    }
}

impl error::Error for SignatureError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignatureErrorKind {
    SignatureTooLong,
    UnknownTypeCode(u8),
    MissingArrayElementType,
    StructEndedButNotStarted,
    StructHasNoFields,
    DictEndedButNotStarted,
    DictEntryHasNoFields,
    DictEntryHasOnlyOneField,
    DictEntryHasTooManyFields,
    DictEntryNotInsideArray,
    DictKeyMustBeBasic,
    ExceededMaximumDepth,
    UnterminatedContainer,
}
