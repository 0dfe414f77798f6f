use super::signature_error::SignatureErrorKind::*;
use super::{SignatureError, MAX_DEPTH, MAX_SIGNATURE_LENGTH};

const NONE: u8 = 0;
const ARRAY: u8 = 1;
const STRUCT: u8 = 2;
const DICT: u8 = 3;

const fn is_basic(code: u8) -> bool {
    matches!(
        code,
        b'y' | b'b' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'd' | b's' | b'o' | b'g'
    )
}

/// Validate that `bytes` is a sequence of zero or more complete types.
pub(crate) const fn validate(bytes: &[u8]) -> Result<(), SignatureError> {
    if bytes.len() > MAX_SIGNATURE_LENGTH {
        return Err(SignatureError::new(SignatureTooLong));
    }

    // Each entry is the kind of the open container and the number of
    // complete fields seen inside of it so far.
    let mut stack = [(NONE, 0u8); MAX_DEPTH];
    let mut len = 0usize;
    let mut n = 0usize;

    while n < bytes.len() {
        let b = bytes[n];
        n += 1;

        let completes = match b {
            _ if is_basic(b) => true,
            b'v' => true,
            b'a' => {
                if len == MAX_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumDepth));
                }

                stack[len] = (ARRAY, 0);
                len += 1;
                continue;
            }
            b'(' => {
                if len == MAX_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumDepth));
                }

                stack[len] = (STRUCT, 0);
                len += 1;
                continue;
            }
            b')' => {
                if len == 0 {
                    return Err(SignatureError::new(StructEndedButNotStarted));
                }

                len -= 1;

                match stack[len] {
                    (STRUCT, 0) => return Err(SignatureError::new(StructHasNoFields)),
                    (STRUCT, _) => {}
                    (ARRAY, _) => return Err(SignatureError::new(MissingArrayElementType)),
                    _ => return Err(SignatureError::new(StructEndedButNotStarted)),
                }

                true
            }
            b'{' => {
                // A dict entry is only legal as the element type of an array.
                if len == 0 || stack[len - 1].0 != ARRAY {
                    return Err(SignatureError::new(DictEntryNotInsideArray));
                }

                if len == MAX_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumDepth));
                }

                stack[len] = (DICT, 0);
                len += 1;
                continue;
            }
            b'}' => {
                if len == 0 {
                    return Err(SignatureError::new(DictEndedButNotStarted));
                }

                len -= 1;

                match stack[len] {
                    (DICT, 0) => return Err(SignatureError::new(DictEntryHasNoFields)),
                    (DICT, 1) => return Err(SignatureError::new(DictEntryHasOnlyOneField)),
                    (DICT, 2) => {}
                    (DICT, _) => return Err(SignatureError::new(DictEntryHasTooManyFields)),
                    (ARRAY, _) => return Err(SignatureError::new(MissingArrayElementType)),
                    _ => return Err(SignatureError::new(DictEndedButNotStarted)),
                }

                true
            }
            b => return Err(SignatureError::new(UnknownTypeCode(b))),
        };

        if completes {
            // The first field of a dict entry is its key and must be basic.
            // A completed container landing in that position is an error.
            if len > 0 && stack[len - 1].0 == DICT && stack[len - 1].1 == 0 && !is_basic(b) {
                return Err(SignatureError::new(DictKeyMustBeBasic));
            }

            // A complete value closes any directly enclosing arrays.
            while len > 0 && stack[len - 1].0 == ARRAY {
                len -= 1;

                if len > 0 && stack[len - 1].0 == DICT && stack[len - 1].1 == 0 {
                    return Err(SignatureError::new(DictKeyMustBeBasic));
                }
            }

            if len > 0 {
                stack[len - 1].1 += 1;
            }
        }
    }

    if len != 0 {
        return Err(SignatureError::new(UnterminatedContainer));
    }

    Ok(())
}

/// The length in bytes of the first complete type in `bytes`.
///
/// Applied to the position just past an `a` this locates the bounds of the
/// array's element type. Returns `None` when `bytes` is empty or does not
/// start a complete type.
pub(crate) fn next_type(bytes: &[u8]) -> Option<usize> {
    let mut n = 0;

    while bytes.get(n) == Some(&b'a') {
        n += 1;
    }

    match *bytes.get(n)? {
        b'(' | b'{' => {
            let mut depth = 0usize;

            loop {
                match *bytes.get(n)? {
                    b'(' | b'{' => depth += 1,
                    b')' | b'}' => depth -= 1,
                    _ => {}
                }

                n += 1;

                if depth == 0 {
                    break;
                }
            }

            Some(n)
        }
        b'v' => Some(n + 1),
        b if is_basic(b) => Some(n + 1),
        _ => None,
    }
}
