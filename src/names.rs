//! Validation of D-Bus interface, bus and member names.

fn is_name_char(c: u8) -> bool {
    matches!(c, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
}

/// Test if `name` is a valid interface name.
///
/// Interface names are 1-255 characters, contain at least one `.`, and each
/// dot-separated segment starts with `[A-Za-z_]` and continues with
/// `[A-Za-z0-9_]`.
pub(crate) fn is_valid_interface_name(name: &str) -> bool {
    let bytes = name.as_bytes();

    if bytes.is_empty() || bytes.len() > 255 {
        return false;
    }

    let mut saw_dot = false;
    let mut segment_start = true;

    for &c in bytes {
        if c == b'.' {
            if segment_start {
                return false;
            }

            saw_dot = true;
            segment_start = true;
        } else if segment_start {
            if !is_name_char(c) || c.is_ascii_digit() {
                return false;
            }

            segment_start = false;
        } else if !is_name_char(c) {
            return false;
        }
    }

    saw_dot && !segment_start
}

/// Test if `name` is a valid bus name, either unique (`:1.42`) or well-known
/// (`com.example.Service`).
pub(crate) fn is_valid_bus_name(name: &str) -> bool {
    let bytes = name.as_bytes();

    if bytes.is_empty() || bytes.len() > 255 {
        return false;
    }

    let (unique, rest) = match bytes {
        [b':', rest @ ..] => (true, rest),
        rest => (false, rest),
    };

    let mut saw_dot = false;
    let mut segment_start = true;

    for &c in rest {
        if c == b'.' {
            if segment_start {
                return false;
            }

            saw_dot = true;
            segment_start = true;
        } else if segment_start {
            // Unique name segments may start with a digit.
            if !(is_name_char(c) || c == b'-') || (!unique && c.is_ascii_digit()) {
                return false;
            }

            segment_start = false;
        } else if !(is_name_char(c) || c == b'-') {
            return false;
        }
    }

    saw_dot && !segment_start
}

/// Test if `name` is a valid member name: 1-255 characters from
/// `[A-Za-z0-9_]`, not starting with a digit and containing no dots.
pub(crate) fn is_valid_member_name(name: &str) -> bool {
    let bytes = name.as_bytes();

    if bytes.is_empty() || bytes.len() > 255 {
        return false;
    }

    if bytes[0].is_ascii_digit() {
        return false;
    }

    bytes.iter().all(|&c| is_name_char(c))
}

/// Test if a bus name is a well-known service name which requires unique
/// name resolution before senders can be compared against it.
///
/// The bus daemon itself is exempt: it addresses messages with its
/// well-known name directly, and tracking it would recurse into the
/// tracking machinery.
pub(crate) fn requires_service_lookup(name: &str) -> bool {
    !name.starts_with(':') && name.contains('.') && name != "org.freedesktop.DBus"
}
