//! Names and result codes of the `org.freedesktop.DBus` bus daemon
//! interface.

/// Well known destination name of the bus daemon.
pub const DESTINATION: &str = "org.freedesktop.DBus";

/// Well known interface name of the bus daemon.
pub const INTERFACE: &str = "org.freedesktop.DBus";

/// Well known object path of the bus daemon.
pub const PATH: &str = "/org/freedesktop/DBus";

/// The built-in introspection interface carried by every bound object.
pub const INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";

/// The built-in properties interface carried by every bound object.
pub const PROPERTIES: &str = "org.freedesktop.DBus.Properties";

raw_set! {
    /// The flags to a `RequestName` call.
    #[repr(u32)]
    pub enum NameFlag {
        /// Allow another application requesting the name with
        /// `REPLACE_EXISTING` to take it over.
        ALLOW_REPLACEMENT = 1,
        /// Try to replace the current owner if there is one.
        REPLACE_EXISTING = 2,
        /// Fail the request instead of queueing when the name is taken.
        DO_NOT_QUEUE = 4,
    }
}

raw_enum! {
    /// The reply to a `RequestName` call.
    #[repr(u32)]
    pub enum NameReply {
        /// The caller is now the primary owner of the name.
        PRIMARY_OWNER = 1,
        /// The name already had an owner and the caller has been queued for
        /// it.
        IN_QUEUE = 2,
        /// The name already has an owner and `DO_NOT_QUEUE` was specified.
        EXISTS = 3,
        /// The caller already owns the name.
        ALREADY_OWNER = 4,
    }
}

raw_enum! {
    /// The reply to a `ReleaseName` call.
    #[repr(u32)]
    pub enum ReleaseNameReply {
        /// The caller has given up the name.
        RELEASED = 1,
        /// The name does not exist on the bus.
        NON_EXISTENT = 2,
        /// The caller was not the owner of, nor queued for, the name.
        NOT_OWNER = 3,
    }
}
