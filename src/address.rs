//! Parsing of D-Bus server addresses.
//!
//! Addresses have the form `type:key=value,key=value,…` and several
//! addresses may be listed separated by `;`. The transport collaborator
//! consumes the parsed address to establish the byte stream this crate is
//! fed with.

use crate::error::{Error, ErrorKind, Result};

/// A parsed D-Bus server address.
///
/// # Examples
///
/// ```
/// use dbus_wire::Address;
///
/// let address = Address::parse("unix:file=/var/run/dbus/system_bus_socket")?;
/// assert_eq!(address, Address::Unix { path: "/var/run/dbus/system_bus_socket".into() });
///
/// let address = Address::parse("tcp:host=localhost,port=1234")?;
/// assert_eq!(address, Address::Tcp { host: "localhost".into(), port: 1234 });
/// # Ok::<_, dbus_wire::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Address {
    /// A unix domain socket at a filesystem path.
    Unix {
        /// Filesystem path of the socket.
        path: String,
    },
    /// A unix domain socket in the abstract namespace.
    UnixAbstract {
        /// Name in the abstract namespace.
        name: String,
    },
    /// A TCP connection.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl Address {
    /// Parse the first supported address in an address string.
    pub fn parse(string: &str) -> Result<Address> {
        let mut last = Error::new(ErrorKind::InvalidAddress);

        for part in string.split(';') {
            match Self::parse_single(part) {
                Ok(address) => return Ok(address),
                Err(error) => last = error,
            }
        }

        Err(last)
    }

    fn parse_single(string: &str) -> Result<Address> {
        let Some((proto, rest)) = string.split_once(':') else {
            return Err(Error::new(ErrorKind::InvalidAddress));
        };

        let mut file = None;
        let mut name = None;
        let mut host = None;
        let mut port = None;

        for pair in rest.split(',') {
            if pair.is_empty() {
                continue;
            }

            let Some((key, value)) = pair.split_once('=') else {
                return Err(Error::new(ErrorKind::InvalidAddress));
            };

            match key {
                // The reference implementation and existing clients disagree
                // on the key naming here, so accept both.
                "file" | "path" => file = Some(value),
                "abstract" => name = Some(value),
                "host" => host = Some(value),
                "port" => port = Some(value),
                _ => {}
            }
        }

        match proto {
            "unix" => {
                if let Some(name) = name {
                    return Ok(Address::UnixAbstract { name: name.into() });
                }

                if let Some(path) = file {
                    return Ok(Address::Unix { path: path.into() });
                }

                Err(Error::new(ErrorKind::InvalidAddress))
            }
            "tcp" => {
                let (Some(host), Some(port)) = (host, port) else {
                    return Err(Error::new(ErrorKind::InvalidAddress));
                };

                let Ok(port) = port.parse::<u16>() else {
                    return Err(Error::new(ErrorKind::InvalidAddress));
                };

                Ok(Address::Tcp {
                    host: host.into(),
                    port,
                })
            }
            _ => Err(Error::new(ErrorKind::InvalidAddress)),
        }
    }
}
