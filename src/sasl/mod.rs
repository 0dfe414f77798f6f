//! The SASL line exchange performed before the binary D-Bus protocol.
//!
//! The authenticator is sans-I/O: the caller transmits the byte strings it
//! produces and feeds back each CRLF-terminated server line.


use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use log::debug;
use rand::Rng;
use sha1::{Digest, Sha1};

use crate::error::{Error, ErrorKind, Result};

/// The SASL authentication mechanism to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// `EXTERNAL`: authenticate with credentials transferred out-of-band,
    /// typically over a unix socket.
    External,
    /// `DBUS_COOKIE_SHA1`: prove access to a cookie in the user's home
    /// directory.
    CookieSha1,
}

impl Mechanism {
    fn name(self) -> &'static str {
        match self {
            Mechanism::External => "EXTERNAL",
            Mechanism::CookieSha1 => "DBUS_COOKIE_SHA1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    WaitingForData,
    WaitingForOk,
    Done,
}

/// Client state machine for the initial bus handshake.
///
/// # Examples
///
/// ```
/// use dbus_wire::sasl::{Authenticator, Mechanism};
///
/// let mut auth = Authenticator::new(Mechanism::External).with_local_id("1000");
///
/// let hello = auth.initial_send()?;
/// assert_eq!(hello, b"\0AUTH EXTERNAL 31303030\r\n");
///
/// let begin = auth.advance(b"OK 1234deadbeef\r\n")?.expect("a response");
/// assert_eq!(begin, b"BEGIN\r\n");
/// assert!(auth.is_done());
/// # Ok::<_, dbus_wire::Error>(())
/// ```
pub struct Authenticator {
    mechanism: Mechanism,
    state: State,
    local_id: Option<String>,
    keyring_dir: Option<PathBuf>,
    challenge: Option<[u8; 32]>,
}

impl Authenticator {
    /// Construct a new authenticator for the given mechanism.
    ///
    /// The local identity defaults to the decimal effective uid on unix.
    pub fn new(mechanism: Mechanism) -> Self {
        Self {
            mechanism,
            state: State::Start,
            local_id: default_local_id(),
            keyring_dir: None,
            challenge: None,
        }
    }

    /// Use an explicit local identity instead of the effective uid.
    #[must_use]
    pub fn with_local_id(mut self, id: &str) -> Self {
        self.local_id = Some(id.into());
        self
    }

    /// Look up cookies under `dir` instead of `$HOME/.dbus-keyrings`.
    #[must_use]
    pub fn with_keyring_dir<P>(mut self, dir: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.keyring_dir = Some(dir.into());
        self
    }

    /// Use a fixed client challenge instead of a random one.
    #[must_use]
    pub fn with_challenge(mut self, challenge: [u8; 32]) -> Self {
        self.challenge = Some(challenge);
        self
    }

    /// Whether the exchange has completed and the connection may switch to
    /// the binary protocol.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Produce the opening bytes of the handshake: the NUL byte followed by
    /// the `AUTH` line.
    pub fn initial_send(&mut self) -> Result<Vec<u8>> {
        let Some(id) = &self.local_id else {
            return Err(Error::new(ErrorKind::MissingLocalId));
        };

        debug!("authenticating with {} as {id}", self.mechanism.name());

        let mut out = Vec::new();
        out.push(0);
        out.extend_from_slice(b"AUTH ");
        out.extend_from_slice(self.mechanism.name().as_bytes());
        out.push(b' ');
        out.extend_from_slice(hex::encode(id.as_bytes()).as_bytes());
        out.extend_from_slice(b"\r\n");

        self.state = match self.mechanism {
            Mechanism::External => State::WaitingForOk,
            Mechanism::CookieSha1 => State::WaitingForData,
        };

        Ok(out)
    }

    /// Feed one server line, returning the bytes to send in response, if
    /// any.
    pub fn advance(&mut self, line: &[u8]) -> Result<Option<Vec<u8>>> {
        let line = trim_line(line);

        let (command, rest) = match line.iter().position(|&b| b == b' ') {
            Some(n) => (&line[..n], &line[n + 1..]),
            None => (line, &line[..0]),
        };

        match (self.state, command) {
            (State::WaitingForOk, b"OK") => {
                self.state = State::Done;
                Ok(Some(b"BEGIN\r\n".to_vec()))
            }
            (State::WaitingForData, b"DATA") => {
                let reply = self.cookie_reply(rest)?;
                self.state = State::WaitingForOk;
                Ok(Some(reply))
            }
            (_, b"REJECTED") => Err(Error::new(ErrorKind::SaslRejected)),
            _ => Err(Error::new(ErrorKind::InvalidSasl)),
        }
    }

    /// Compute the `DBUS_COOKIE_SHA1` response for the server's hex-encoded
    /// `<keyring> <cookie-id> <challenge>` payload.
    fn cookie_reply(&self, hex_payload: &[u8]) -> Result<Vec<u8>> {
        let Ok(payload) = hex::decode(hex_payload) else {
            return Err(Error::new(ErrorKind::InvalidSasl));
        };

        let Ok(payload) = std::str::from_utf8(&payload) else {
            return Err(Error::new(ErrorKind::InvalidSasl));
        };

        let mut parts = payload.splitn(3, ' ');

        let (Some(keyring), Some(cookie_id), Some(server_challenge)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::new(ErrorKind::InvalidSasl));
        };

        let secret = self.find_cookie(keyring, cookie_id)?;

        let challenge = match self.challenge {
            Some(challenge) => challenge,
            None => {
                let mut challenge = [0u8; 32];
                rand::thread_rng().fill(&mut challenge[..]);
                challenge
            }
        };

        let challenge_hex = hex::encode(challenge);

        let mut sha = Sha1::new();
        sha.update(server_challenge.as_bytes());
        sha.update(b":");
        sha.update(challenge_hex.as_bytes());
        sha.update(b":");
        sha.update(secret.as_bytes());
        let digest = hex::encode(sha.finalize());

        let reply = format!("{challenge_hex} {digest}");

        let mut out = Vec::new();
        out.extend_from_slice(b"DATA ");
        out.extend_from_slice(hex::encode(reply.as_bytes()).as_bytes());
        out.extend_from_slice(b"\r\n");
        Ok(out)
    }

    /// Look up the cookie secret for `cookie_id` in the named keyring file.
    ///
    /// Keyring lines have the format `<id> <creation-time> <secret>`.
    fn find_cookie(&self, keyring: &str, cookie_id: &str) -> Result<String> {
        // Keyring names come from the server; refuse anything that could
        // escape the keyring directory.
        if keyring.is_empty() || keyring.contains('/') || keyring.contains('\\') {
            return Err(Error::new(ErrorKind::InvalidSasl));
        }

        let mut path = match &self.keyring_dir {
            Some(dir) => dir.clone(),
            None => {
                let Some(home) = std::env::var_os("HOME") else {
                    return Err(Error::new(ErrorKind::MissingCookie));
                };

                let mut path = PathBuf::from(home);
                path.push(".dbus-keyrings");
                path
            }
        };

        path.push(keyring);

        let file = File::open(&path).map_err(|_| Error::new(ErrorKind::MissingCookie))?;

        for line in BufReader::new(file).lines() {
            let line = line?;
            let mut parts = line.splitn(3, ' ');

            let (Some(id), Some(_time), Some(secret)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };

            if id == cookie_id {
                return Ok(secret.trim_end().to_owned());
            }
        }

        Err(Error::new(ErrorKind::MissingCookie))
    }
}

/// Strip a trailing CRLF or LF.
fn trim_line(line: &[u8]) -> &[u8] {
    let line = match line {
        [rest @ .., b'\n'] => rest,
        rest => rest,
    };

    match line {
        [rest @ .., b'\r'] => rest,
        rest => rest,
    }
}

#[cfg(all(unix, feature = "libc"))]
fn default_local_id() -> Option<String> {
    // SAFETY: geteuid has no failure modes.
    let uid = unsafe { libc::geteuid() };
    Some(uid.to_string())
}

#[cfg(not(all(unix, feature = "libc")))]
fn default_local_id() -> Option<String> {
    None
}
