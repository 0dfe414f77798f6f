//! Extraction of whole messages from a byte stream.

use log::trace;

use crate::error::{Error, ErrorKind, Result};
use crate::message::{next_message_size, parse};
use crate::proto::EXTENDED_HEADER_SIZE;
use crate::Message;

/// A framer accumulating stream bytes until a whole message is available.
///
/// Incoming data may contain partial messages or several coalesced ones.
/// Call [`parse`] repeatedly with the same cursor until it returns
/// `Ok(None)`, at which point all complete messages have been drained and
/// any remainder has been buffered.
///
/// When the caller's buffer already contains at least one whole message and
/// nothing is buffered, the message is parsed directly from the caller's
/// bytes without copying them first.
///
/// A parse error marks the stream as corrupt: framing can not be
/// resynchronized, so every subsequent call fails.
///
/// [`parse`]: Self::parse
///
/// # Examples
///
/// ```
/// use dbus_wire::{Message, ObjectPath, StreamBuf};
///
/// let wire = Message::method_call(ObjectPath::ROOT, "Ping")
///     .with_serial(1.try_into()?)
///     .to_wire()?;
///
/// let mut stream = StreamBuf::new();
/// let (first, second) = wire.split_at(10);
///
/// let mut data = first;
/// assert!(stream.parse(&mut data)?.is_none());
///
/// let mut data = second;
/// let message = stream.parse(&mut data)?.expect("a whole message");
/// assert_eq!(message.member(), Some("Ping"));
/// # Ok::<_, anyhow::Error>(())
/// ```
pub struct StreamBuf {
    buf: Vec<u8>,
    corrupt: bool,
}

impl StreamBuf {
    /// Construct a new empty stream buffer.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            corrupt: false,
        }
    }

    /// Number of bytes buffered towards the next message.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract one message, consuming bytes from the front of `data`.
    ///
    /// Returns `Ok(None)` when the next message is not yet fully available;
    /// all remaining input has then been buffered and `data` is empty.
    pub fn parse(&mut self, data: &mut &[u8]) -> Result<Option<Message>> {
        if self.corrupt {
            return Err(Error::new(ErrorKind::CorruptStream));
        }

        match self.parse_inner(data) {
            Ok(message) => Ok(message),
            Err(error) => {
                self.corrupt = true;
                Err(error)
            }
        }
    }

    fn parse_inner(&mut self, data: &mut &[u8]) -> Result<Option<Message>> {
        if !self.buf.is_empty() {
            // Finish the partially buffered message first.
            if !self.require(data, EXTENDED_HEADER_SIZE) {
                return Ok(None);
            }

            let Some(size) = next_message_size(&self.buf)? else {
                return Ok(None);
            };

            if !self.require(data, size) {
                return Ok(None);
            }

            let message = parse(&self.buf[..size])?;
            self.buf.clear();
            trace!("framed message of {size} bytes from stream buffer");
            return Ok(Some(message));
        }

        match next_message_size(data)? {
            Some(size) if size <= data.len() => {
                let message = parse(&data[..size])?;
                *data = &data[size..];
                trace!("framed message of {size} bytes");
                Ok(Some(message))
            }
            _ => {
                self.buf.extend_from_slice(data);
                *data = &data[data.len()..];
                Ok(None)
            }
        }
    }

    /// Move bytes from `data` into the internal buffer until it holds
    /// `needed` bytes. Returns whether enough data was available.
    fn require(&mut self, data: &mut &[u8], needed: usize) -> bool {
        if self.buf.len() < needed {
            let take = (needed - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            *data = &data[take..];
        }

        self.buf.len() >= needed
    }
}

impl Default for StreamBuf {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
