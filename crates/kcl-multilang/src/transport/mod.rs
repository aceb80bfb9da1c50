//! Line transport over the shared input and output streams.
//!
//! The orchestrator talks to the processor over exactly one input stream and
//! one output stream. Action requests and checkpoint acknowledgements arrive
//! interleaved on the same input with no correlation identifier, so the only
//! thing separating them is *when* a line is read. [`LineTransport`] owns the
//! single buffered reader for that stream. Both the dispatch loop and the
//! checkpointer read through it, which means no bytes are ever stranded in a
//! second buffer, and a checkpointer can only exist while it holds the
//! transport mutably.
//!
//! This positional multiplexing is a compatibility constraint of the
//! orchestrator's peer implementation and must be preserved as-is.

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::checkpoint::StreamCheckpointer;
use crate::error::MultilangError;
use crate::protocol::{ActionKind, Envelope, OutboundMessage};

/// Tracing target for transport operations.
pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Reads one JSON line at a time and writes newline-terminated messages.
///
/// This is also the low-level interface for callers that drive the protocol
/// themselves instead of using the [`Dispatcher`](crate::dispatch::Dispatcher).
///
/// # Example
///
/// ```
/// use std::io::Cursor;
///
/// use kcl_multilang::protocol::ActionKind;
/// use kcl_multilang::transport::LineTransport;
///
/// let input = Cursor::new(b"{\"action\":\"leaseLost\"}\n".to_vec());
/// let mut transport = LineTransport::new(input, Vec::new());
///
/// let envelope = transport.read_envelope().expect("one line available");
/// assert_eq!(envelope.kind().expect("known action"), ActionKind::LeaseLost);
/// transport
///     .write_action_complete(ActionKind::LeaseLost)
///     .expect("write status");
///
/// let (_, output) = transport.into_inner();
/// assert_eq!(output, b"{\"action\":\"status\",\"responseFor\":\"leaseLost\"}\n");
/// ```
#[derive(Debug)]
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    line: Vec<u8>,
}

impl<R, W> LineTransport<R, W> {
    /// Creates a transport over the given streams.
    #[must_use]
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: Vec::new(),
        }
    }

    /// Consumes the transport and returns the underlying streams.
    #[must_use]
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: BufRead, W: Write> LineTransport<R, W> {
    /// Reads the next line, returning `None` once the input is closed.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::Transport`] if reading fails and
    /// [`MultilangError::Parse`] if the line is not UTF-8 or not a valid
    /// envelope.
    pub fn try_read_envelope(&mut self) -> Result<Option<Envelope>, MultilangError> {
        self.line.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.line)?;
        if bytes_read == 0 {
            debug!(target: TRANSPORT_TARGET, "input stream closed");
            return Ok(None);
        }

        let text = std::str::from_utf8(&self.line)
            .map_err(|error| MultilangError::parse(format!("line is not valid UTF-8: {error}")))?;
        debug!(target: TRANSPORT_TARGET, line = text.trim_end(), "read line");
        Envelope::decode(text).map(Some)
    }

    /// Reads the next line, treating a closed input as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::Transport`] if reading fails or the input is
    /// closed, and [`MultilangError::Parse`] if the line is not a valid
    /// envelope.
    pub fn read_envelope(&mut self) -> Result<Envelope, MultilangError> {
        self.try_read_envelope()?.ok_or_else(|| {
            MultilangError::from(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input stream closed",
            ))
        })
    }

    /// Writes one message as a newline-terminated line and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::Encode`] if serialisation fails or
    /// [`MultilangError::Transport`] if writing fails.
    pub fn write_message(&mut self, message: &OutboundMessage) -> Result<(), MultilangError> {
        let line = message.encode()?;
        debug!(target: TRANSPORT_TARGET, line = line.as_str(), "write line");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Acknowledges that the given action has been handled.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgement cannot be written.
    pub fn write_action_complete(&mut self, kind: ActionKind) -> Result<(), MultilangError> {
        self.write_message(&OutboundMessage::status(kind))
    }

    /// Borrows the transport as a checkpointer.
    ///
    /// The transport cannot be read by anything else until the returned
    /// checkpointer is dropped.
    #[must_use]
    pub const fn checkpointer(&mut self) -> StreamCheckpointer<'_, R, W> {
        StreamCheckpointer::new(self)
    }
}
