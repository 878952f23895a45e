//! Error types for shellmod

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during expect operations.
///
/// Protocol mismatches surface as [`ExpectError::Rejected`]; callers branch on
/// resolve versus reject and the rejection carries no payload. Transport
/// failures never show up here while the reconnect loop is running, they are
/// observed through [`ConnectionHooks`](crate::ConnectionHooks) instead.
///
/// # Examples
///
/// ```no_run
/// use shellmod::{ExpectError, Session};
///
/// # async fn example(session: Session) -> Result<(), Box<dyn std::error::Error>> {
/// match session.expect_prompt().await {
///     Ok(()) => println!("shell is ready"),
///     Err(ExpectError::Rejected) => println!("something other than a prompt arrived"),
///     Err(ExpectError::Timeout { duration }) => println!("no prompt after {:?}", duration),
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum ExpectError {
    /// The expected pattern did not arrive in time.
    ///
    /// The pending request is cleared when this is returned, so the next
    /// `expect*` call can be issued right away.
    #[error("Timeout waiting for pattern (after {duration:?})")]
    Timeout {
        /// Duration that was waited before timeout
        duration: Duration,
    },

    /// The discriminating byte did not match what was expected.
    ///
    /// The mismatched byte stays in the buffer.
    #[error("Unexpected control byte")]
    Rejected,

    /// Another expectation is already pending.
    #[error("An expectation is already pending")]
    Busy,

    /// Inbound bytes piled up past the buffer limit without a match.
    ///
    /// The buffered bytes are discarded along with the pending request.
    #[error("Buffer full ({limit} bytes)")]
    BufferFull {
        /// Configured buffer limit
        limit: usize,
    },

    /// Invalid UTF-8 or a malformed envelope.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The envelope schema is missing or invalid.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// `write` was called without a live connection.
    #[error("Not connected")]
    NotConnected,

    /// The session was shut down while the request was pending.
    #[error("Session has been shut down")]
    Shutdown,

    /// Transport failure outside the reconnect loop.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors produced while decoding inbound data.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload text was not valid UTF-8.
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The envelope is not a valid encoding of the schema.
    #[error("Malformed envelope: {0}")]
    Envelope(#[from] prost::DecodeError),

    /// A length-delimited field runs past the end of the frame.
    #[error("Truncated envelope: field needs {needed} bytes, {available} available")]
    Truncated {
        /// Declared field length
        needed: usize,
        /// Bytes left in the frame
        available: usize,
    },
}

/// Errors related to loading the envelope schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// `wrap` or `unwrap` was called before a schema was loaded.
    #[error("Schema has not been loaded")]
    NotLoaded,

    /// The definition could not be parsed.
    #[error("Schema parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// The requested message type is not declared.
    #[error("Message type '{0}' not found")]
    TypeNotFound(String),

    /// The message type has no field with the expected name.
    #[error("Message type '{message}' has no field '{field}'")]
    FieldNotFound {
        /// Fully qualified message name
        message: String,
        /// Missing field name
        field: String,
    },

    /// The field exists but is not `bytes`.
    #[error("Field '{field}' has type '{found}', expected 'bytes'")]
    FieldType {
        /// Field name
        field: String,
        /// Declared type
        found: String,
    },

    /// Reading the definition failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the underlying duplex channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection attempt failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The connection attempt did not complete in time.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// The link is gone.
    #[error("Connection closed")]
    Closed,

    /// WebSocket protocol or I/O failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
