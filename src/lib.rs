//! shellmod: client side of a framed remote shell protocol
//!
//! shellmod talks to a shell server over a WebSocket. Text goes out
//! terminated by an end-of-input byte, wrapped in a one-field protobuf
//! envelope. What comes back is a byte stream marked up with three control
//! bytes (PROMPT, EOP, EOI), and the caller waits for those markers with
//! expect-style operations.
//!
//! # Features
//!
//! - **Async/await**: Built on tokio; every expectation is a future
//! - **Single pending expectation**: A second concurrent wait fails fast
//! - **Stream buffering**: Bytes that arrive early are kept for the next wait
//! - **Reconnect**: Failed attempts back off, dropped links retry at once
//! - **Session log**: Bounded in-memory log, mirrored to `tracing`
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use shellmod::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::builder()
//!         .address("10.0.0.7:8443")
//!         .build()?;
//!
//!     // Connecting is deferred until the envelope type is known
//!     session.start();
//!     session.load_schema_file("messages.proto").await?;
//!     session.wait_connected().await?;
//!
//!     session.expect_prompt().await?;
//!     session.write("uname -a")?;
//!     println!("{}", session.read().await?);
//!     println!("exit status {}", session.expect_eop().await?);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Control Bytes
//!
//! | Byte | Name | Meaning |
//! |------|------|---------|
//! | `0x05` | PROMPT | The shell is ready for input |
//! | `0x04` | EOP | End of program; the next byte is its status code |
//! | `0x03` | EOI | End of input; terminates a string in either direction |
//!
//! # Carrying Context Through a Wait
//!
//! ```rust,no_run
//! use shellmod::{ChainExt, Session};
//!
//! # async fn example(session: Session) -> Result<(), Box<dyn std::error::Error>> {
//! session.write("make")?;
//! let done = session.expect_eop().chain("make").await?;
//! println!("{} exited with {}", done.chained, done.value);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod buffer;
mod envelope;
mod logging;
mod pattern;
mod result;
mod session;
mod transport;

// Public API exports
pub use buffer::{concat, decode_text, encode_text, find_byte, AccumBuffer};
pub use envelope::{Schema, Serializer, DATA_FIELD, DEFAULT_MESSAGE_TYPE};
pub use logging::{Level, LogEntry, LogPool, LogSubscriber};
pub use pattern::controls;
pub use pattern::{Expect, MatchOutcome, Rejection};
pub use result::{
    ChainExt, Chained, DecodeError, ExpectError, Matched, SchemaError, TransportError,
};
pub use session::{ConnectionHooks, NoHooks, Session, SessionBuilder};
pub use transport::{Connector, Link, Status, WsConnector, WsLink};
