//! Duplex frame transport and the reconnecting connection manager
//!
//! The engine only needs a reliable, ordered channel of binary frames.
//! [`Connector`] opens one, [`Link`] carries frames over it. [`WsConnector`]
//! is the WebSocket implementation used by default; anything else (an
//! in-process pipe in tests, a raw TCP framing) plugs in the same way.

pub(crate) mod manager;
mod ws;

pub use ws::{WsConnector, WsLink};

use crate::result::TransportError;
use async_trait::async_trait;
use std::fmt;

/// Connection status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// The link is up.
    Connected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Disconnected => "disconnected",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Opens links to a URL.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new link.
    async fn connect(&self, url: &str) -> Result<Box<dyn Link>, TransportError>;
}

/// One open duplex channel of binary frames.
#[async_trait]
pub trait Link: Send {
    /// Send one frame.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Receive the next frame, `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the manager polls it inside `tokio::select!`.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>>;

    /// Close the link. Errors are ignored, the link is discarded afterwards.
    async fn close(&mut self);
}
