//! In-memory server side for session tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use shellmod::{
    ConnectionHooks, Connector, ExpectError, Link, Schema, Serializer, Session, SessionBuilder,
    TransportError,
};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PROTO: &str = r#"
syntax = "proto3";
package proto;

message Data {
    bytes data = 1;
}
"#;

pub fn schema() -> Schema {
    Schema::new("proto.Data", 1)
}

/// Connector that fails a configurable number of times, then hands each new
/// link's far end to the test.
#[derive(Clone)]
pub struct MockConnector {
    attempts: Arc<AtomicUsize>,
    fail_first: usize,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnector {
    pub fn new(fail_first: usize) -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Self {
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first,
            accepted,
        };
        (connector, rx)
    }

    pub fn refusing() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::new(usize::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Link>, TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let server = ServerEnd {
            tx: to_client,
            rx: from_client,
            serializer: Serializer::with_schema(schema()),
        };
        self.accepted
            .send(server)
            .map_err(|_| TransportError::Connect("test finished".to_string()))?;

        Ok(Box::new(MockLink {
            rx: from_server,
            tx: to_server,
        }))
    }
}

struct MockLink {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl Link for MockLink {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// The server's half of one link. Dropping it drops the connection.
pub struct ServerEnd {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    serializer: Serializer,
}

impl ServerEnd {
    /// Send a payload inside an envelope.
    pub fn send(&self, payload: &[u8]) {
        let wire = self.serializer.wrap(payload).unwrap();
        self.send_wire(wire);
    }

    /// Send bytes as they are, without an envelope.
    pub fn send_wire(&self, wire: Vec<u8>) {
        self.tx.send(wire).unwrap();
    }

    /// Next payload from the client.
    pub async fn recv(&mut self) -> Bytes {
        let wire = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("no frame from client")
            .expect("client closed the link");
        self.serializer.unwrap(&wire).unwrap()
    }

    /// Resolves once the client has closed its side.
    pub async fn closed(&mut self) {
        while self.rx.recv().await.is_some() {}
    }
}

/// Hooks that record every callback together with the retry counter.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ConnectionHooks for Recorder {
    fn connection_established(&self, session: &Session) {
        self.push(format!("established:{}", session.retries()));
    }

    fn connection_closed(&self, session: &Session) {
        self.push(format!("closed:{}", session.retries()));
    }

    fn protocol_error(&self, _session: &Session, error: &ExpectError) {
        self.push(format!("protocol_error:{}", error));
    }
}

pub fn builder(connector: MockConnector) -> SessionBuilder {
    Session::builder()
        .scheme("ws")
        .address("test.invalid")
        .connector(connector)
        .mirror_console(false)
        .expect_timeout(Duration::from_secs(5))
}

/// A started session with its first link already accepted.
pub async fn connected() -> (Session, ServerEnd, MockConnector) {
    let (connector, mut accepted) = MockConnector::new(0);
    let session = builder(connector.clone()).schema(schema()).build().unwrap();
    session.start();
    let server = accepted.recv().await.unwrap();
    session.wait_connected().await.unwrap();
    (session, server, connector)
}

/// Poll `condition` until it holds, yielding to the runtime in between.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition never held");
}

/// Run `future` to completion with a generous deadline.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
