//! Session builder for configuration

use crate::envelope::{Schema, Serializer, DEFAULT_MESSAGE_TYPE};
use crate::logging::{LogEntry, LogPool, LogSubscriber, DEFAULT_LOG_CAPACITY, DEFAULT_LOG_SOURCE};
use crate::result::ExpectError;
use crate::session::{Config, ConnectionHooks, NoHooks, Session};
use crate::transport::{Connector, WsConnector};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for expect operations (in seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default time allowed for one connection attempt (in milliseconds)
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default pause between failed connection attempts (in milliseconds)
const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Default URL scheme
const DEFAULT_SCHEME: &str = "wss";

/// Default URL path of the shell endpoint
const DEFAULT_PATH: &str = "/shell";

/// Default limit on unmatched buffered bytes
pub(crate) const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Builder for configuring sessions.
///
/// # Defaults
///
/// - Address: `127.0.0.1`, URL `wss://127.0.0.1/shell`
/// - Connect timeout: 5 seconds
/// - Reconnect delay: 3 seconds, unlimited retries
/// - Expect timeout: 30 seconds
/// - Buffer limit: 1 MiB of unmatched bytes
/// - Log pool: 200 entries, source `default`, mirrored to `tracing`
/// - Envelope type: `proto.Data`, no schema loaded
///
/// # Examples
///
/// ```no_run
/// use shellmod::Session;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .address("10.0.0.7:8443")
///     .reconnect_delay(Duration::from_secs(1))
///     .max_retries(10)
///     .expect_timeout(Duration::from_secs(5))
///     .log_source("terminal")
///     .schema_definition("package proto; message Data { bytes data = 1; }")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionBuilder {
    address: String,
    scheme: String,
    path: String,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    max_retries: Option<u32>,
    expect_timeout: Option<Duration>,
    max_buffer_size: usize,
    log_capacity: usize,
    log_source: String,
    log_offset: u64,
    log_subscriber: Option<LogSubscriber>,
    mirror_console: bool,
    message_type: String,
    schema: Option<Schema>,
    schema_definition: Option<String>,
    hooks: Arc<dyn ConnectionHooks>,
    connector: Arc<dyn Connector>,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("address", &self.address)
            .field("scheme", &self.scheme)
            .field("path", &self.path)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_retries", &self.max_retries)
            .field("expect_timeout", &self.expect_timeout)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("log_capacity", &self.log_capacity)
            .field("log_source", &self.log_source)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Create a new session builder with default configuration.
    ///
    /// See the [`SessionBuilder`] documentation for default values.
    pub fn new() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
            path: DEFAULT_PATH.to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_retries: None,
            expect_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            log_capacity: DEFAULT_LOG_CAPACITY,
            log_source: DEFAULT_LOG_SOURCE.to_string(),
            log_offset: 0,
            log_subscriber: None,
            mirror_console: true,
            message_type: DEFAULT_MESSAGE_TYPE.to_string(),
            schema: None,
            schema_definition: None,
            hooks: Arc::new(NoHooks),
            connector: Arc::new(WsConnector),
        }
    }

    /// Host (and optional port) of the shell server.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// URL scheme, `wss` by default. Use `ws` for plain-text connections.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// URL path of the shell endpoint, `/shell` by default.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Time allowed for one connection attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Pause after a failed connection attempt.
    ///
    /// A connection that drops after being established is retried
    /// immediately.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Retry at most `retries` times after the first failed attempt
    /// (default: unlimited).
    ///
    /// `max_retries(2)` allows three attempts in a row. Once they all fail
    /// the session gives up: pending and later expectations fail with
    /// [`TransportError::Closed`](crate::TransportError::Closed) until the
    /// session is started again.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the timeout for expect operations.
    ///
    /// An expectation that is not met in time fails with
    /// [`ExpectError::Timeout`].
    pub fn expect_timeout(mut self, timeout: Duration) -> Self {
        self.expect_timeout = Some(timeout);
        self
    }

    /// Disable timeout (wait indefinitely).
    pub fn no_timeout(mut self) -> Self {
        self.expect_timeout = None;
        self
    }

    /// Limit on received bytes held without a match.
    ///
    /// Past the limit the buffer is emptied and the pending expectation
    /// fails with [`ExpectError::BufferFull`].
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Maximum number of log entries kept (default: 200).
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Tag stamped on every log entry.
    pub fn log_source(mut self, source: impl Into<String>) -> Self {
        self.log_source = source.into();
        self
    }

    /// Offset added to every log timestamp, in milliseconds.
    pub fn log_start_offset(mut self, millis: u64) -> Self {
        self.log_offset = millis;
        self
    }

    /// Callback invoked for every log entry as it is recorded.
    pub fn log_subscriber(mut self, subscriber: impl Fn(&LogEntry) + Send + Sync + 'static) -> Self {
        self.log_subscriber = Some(Arc::new(subscriber));
        self
    }

    /// Mirror log entries to `tracing` (default: on).
    pub fn mirror_console(mut self, mirror: bool) -> Self {
        self.mirror_console = mirror;
        self
    }

    /// Fully qualified envelope message type (default: `proto.Data`).
    pub fn schema_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    /// Protobuf definition to resolve the envelope type from at build time.
    pub fn schema_definition(mut self, definition: impl Into<String>) -> Self {
        self.schema_definition = Some(definition.into());
        self
    }

    /// An already resolved envelope schema.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Lifecycle callbacks.
    pub fn hooks(mut self, hooks: impl ConnectionHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Transport used to open links (default: WebSocket).
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Build the session. Nothing connects until [`Session::start`].
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Schema`] if a schema definition was given and
    /// does not declare the envelope type.
    pub fn build(self) -> Result<Session, ExpectError> {
        let schema = match (self.schema, self.schema_definition) {
            (Some(schema), _) => Some(schema),
            (None, Some(definition)) => Some(Schema::parse(&definition, &self.message_type)?),
            (None, None) => None,
        };
        let serializer = schema.map(Serializer::with_schema).unwrap_or_default();

        let mut logs = LogPool::new(self.log_capacity, self.log_source);
        logs.set_start_offset(self.log_offset);
        logs.set_mirror(self.mirror_console);
        logs.set_subscriber(self.log_subscriber);

        let config = Config {
            url: format!("{}://{}{}", self.scheme, self.address, self.path),
            connect_timeout: self.connect_timeout,
            reconnect_delay: self.reconnect_delay,
            max_retries: self.max_retries,
            expect_timeout: self.expect_timeout,
            max_buffer_size: self.max_buffer_size,
            message_type: self.message_type,
        };

        Ok(Session::from_parts(
            config,
            self.connector,
            self.hooks,
            serializer,
            logs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Status;

    const PROTO: &str = "package proto; message Data { bytes data = 1; }";

    #[test]
    fn test_default_url() {
        let session = SessionBuilder::new().build().unwrap();
        assert_eq!(session.url(), "wss://127.0.0.1/shell");
        assert_eq!(session.status(), Status::Disconnected);
        assert_eq!(session.retries(), 0);
        assert!(!session.schema_ready());
    }

    #[test]
    fn test_custom_url() {
        let session = SessionBuilder::new()
            .scheme("ws")
            .address("shell.local:9000")
            .path("/term")
            .build()
            .unwrap();
        assert_eq!(session.url(), "ws://shell.local:9000/term");
    }

    #[test]
    fn test_schema_definition() {
        let session = SessionBuilder::new()
            .schema_definition(PROTO)
            .build()
            .unwrap();
        assert!(session.schema_ready());
    }

    #[test]
    fn test_schema_definition_wrong_type() {
        let result = SessionBuilder::new()
            .schema_type("proto.Frame")
            .schema_definition(PROTO)
            .build();
        assert!(matches!(
            result,
            Err(ExpectError::Schema(crate::result::SchemaError::TypeNotFound(_)))
        ));
    }

    #[test]
    fn test_log_settings() {
        let session = SessionBuilder::new()
            .log_capacity(2)
            .log_source("terminal")
            .log_start_offset(1000)
            .mirror_console(false)
            .build()
            .unwrap();

        for i in 0..3 {
            session.log(crate::logging::Level::Info, format!("line {}", i));
        }
        let logs = session.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "line 1");
        assert_eq!(logs[0].source, "terminal");
        assert!(logs[0].timestamp >= 1000);
    }

    #[tokio::test]
    async fn test_max_buffer_size() {
        let schema = Schema::new("proto.Data", 1);
        let session = SessionBuilder::new()
            .schema(schema.clone())
            .max_buffer_size(8)
            .mirror_console(false)
            .build()
            .unwrap();

        let mut read = tokio_test::task::spawn(session.read());
        tokio_test::assert_pending!(read.poll());

        let wire = Serializer::with_schema(schema).wrap(b"0123456789").unwrap();
        session.dispatch(&wire);
        assert!(matches!(
            tokio_test::assert_ready!(read.poll()),
            Err(ExpectError::BufferFull { limit: 8 })
        ));
        assert_eq!(session.buffered(), 0);
        assert!(session
            .logs()
            .iter()
            .any(|e| e.level == crate::logging::Level::Error && e.message.contains("limit")));
    }
}
