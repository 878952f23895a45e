//! Session management for a remote shell connection

mod builder;
mod engine;
mod hooks;

pub use builder::SessionBuilder;
pub use hooks::{ConnectionHooks, NoHooks};

use crate::buffer::{concat, encode_text};
use crate::envelope::{Schema, Serializer};
use crate::logging::{Level, LogEntry, LogPool};
use crate::pattern::controls::EOI;
use crate::pattern::Expect;
use crate::result::{ExpectError, Matched, TransportError};
use crate::transport::{manager, Connector, Status};
use bytes::Bytes;
use engine::{Engine, Fed};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Resolved connection and timing settings.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub url: String,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_retries: Option<u32>,
    pub expect_timeout: Option<Duration>,
    pub max_buffer_size: usize,
    pub message_type: String,
}

/// Why a session stopped for good, until the next `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Halt {
    /// `shutdown` was called.
    Shutdown,
    /// The retry cap ran out.
    GaveUp,
}

impl Halt {
    fn error(self) -> ExpectError {
        match self {
            Halt::Shutdown => ExpectError::Shutdown,
            Halt::GaveUp => ExpectError::Transport(TransportError::Closed),
        }
    }
}

/// Connection status together with the terminal state, published as one
/// value so waiters see both change at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct State {
    status: Status,
    halt: Option<Halt>,
}

pub(crate) struct Shared {
    pub config: Config,
    pub connector: Arc<dyn Connector>,
    pub hooks: Arc<dyn ConnectionHooks>,
    engine: Mutex<Engine>,
    serializer: Mutex<Serializer>,
    logs: Mutex<LogPool>,
    state: watch::Sender<State>,
    retries: AtomicU32,
    must_start: AtomicBool,
    control: Mutex<Option<Control>>,
}

/// Channels to one running connection task.
struct Control {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a remote shell session.
///
/// A `Session` frames text into envelopes, keeps a reconnecting connection
/// to `<scheme>://<address><path>` alive, and lets one caller at a time wait
/// for something from the shell. Handles are cheap to clone and all refer to
/// the same session.
///
/// # Examples
///
/// ```no_run
/// use shellmod::Session;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .address("127.0.0.1")
///     .build()?;
/// session.load_schema_file("messages.proto").await?;
/// session.start();
/// session.wait_connected().await?;
///
/// session.expect_prompt().await?;
/// session.write("ls")?;
/// let listing = session.read().await?;
/// let code = session.expect_eop().await?;
/// println!("{} (exit {})", listing, code);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.shared.config.url)
            .field("status", &self.status())
            .field("retries", &self.retries())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn from_parts(
        config: Config,
        connector: Arc<dyn Connector>,
        hooks: Arc<dyn ConnectionHooks>,
        serializer: Serializer,
        logs: LogPool,
    ) -> Self {
        let (state, _) = watch::channel(State {
            status: Status::Disconnected,
            halt: None,
        });
        let engine = Engine::new(config.max_buffer_size);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                hooks,
                engine: Mutex::new(engine),
                serializer: Mutex::new(serializer),
                logs: Mutex::new(logs),
                state,
                retries: AtomicU32::new(0),
                must_start: AtomicBool::new(false),
                control: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Connect and keep reconnecting until [`shutdown`](Self::shutdown).
    ///
    /// If the envelope schema is not loaded yet, the start is deferred and
    /// happens as soon as one of the `load_schema*` methods succeeds. Calling
    /// `start` on a running session does nothing. Starting again after
    /// [`shutdown`](Self::shutdown) or after the retry cap ran out clears
    /// that state.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if !lock(&self.shared.serializer).is_ready() {
            self.shared.must_start.store(true, Ordering::SeqCst);
            self.log(Level::Debug, "Schema not loaded yet, start deferred");
            return;
        }

        let mut control = lock(&self.shared.control);
        let halted = self.shared.state.borrow().halt.is_some();
        if !halted && control.as_ref().is_some_and(|c| !c.task.is_finished()) {
            return;
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        self.shared.retries.store(0, Ordering::SeqCst);
        self.shared.state.send_modify(|state| state.halt = None);

        let task = tokio::spawn(manager::run(
            Arc::downgrade(&self.shared),
            outbound_rx,
            stop_rx,
        ));
        *control = Some(Control {
            outbound,
            stop,
            task,
        });
    }

    /// Install an envelope schema and resume a deferred start.
    pub fn load_schema(&self, schema: Schema) {
        self.log(
            Level::Debug,
            format!("Schema loaded: {} (data = {})", schema.message(), schema.data_tag()),
        );
        lock(&self.shared.serializer).set_schema(schema);

        if self.shared.must_start.swap(false, Ordering::SeqCst) {
            self.start();
        }
    }

    /// Read a protobuf definition file, install the envelope type from it,
    /// and resume a deferred start.
    pub async fn load_schema_file(&self, path: impl AsRef<Path>) -> Result<(), ExpectError> {
        let path = path.as_ref();
        match Serializer::load_file(path, &self.shared.config.message_type).await {
            Ok(schema) => {
                self.load_schema(schema);
                Ok(())
            }
            Err(e) => {
                self.log(
                    Level::Error,
                    format!("Failed to load schema from '{}': {}", path.display(), e),
                );
                Err(e.into())
            }
        }
    }

    /// Stop the connection task and fail any pending expectation.
    ///
    /// A sleeping reconnect timer is cancelled as well. Until the session is
    /// started again, [`wait_connected`](Self::wait_connected) and every
    /// `expect*` call fail with [`ExpectError::Shutdown`].
    pub fn shutdown(&self) {
        self.shared.must_start.store(false, Ordering::SeqCst);
        if let Some(control) = lock(&self.shared.control).take() {
            control.stop.send_replace(true);
        }
        self.halt(Halt::Shutdown);
        self.log(Level::Info, "Session shut down");
    }

    /// Send `text` to the shell, terminated by EOI.
    pub fn write(&self, text: &str) -> Result<(), ExpectError> {
        self.send_raw(&concat(&encode_text(text), &[EOI]))
    }

    /// Send a payload as-is, without the EOI terminator.
    pub fn send_raw(&self, payload: &[u8]) -> Result<(), ExpectError> {
        if self.status() != Status::Connected {
            return Err(ExpectError::NotConnected);
        }

        let wire = lock(&self.shared.serializer).wrap(payload)?;
        lock(&self.shared.control)
            .as_ref()
            .ok_or(ExpectError::NotConnected)?
            .outbound
            .send(wire)
            .map_err(|_| ExpectError::NotConnected)
    }

    /// Wait for the next payload, or whatever is already buffered.
    pub async fn expect_raw(&self) -> Result<Bytes, ExpectError> {
        match self.expect(Expect::Raw).await? {
            Matched::Raw(bytes) => Ok(bytes),
            other => unreachable!("raw expectation resolved with {:?}", other),
        }
    }

    /// Wait for PROMPT at the head of the stream.
    ///
    /// Rejects with [`ExpectError::Rejected`] if any other byte comes first;
    /// that byte stays buffered.
    pub async fn expect_prompt(&self) -> Result<(), ExpectError> {
        match self.expect(Expect::Prompt).await? {
            Matched::Prompt => Ok(()),
            other => unreachable!("prompt expectation resolved with {:?}", other),
        }
    }

    /// Wait for EOP and return the status code that follows it.
    pub async fn expect_eop(&self) -> Result<u8, ExpectError> {
        match self.expect(Expect::Eop).await? {
            Matched::Eop(code) => Ok(code),
            other => unreachable!("eop expectation resolved with {:?}", other),
        }
    }

    /// Wait for an EOI-terminated string.
    pub async fn read(&self) -> Result<String, ExpectError> {
        match self.expect(Expect::Read).await? {
            Matched::Read(text) => Ok(text),
            other => unreachable!("read expectation resolved with {:?}", other),
        }
    }

    /// Wait using the session's default timeout.
    pub async fn expect(&self, kind: Expect) -> Result<Matched, ExpectError> {
        self.expect_with(kind, self.shared.config.expect_timeout)
            .await
    }

    /// Wait for `kind`, giving up after `timeout` (`None` waits forever).
    ///
    /// Fails with [`ExpectError::Busy`] if another expectation is pending.
    /// Buffered bytes are matched before this returns to the executor, so an
    /// expectation that is already satisfied resolves immediately. A session
    /// that was shut down or gave up reconnecting fails right away.
    pub async fn expect_with(
        &self,
        kind: Expect,
        timeout: Option<Duration>,
    ) -> Result<Matched, ExpectError> {
        let rx = {
            // Checked under the engine lock so a concurrent halt cannot slip
            // in between the check and the install
            let mut engine = lock(&self.shared.engine);
            if let Some(halt) = self.shared.state.borrow().halt {
                return Err(halt.error());
            }
            engine.install(kind)?
        };

        let received = match timeout {
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(received) => received,
                Err(_) => {
                    lock(&self.shared.engine).clear_abandoned();
                    self.log(
                        Level::Debug,
                        format!("Timed out waiting for {} after {:?}", kind.name(), duration),
                    );
                    return Err(ExpectError::Timeout { duration });
                }
            },
            None => rx.await,
        };

        received.unwrap_or(Err(ExpectError::Shutdown))
    }

    /// Current connection status
    pub fn status(&self) -> Status {
        self.shared.state.borrow().status
    }

    /// Wait until the connection is up.
    ///
    /// Fails with [`ExpectError::Shutdown`] once the session is shut down,
    /// and with [`TransportError::Closed`] once the retry cap runs out.
    pub async fn wait_connected(&self) -> Result<(), ExpectError> {
        let mut changes = self.shared.state.subscribe();
        let halt = changes
            .wait_for(|state| state.status == Status::Connected || state.halt.is_some())
            .await
            .map_err(|_| ExpectError::Shutdown)?
            .halt;

        match halt {
            Some(halt) => Err(halt.error()),
            None => Ok(()),
        }
    }

    /// Failed attempts since the last successful connection
    pub fn retries(&self) -> u32 {
        self.shared.retries.load(Ordering::SeqCst)
    }

    /// Full URL connected to
    pub fn url(&self) -> &str {
        &self.shared.config.url
    }

    /// Kind of the pending expectation, if any
    pub fn pending(&self) -> Option<Expect> {
        lock(&self.shared.engine).pending()
    }

    /// Bytes received but not yet consumed by an expectation
    pub fn buffered(&self) -> usize {
        lock(&self.shared.engine).buffered()
    }

    /// Whether the envelope schema has been loaded
    pub fn schema_ready(&self) -> bool {
        lock(&self.shared.serializer).is_ready()
    }

    /// Snapshot of the session log, oldest first
    pub fn logs(&self) -> Vec<LogEntry> {
        lock(&self.shared.logs).entries().cloned().collect()
    }

    /// Append to the session log
    ///
    /// The log subscriber runs after the pool is unlocked, so it may call
    /// back into the session.
    pub fn log(&self, level: Level, message: impl Into<String>) {
        let (entry, subscriber) = lock(&self.shared.logs).record(level, message);
        if let Some(subscriber) = subscriber {
            subscriber(&entry);
        }
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.shared.state.send_modify(|state| state.status = status);
    }

    /// Enter a terminal state and fail the pending expectation with it.
    pub(crate) fn halt(&self, halt: Halt) {
        let mut engine = lock(&self.shared.engine);
        self.shared.state.send_modify(|state| {
            state.status = Status::Disconnected;
            state.halt = Some(halt);
        });
        engine.fail(halt.error());
    }

    pub(crate) fn reset_retries(&self) {
        self.shared.retries.store(0, Ordering::SeqCst);
    }

    pub(crate) fn bump_retries(&self) -> u32 {
        self.shared.retries.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Unwrap one inbound frame and hand its payload to the engine.
    pub(crate) fn dispatch(&self, wire: &[u8]) {
        let unwrapped = lock(&self.shared.serializer).unwrap(wire);
        let payload = match unwrapped {
            Ok(payload) => payload,
            Err(e) => {
                self.log(Level::Error, format!("Discarded malformed frame: {}", e));
                self.shared.hooks.protocol_error(self, &e);
                return;
            }
        };

        let fed = lock(&self.shared.engine).feed(&payload);
        match fed {
            Fed::Unsolicited => self.log(
                Level::Warning,
                format!(
                    "Received {} bytes with no pending expectation, buffered",
                    payload.len()
                ),
            ),
            Fed::Rejected => self.log(Level::Debug, "Expectation rejected"),
            Fed::Overflow(discarded) => self.log(
                Level::Error,
                format!(
                    "Buffer limit of {} bytes exceeded, discarded {} bytes",
                    self.shared.config.max_buffer_size, discarded
                ),
            ),
            Fed::Pending | Fed::Resolved => {}
        }
    }
}
