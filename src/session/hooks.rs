//! Callbacks into the code that owns a session

use super::Session;
use crate::result::ExpectError;

/// Collaborator notified about connection lifecycle events.
///
/// Every method runs synchronously on the connection task, so it should
/// return quickly. Calling [`Session::write`] or [`Session::shutdown`] from a
/// hook is fine; awaiting an expectation is not (spawn a task instead).
///
/// # Examples
///
/// ```no_run
/// use shellmod::{ConnectionHooks, Session};
///
/// struct Banner;
///
/// impl ConnectionHooks for Banner {
///     fn connection_established(&self, session: &Session) {
///         println!("connected to {}", session.url());
///     }
///
///     fn connection_closed(&self, session: &Session) {
///         if session.retries() <= 1 {
///             println!("connection lost, retrying");
///         }
///     }
/// }
/// ```
pub trait ConnectionHooks: Send + Sync {
    /// The link is up and the retry counter has been reset.
    fn connection_established(&self, _session: &Session) {}

    /// An attempt failed or a live link dropped.
    fn connection_closed(&self, _session: &Session) {}

    /// An inbound frame could not be decoded and was discarded.
    fn protocol_error(&self, _session: &Session, _error: &ExpectError) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ConnectionHooks for NoHooks {}
