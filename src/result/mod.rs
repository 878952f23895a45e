//! Result types for expect operations

mod error;

pub use error::{DecodeError, ExpectError, SchemaError, TransportError};

use bytes::Bytes;
use std::future::Future;

/// Value produced by a resolved expectation.
///
/// Each [`Expect`](crate::Expect) kind resolves with exactly one variant:
/// `Raw` with the delivered bytes, `Prompt` with nothing, `Eop` with the
/// status code that followed the EOP byte, `Read` with the decoded text
/// before EOI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matched {
    /// Bytes passed through untouched.
    Raw(Bytes),
    /// A PROMPT byte was consumed.
    Prompt,
    /// EOP and its status code were consumed.
    Eop(u8),
    /// Text up to (not including) EOI.
    Read(String),
}

/// A resolved value with the caller's chain value reattached.
///
/// # Examples
///
/// ```no_run
/// use shellmod::{ChainExt, Session};
///
/// # async fn example(session: Session) -> Result<(), Box<dyn std::error::Error>> {
/// let resumed = session.expect_eop().chain("ls").await?;
/// println!("{} exited with {}", resumed.chained, resumed.value);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chained<T, C> {
    /// The resolved value
    pub value: T,
    /// The value supplied to [`ChainExt::chain`]
    pub chained: C,
}

/// Threads an opaque value through one wait cycle.
///
/// The chain value is only handed back on resolution; a rejected or failed
/// expectation drops it.
pub trait ChainExt<T>: Future<Output = Result<T, ExpectError>> + Sized {
    /// Attach `chained` to the value this expectation resolves with.
    fn chain<C>(self, chained: C) -> impl Future<Output = Result<Chained<T, C>, ExpectError>> {
        async move { self.await.map(|value| Chained { value, chained }) }
    }
}

impl<T, F> ChainExt<T> for F where F: Future<Output = Result<T, ExpectError>> {}
