//! Expectation kinds and the control-byte vocabulary

pub mod controls;
mod matcher;

pub use matcher::{MatchOutcome, Rejection};

/// What the caller is waiting for from the shell.
///
/// Only one expectation can be pending per session. Each kind decides on
/// every delivery whether it resolved, needs more bytes, or can no longer
/// match.
///
/// # Kinds
///
/// - **Raw**: the next delivered payload (or whatever is already buffered),
///   untouched
/// - **Prompt**: a PROMPT byte at the head of the buffer
/// - **Eop**: an EOP byte followed by a status code
/// - **Read**: UTF-8 text terminated by EOI
///
/// # Examples
///
/// ```
/// use shellmod::{AccumBuffer, Expect, MatchOutcome, Matched};
/// use shellmod::controls::EOI;
///
/// let mut buffer = AccumBuffer::new();
/// let outcome = Expect::Read.feed(&mut buffer, Some(&[b'a', b'b', EOI, b'c', b'd']));
///
/// assert!(matches!(outcome, MatchOutcome::Resolved(Matched::Read(ref s)) if s == "ab"));
/// assert_eq!(buffer.as_bytes(), b"cd");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Pass the next payload through without parsing.
    Raw,
    /// Wait for PROMPT.
    Prompt,
    /// Wait for EOP and its status code.
    Eop,
    /// Wait for an EOI-terminated string.
    Read,
}

impl Expect {
    /// Short lowercase name, used in log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Expect::Raw => "raw",
            Expect::Prompt => "prompt",
            Expect::Eop => "eop",
            Expect::Read => "read",
        }
    }
}
