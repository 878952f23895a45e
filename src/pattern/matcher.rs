//! Matching logic for the four expectation kinds

use super::controls::{EOI, EOP, PROMPT};
use super::Expect;
use crate::buffer::{decode_text, AccumBuffer};
use crate::result::{DecodeError, Matched};
use bytes::Bytes;

/// Why an expectation was rejected.
#[derive(Debug)]
pub enum Rejection {
    /// The first buffered byte was not the expected control byte.
    Mismatch,
    /// A complete token was found but its text was not valid UTF-8.
    Decode(DecodeError),
}

/// Outcome of feeding the buffer to an expectation.
#[derive(Debug)]
pub enum MatchOutcome {
    /// More bytes are needed.
    Pending,
    /// The pattern was found and its bytes consumed.
    Resolved(Matched),
    /// The pattern cannot match.
    Rejected(Rejection),
}

impl Expect {
    /// Run this expectation against the buffer.
    ///
    /// `chunk` is a newly delivered payload; `None` is a drain pulse that
    /// re-examines what is already buffered. Raw expectations never buffer a
    /// delivered chunk. Every other kind appends it first.
    pub fn feed(&self, buffer: &mut AccumBuffer, chunk: Option<&[u8]>) -> MatchOutcome {
        if let Expect::Raw = self {
            return match chunk {
                Some(data) if !data.is_empty() => {
                    MatchOutcome::Resolved(Matched::Raw(Bytes::copy_from_slice(data)))
                }
                _ if !buffer.is_empty() => MatchOutcome::Resolved(Matched::Raw(buffer.take_all())),
                _ => MatchOutcome::Pending,
            };
        }

        if let Some(data) = chunk {
            buffer.append(data);
        }

        match self {
            Expect::Raw => MatchOutcome::Pending,
            Expect::Prompt => match_prompt(buffer),
            Expect::Eop => match_eop(buffer),
            Expect::Read => match_read(buffer),
        }
    }
}

fn match_prompt(buffer: &mut AccumBuffer) -> MatchOutcome {
    match buffer.first() {
        None => MatchOutcome::Pending,
        Some(PROMPT) => {
            buffer.consume(1);
            MatchOutcome::Resolved(Matched::Prompt)
        }
        Some(_) => MatchOutcome::Rejected(Rejection::Mismatch),
    }
}

fn match_eop(buffer: &mut AccumBuffer) -> MatchOutcome {
    match (buffer.first(), buffer.get(1)) {
        (None, _) | (Some(EOP), None) => MatchOutcome::Pending,
        (Some(EOP), Some(code)) => {
            buffer.consume(2);
            MatchOutcome::Resolved(Matched::Eop(code))
        }
        (Some(_), _) => MatchOutcome::Rejected(Rejection::Mismatch),
    }
}

fn match_read(buffer: &mut AccumBuffer) -> MatchOutcome {
    let Some(index) = buffer.position(EOI) else {
        return MatchOutcome::Pending;
    };

    // Token and terminator leave the buffer together, even when the text is bad
    let token = buffer.consume(index + 1);
    match decode_text(&token[..index]) {
        Ok(text) => MatchOutcome::Resolved(Matched::Read(text)),
        Err(e) => MatchOutcome::Rejected(Rejection::Decode(e)),
    }
}
