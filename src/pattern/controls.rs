//! Control bytes embedded in the shell's UTF-8 stream

/// Shell is ready for input.
pub const PROMPT: u8 = 0x05;

/// End of an output packet. Always followed by one status-code byte.
pub const EOP: u8 = 0x04;

/// End of an input token; terminates every string sent in either direction.
pub const EOI: u8 = 0x03;

/// Whether `byte` belongs to the control vocabulary.
pub fn is_control(byte: u8) -> bool {
    matches!(byte, PROMPT | EOP | EOI)
}
