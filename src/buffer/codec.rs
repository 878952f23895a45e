//! Text and byte helpers shared by the engine and the serializer

use crate::result::DecodeError;

/// Encode a string as UTF-8 bytes.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Decode UTF-8 bytes, failing on any invalid sequence.
pub fn decode_text(bytes: &[u8]) -> Result<String, DecodeError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

/// Concatenate two byte slices into a fresh vector.
pub fn concat(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    out.extend_from_slice(left);
    out.extend_from_slice(right);
    out
}

/// Index of the first occurrence of `needle`.
pub fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}
