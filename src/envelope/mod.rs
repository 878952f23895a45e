//! Envelope serialization for frames on the wire
//!
//! Every payload travels inside a one-field protobuf message. The field
//! number comes from a [`Schema`] that has to be loaded before anything can
//! be sent or received.

mod schema;

pub use schema::{Schema, DATA_FIELD, DEFAULT_MESSAGE_TYPE};

use crate::result::{DecodeError, ExpectError, SchemaError};
use bytes::{Buf, BufMut, Bytes};
use prost::encoding::{
    decode_key, decode_varint, encode_key, encode_varint, encoded_len_varint, skip_field,
    DecodeContext, WireType,
};
use std::path::Path;

/// Wraps payloads into envelopes and back.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    schema: Option<Schema>,
}

impl Serializer {
    /// Serializer with no schema yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with a schema already resolved
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema: Some(schema),
        }
    }

    /// Read a definition file and resolve `message_type` from it.
    pub async fn load_file(
        path: impl AsRef<Path>,
        message_type: &str,
    ) -> Result<Schema, SchemaError> {
        let definition = tokio::fs::read_to_string(path).await?;
        Schema::parse(&definition, message_type)
    }

    /// Install a schema, replacing any previous one
    pub fn set_schema(&mut self, schema: Schema) {
        self.schema = Some(schema);
    }

    /// Whether a schema has been loaded
    pub fn is_ready(&self) -> bool {
        self.schema.is_some()
    }

    /// The loaded schema
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Encode `payload` as an envelope.
    ///
    /// An empty payload encodes to an empty message, as proto3 omits default
    /// values.
    pub fn wrap(&self, payload: &[u8]) -> Result<Vec<u8>, SchemaError> {
        let schema = self.schema.as_ref().ok_or(SchemaError::NotLoaded)?;
        let tag = schema.data_tag();

        let mut out = Vec::new();
        if !payload.is_empty() {
            let len = payload.len() as u64;
            out.reserve(encoded_len_varint(u64::from(tag) << 3) + encoded_len_varint(len) + payload.len());
            encode_key(tag, WireType::LengthDelimited, &mut out);
            encode_varint(len, &mut out);
            out.put_slice(payload);
        }
        Ok(out)
    }

    /// Extract the payload from an envelope.
    ///
    /// Unknown fields are skipped. When the payload field repeats, the last
    /// occurrence wins.
    pub fn unwrap(&self, wire: &[u8]) -> Result<Bytes, ExpectError> {
        let schema = self.schema.as_ref().ok_or(SchemaError::NotLoaded)?;
        let tag = schema.data_tag();

        let mut buf = wire;
        let mut payload = Bytes::new();
        while buf.has_remaining() {
            let (field, wire_type) = decode_key(&mut buf).map_err(DecodeError::from)?;
            if field == tag && wire_type == WireType::LengthDelimited {
                let len = decode_varint(&mut buf).map_err(DecodeError::from)?;
                let available = buf.remaining();
                let len = usize::try_from(len)
                    .ok()
                    .filter(|len| *len <= available)
                    .ok_or(DecodeError::Truncated {
                        needed: usize::try_from(len).unwrap_or(usize::MAX),
                        available,
                    })?;
                payload = buf.copy_to_bytes(len);
            } else {
                skip_field(wire_type, field, &mut buf, DecodeContext::default())
                    .map_err(DecodeError::from)?;
            }
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn serializer() -> Serializer {
        Serializer::with_schema(Schema::new(DEFAULT_MESSAGE_TYPE, 1))
    }

    #[test]
    fn test_wrap_known_encoding() {
        let wire = serializer().wrap(b"ls\x03").unwrap();
        assert_eq!(wire, [0x0A, 0x03, b'l', b's', 0x03]);
    }

    #[test]
    fn test_wrap_empty_payload() {
        let s = serializer();
        let wire = s.wrap(b"").unwrap();
        assert!(wire.is_empty());
        assert!(s.unwrap(&wire).unwrap().is_empty());
    }

    #[test]
    fn test_high_field_number() {
        let s = Serializer::with_schema(Schema::new("x.Frame", 300));
        let wire = s.wrap(b"abc").unwrap();
        assert_eq!(&wire[..2], [0xE2, 0x12]);
        assert_eq!(&s.unwrap(&wire).unwrap()[..], b"abc");
    }

    #[test]
    fn test_unwrap_skips_unknown_fields() {
        // field 2 varint 150, then field 1 bytes "hi", then field 3 bytes "zz"
        let wire = [0x10, 0x96, 0x01, 0x0A, 0x02, b'h', b'i', 0x1A, 0x02, b'z', b'z'];
        assert_eq!(&serializer().unwrap(&wire).unwrap()[..], b"hi");
    }

    #[test]
    fn test_unwrap_truncated() {
        let wire = [0x0A, 0x05, b'a', b'b'];
        let result = serializer().unwrap(&wire);
        assert!(matches!(
            result,
            Err(ExpectError::Decode(DecodeError::Truncated {
                needed: 5,
                available: 2
            }))
        ));
    }

    #[test]
    fn test_unwrap_garbage() {
        let result = serializer().unwrap(&[0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(ExpectError::Decode(_))));
    }

    #[test]
    fn test_not_loaded() {
        let s = Serializer::new();
        assert!(!s.is_ready());
        assert!(matches!(s.wrap(b"x"), Err(SchemaError::NotLoaded)));
        assert!(matches!(
            s.unwrap(b"x"),
            Err(ExpectError::Schema(SchemaError::NotLoaded))
        ));
    }

    #[tokio::test]
    async fn test_load_file() {
        let path = std::env::temp_dir().join(format!("shellmod-{}.proto", std::process::id()));
        tokio::fs::write(&path, "package proto;\nmessage Data { bytes data = 2; }\n")
            .await
            .unwrap();

        let schema = Serializer::load_file(&path, DEFAULT_MESSAGE_TYPE)
            .await
            .unwrap();
        assert_eq!(schema.data_tag(), 2);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = Serializer::load_file("/nonexistent/messages.proto", DEFAULT_MESSAGE_TYPE).await;
        assert!(matches!(result, Err(SchemaError::Io(_))));
    }

    proptest! {
        #[test]
        fn payload_round_trips(payload in proptest::collection::vec(any::<u8>(), 0..2048), tag in 1u32..5000) {
            let s = Serializer::with_schema(Schema::new("t.Data", tag));
            let wire = s.wrap(&payload).unwrap();
            prop_assert_eq!(&s.unwrap(&wire).unwrap()[..], &payload[..]);
        }
    }
}
