//! Envelope - the portable, type-tagged form of a program

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Serialized program plus the identifier of the codec that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    type_id: String,
    payload: Vec<u8>,
}

impl Envelope {
    pub fn new(type_id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_id: type_id.into(),
            payload: payload.into(),
        }
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Copy with the payload replaced; used to exercise corruption handling
    pub fn with_payload(&self, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_id: self.type_id.clone(),
            payload: payload.into(),
        }
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.type_id, self.payload)
    }

    /// Wire form: a JSON record with `type_id` and `payload`
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerDesError;

    #[test]
    fn test_accessors() {
        let envelope = Envelope::new("note", "hello");
        assert_eq!(envelope.type_id(), "note");
        assert_eq!(envelope.payload(), b"hello");

        let corrupted = envelope.with_payload("invalid data");
        assert_eq!(corrupted.type_id(), "note");
        assert_eq!(corrupted.payload(), b"invalid data");
        assert_eq!(envelope.payload(), b"hello");
    }

    #[test]
    fn test_wire_form() {
        let envelope = Envelope::new("note", vec![0u8, 159, 255]);
        let bytes = envelope.to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type_id"], "note");
        assert_eq!(value["payload"], serde_json::json!([0, 159, 255]));
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_malformed_wire_form() {
        let err = Envelope::from_bytes(br#"{"type_id": "note"}"#).unwrap_err();
        assert!(matches!(err, SerDesError::MalformedEnvelope(_)));
    }
}
