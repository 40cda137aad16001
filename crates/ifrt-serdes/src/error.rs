//! Serialization errors

use thiserror::Error;

/// Failure reported by a codec
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Standard result type of this crate
pub type Result<T> = std::result::Result<T, SerDesError>;

#[derive(Debug, Error)]
pub enum SerDesError {
    #[error("a codec is already registered for program type `{0}`")]
    DuplicateRegistration(String),

    #[error("no codec is registered for program type `{0}`")]
    UnknownType(String),

    #[error("requested program type `{requested}` but the envelope holds `{found}`")]
    TypeMismatch { requested: String, found: String },

    #[error("failed to serialize `{type_id}` program: {source}")]
    Serialization {
        type_id: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to deserialize `{type_id}` program: {source}")]
    Deserialization {
        type_id: String,
        #[source]
        source: BoxError,
    },

    #[error("deserialize options for `{type_id}` must be `{expected}`")]
    InvalidOptions {
        type_id: String,
        expected: &'static str,
    },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
}
