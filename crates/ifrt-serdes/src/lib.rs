//! ifrt-serdes - Serialization of IFRT programs
//!
//! Provides:
//! - **Envelope**: type-tagged container of serialized bytes, with a JSON wire form
//! - **Codec**: serialize/deserialize pair for one program type
//! - **Registry**: table from program type identifier to codec
//! - **IfrtIrProgram**: an IFRT IR module plus the context that owns it
//!
//! Callers hand a `&dyn Program` to the registry and get an `Envelope` back;
//! the envelope's type identifier selects the codec on the way in.
//!
//! # Example
//!
//! ```rust
//! use ifrt_serdes::{IfrtIrProgram, Registry};
//!
//! let registry = Registry::with_builtin_codecs();
//! let program = IfrtIrProgram::parse("module @m {\n}\n").expect("valid module");
//!
//! let envelope = registry.serialize(&program).expect("serializable");
//! let restored: IfrtIrProgram = registry
//!     .deserialize_as(&envelope, None)
//!     .expect("round trip");
//! assert_eq!(restored.to_text(), program.to_text());
//! ```

pub mod codec;
pub mod envelope;
pub mod error;
pub mod ifrt_program;
pub mod program;
pub mod registry;

pub use codec::Codec;
pub use envelope::Envelope;
pub use error::{BoxError, Result, SerDesError};
pub use ifrt_program::{
    DeserializeIfrtIrProgramOptions, IfrtIrProgram, IfrtIrProgramCodec, ParseModuleError,
};
pub use program::{DeserializeOptions, Program, ProgramType};
pub use registry::Registry;

/// Registers `codec` with the process-wide registry
pub fn register<C: Codec + 'static>(codec: C) -> Result<()> {
    Registry::global().register(codec)
}

/// Serializes `program` through the process-wide registry
pub fn serialize(program: &dyn Program) -> Result<Envelope> {
    Registry::global().serialize(program)
}

/// Deserializes `envelope` through the process-wide registry
pub fn deserialize(
    envelope: &Envelope,
    requested_type_id: &str,
    options: Option<&dyn DeserializeOptions>,
) -> Result<Box<dyn Program>> {
    Registry::global().deserialize(envelope, requested_type_id, options)
}

pub fn deserialize_as<T: ProgramType>(
    envelope: &Envelope,
    options: Option<&dyn DeserializeOptions>,
) -> Result<T> {
    Registry::global().deserialize_as(envelope, options)
}
