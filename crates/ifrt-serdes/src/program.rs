//! Program and option traits
//!
//! Codecs see programs and options as trait objects and recover the
//! concrete types through `Any`.

use std::any::Any;
use std::fmt::Debug;

/// An in-memory artifact that owns its backing storage
pub trait Program: Any + Debug + Send {
    /// Identifier of the codec that handles this program
    fn program_type(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

/// A program type with a statically known identifier
pub trait ProgramType: Program + Sized {
    const TYPE_ID: &'static str;
}

/// Per-type options passed to a codec when deserializing
pub trait DeserializeOptions: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}
