//! Codec - serialize/deserialize pair for one program type

use crate::error::BoxError;
use crate::program::{DeserializeOptions, Program};

pub trait Codec: Send + Sync {
    /// Identifier stored in envelopes produced by this codec
    fn type_id(&self) -> &'static str;

    fn serialize(&self, program: &dyn Program) -> Result<Vec<u8>, BoxError>;

    fn deserialize(
        &self,
        payload: &[u8],
        options: Option<&dyn DeserializeOptions>,
    ) -> Result<Box<dyn Program>, BoxError>;

    /// Checks the options type before any payload is read.
    /// Returns the name of the expected type on mismatch.
    fn check_options(&self, _options: &dyn DeserializeOptions) -> Result<(), &'static str> {
        Ok(())
    }
}
