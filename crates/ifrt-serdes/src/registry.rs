//! Registry - resolves a type identifier to its codec
//!
//! Codecs are registered once during start-up; afterwards the table is only
//! read, from any number of threads.

use crate::codec::Codec;
use crate::envelope::Envelope;
use crate::error::{Result, SerDesError};
use crate::ifrt_program::IfrtIrProgramCodec;
use crate::program::{DeserializeOptions, Program, ProgramType};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Table of codecs keyed by type identifier
pub struct Registry {
    codecs: DashMap<String, Arc<dyn Codec>>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            codecs: DashMap::new(),
        }
    }

    /// Registry holding the codecs shipped with this crate
    pub fn with_builtin_codecs() -> Self {
        let registry = Self::new();
        registry
            .codecs
            .insert(IfrtIrProgramCodec.type_id().to_string(), Arc::new(IfrtIrProgramCodec));
        registry
    }

    /// Process-wide registry, initialized with the builtin codecs on first use
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Self::with_builtin_codecs)
    }

    /// Adds a codec. The first codec registered for a type id stays active.
    pub fn register<C: Codec + 'static>(&self, codec: C) -> Result<()> {
        let type_id = codec.type_id();
        match self.codecs.entry(type_id.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!("rejected second codec for program type `{}`", type_id);
                Err(SerDesError::DuplicateRegistration(type_id.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(codec));
                tracing::debug!("registered codec for program type `{}`", type_id);
                Ok(())
            }
        }
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.codecs.contains_key(type_id)
    }

    /// Registered type identifiers, sorted
    pub fn type_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.codecs.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Clones the codec out so no map lock is held while it runs
    fn codec(&self, type_id: &str) -> Result<Arc<dyn Codec>> {
        match self.codecs.get(type_id) {
            Some(entry) => Ok(Arc::clone(entry.value())),
            None => {
                tracing::debug!("no codec for program type `{}`", type_id);
                Err(SerDesError::UnknownType(type_id.to_string()))
            }
        }
    }

    /// Serializes `program` with the codec of its runtime type
    pub fn serialize(&self, program: &dyn Program) -> Result<Envelope> {
        let type_id = program.program_type();
        let codec = self.codec(type_id)?;
        let payload = codec
            .serialize(program)
            .map_err(|source| SerDesError::Serialization {
                type_id: type_id.to_string(),
                source,
            })?;
        tracing::debug!("serialized `{}` program ({} bytes)", type_id, payload.len());
        Ok(Envelope::new(type_id, payload))
    }

    /// Deserializes `envelope`, which must hold a `requested_type_id` program
    pub fn deserialize(
        &self,
        envelope: &Envelope,
        requested_type_id: &str,
        options: Option<&dyn DeserializeOptions>,
    ) -> Result<Box<dyn Program>> {
        let codec = self.codec(requested_type_id)?;
        if envelope.type_id() != requested_type_id {
            return Err(SerDesError::TypeMismatch {
                requested: requested_type_id.to_string(),
                found: envelope.type_id().to_string(),
            });
        }
        if let Some(options) = options {
            codec
                .check_options(options)
                .map_err(|expected| SerDesError::InvalidOptions {
                    type_id: requested_type_id.to_string(),
                    expected,
                })?;
        }

        match codec.deserialize(envelope.payload(), options) {
            Ok(program) => {
                tracing::debug!(
                    "deserialized `{}` program ({} bytes)",
                    requested_type_id,
                    envelope.payload().len()
                );
                Ok(program)
            }
            Err(source) => {
                tracing::warn!("failed to deserialize `{}` program: {}", requested_type_id, source);
                Err(SerDesError::Deserialization {
                    type_id: requested_type_id.to_string(),
                    source,
                })
            }
        }
    }

    /// Deserializes `envelope` into the concrete program type `T`
    pub fn deserialize_as<T: ProgramType>(
        &self,
        envelope: &Envelope,
        options: Option<&dyn DeserializeOptions>,
    ) -> Result<T> {
        let program = self.deserialize(envelope, T::TYPE_ID, options)?;
        let found = program.program_type();
        program
            .into_any()
            .downcast::<T>()
            .map(|program| *program)
            .map_err(|_| SerDesError::TypeMismatch {
                requested: T::TYPE_ID.to_string(),
                found: found.to_string(),
            })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
