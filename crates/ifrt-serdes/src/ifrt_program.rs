//! IFRT IR programs and their codec
//!
//! The wire payload is the canonical module text. Deserializing parses it
//! into a fresh `Context`, which the resulting program then owns.

use crate::codec::Codec;
use crate::error::BoxError;
use crate::program::{DeserializeOptions, Program, ProgramType};
use ifrt_error::{Diagnostics, SourceCache};
use ifrt_ir::{print_module, verify, Context, ContextConfig, Module};
use ifrt_parser::parse_module_in;
use thiserror::Error;

/// A parsed IFRT IR module together with the context that owns it
#[derive(Debug)]
pub struct IfrtIrProgram {
    context: Context,
    module: Module,
}

impl IfrtIrProgram {
    /// Pairs `module` with its owning `context`; `None` if `module` is not a
    /// module operation of `context`
    pub fn new(context: Context, module: Module) -> Option<Self> {
        module
            .belongs_to(&context)
            .then_some(Self { context, module })
    }

    /// Parses and verifies `text` with default options
    pub fn parse(text: &str) -> Result<Self, ParseModuleError> {
        parse_program(text.as_bytes(), DeserializeIfrtIrProgramOptions::default())
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn module(&self) -> Module {
        self.module
    }

    pub fn into_parts(self) -> (Context, Module) {
        (self.context, self.module)
    }

    /// Canonical text of the module
    pub fn to_text(&self) -> String {
        print_module(&self.context, self.module)
    }
}

impl Program for IfrtIrProgram {
    fn program_type(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any + Send> {
        self
    }
}

impl ProgramType for IfrtIrProgram {
    const TYPE_ID: &'static str = "ifrt_ir_program";
}

/// Options accepted when deserializing an [`IfrtIrProgram`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeserializeIfrtIrProgramOptions {
    /// Accept operations, types and attributes of unknown dialects
    pub allow_unregistered_dialects: bool,
    /// Run the structural verifier after parsing
    pub verify: bool,
}

impl Default for DeserializeIfrtIrProgramOptions {
    fn default() -> Self {
        Self {
            allow_unregistered_dialects: false,
            verify: true,
        }
    }
}

impl DeserializeOptions for DeserializeIfrtIrProgramOptions {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// The payload is not a valid module
#[derive(Debug, Error)]
#[error("Failed to parse IFRT IR module string: {message}")]
pub struct ParseModuleError {
    message: String,
    diagnostics: Diagnostics,
}

impl ParseModuleError {
    fn from_diagnostics(diagnostics: Diagnostics, cache: &SourceCache) -> Self {
        Self {
            message: diagnostics.render(cache),
            diagnostics,
        }
    }

    /// Diagnostics behind the error; empty when the payload was not UTF-8
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

fn parse_program(
    payload: &[u8],
    options: DeserializeIfrtIrProgramOptions,
) -> Result<IfrtIrProgram, ParseModuleError> {
    let text = std::str::from_utf8(payload).map_err(|err| ParseModuleError {
        message: format!("payload is not valid UTF-8: {}", err),
        diagnostics: Diagnostics::new(),
    })?;

    let mut context = Context::with_config(ContextConfig {
        allow_unregistered_dialects: options.allow_unregistered_dialects,
    });
    let mut cache = SourceCache::new();
    let file_id = cache.add(IfrtIrProgram::TYPE_ID, text);

    let module = parse_module_in(text, file_id, &mut context)
        .map_err(|diagnostics| ParseModuleError::from_diagnostics(diagnostics, &cache))?;
    if options.verify {
        verify(&context, module)
            .map_err(|diagnostics| ParseModuleError::from_diagnostics(diagnostics, &cache))?;
    }
    Ok(IfrtIrProgram { context, module })
}

/// Codec for [`IfrtIrProgram`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IfrtIrProgramCodec;

impl Codec for IfrtIrProgramCodec {
    fn type_id(&self) -> &'static str {
        IfrtIrProgram::TYPE_ID
    }

    fn serialize(&self, program: &dyn Program) -> Result<Vec<u8>, BoxError> {
        let program = program
            .as_any()
            .downcast_ref::<IfrtIrProgram>()
            .ok_or_else(|| {
                format!(
                    "expected a `{}` program, found `{}`",
                    IfrtIrProgram::TYPE_ID,
                    program.program_type()
                )
            })?;
        Ok(program.to_text().into_bytes())
    }

    fn deserialize(
        &self,
        payload: &[u8],
        options: Option<&dyn DeserializeOptions>,
    ) -> Result<Box<dyn Program>, BoxError> {
        let options = match options {
            Some(options) => *options
                .as_any()
                .downcast_ref::<DeserializeIfrtIrProgramOptions>()
                .ok_or("unsupported deserialize options")?,
            None => DeserializeIfrtIrProgramOptions::default(),
        };
        Ok(Box::new(parse_program(payload, options)?))
    }

    fn check_options(&self, options: &dyn DeserializeOptions) -> Result<(), &'static str> {
        if options.as_any().is::<DeserializeIfrtIrProgramOptions>() {
            Ok(())
        } else {
            Err(std::any::type_name::<DeserializeIfrtIrProgramOptions>())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerDesError;
    use crate::registry::Registry;
    use ifrt_error::ErrorCode;
    use pretty_assertions::assert_eq;

    const PROGRAM: &str = r#"
!array = !ifrt.array<tensor<2xi32>, #ifrt.sharding_param<1 to [0] on 1>, [0]>
module {
  func.func @main(%arg0: !array) -> !array attributes {ifrt.function} {
    %0, %ctrl_0 = ifrt.Call @add_one::@main(%arg0) on devices [0]
        : (!array) -> !array
    return %0 : !array
  }

  module @add_one {
    func.func @main(%arg0: tensor<2xi32>) -> tensor<2xi32> {
      %0 = mhlo.constant dense<1> : tensor<2xi32>
      %1 = mhlo.add %arg0, %0 : tensor<2xi32>
      return %1 : tensor<2xi32>
    }
  }
}
"#;

    struct OtherOptions;

    impl DeserializeOptions for OtherOptions {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_round_trip() {
        let registry = Registry::with_builtin_codecs();
        let program = IfrtIrProgram::parse(PROGRAM).unwrap();
        let expected = program.to_text();

        let envelope = registry.serialize(&program).unwrap();
        assert_eq!(envelope.type_id(), "ifrt_ir_program");
        assert_eq!(envelope.payload(), expected.as_bytes());
        drop(program);

        let restored: IfrtIrProgram = registry.deserialize_as(&envelope, None).unwrap();
        assert_eq!(restored.to_text(), expected);
    }

    #[test]
    fn test_invalid_payload() {
        let registry = Registry::with_builtin_codecs();
        let envelope = registry
            .serialize(&IfrtIrProgram::parse(PROGRAM).unwrap())
            .unwrap()
            .with_payload("invalid data");

        let err = registry
            .deserialize_as::<IfrtIrProgram>(&envelope, None)
            .unwrap_err();
        assert!(matches!(err, SerDesError::Deserialization { .. }));
        assert!(err.to_string().contains("Failed to parse IFRT IR module string"));
    }

    #[test]
    fn test_non_utf8_payload() {
        let err = IfrtIrProgramCodec
            .deserialize(&[0xc3, 0x28], None)
            .err()
            .expect("payload must be rejected");
        assert!(err.to_string().starts_with("Failed to parse IFRT IR module string"));
    }

    #[test]
    fn test_parse_error_keeps_diagnostics() {
        let err = IfrtIrProgram::parse("module {\n  bogus\n}").unwrap_err();
        let codes: Vec<_> = err.diagnostics().iter().filter_map(|d| d.code).collect();
        assert_eq!(codes, vec![ErrorCode::UNKNOWN_OPERATION]);
        assert!(err.to_string().contains("custom op 'bogus' is unknown"));
    }

    #[test]
    fn test_options_select_dialects_and_verification() {
        let registry = Registry::with_builtin_codecs();
        let text = r#"
func.func @main(%arg0: i32) -> i32 {
  %0 = "toy.double"(%arg0) : (i32) -> i32
  %1 = call @missing(%0) : (i32) -> i32
  return %1 : i32
}
"#;
        let envelope = crate::Envelope::new(IfrtIrProgram::TYPE_ID, text);

        let strict = registry.deserialize_as::<IfrtIrProgram>(&envelope, None);
        assert!(strict.is_err());

        let dialects_only = DeserializeIfrtIrProgramOptions {
            allow_unregistered_dialects: true,
            ..Default::default()
        };
        let err = registry
            .deserialize_as::<IfrtIrProgram>(&envelope, Some(&dialects_only))
            .unwrap_err();
        assert!(err.to_string().contains("@missing"));

        let lenient = DeserializeIfrtIrProgramOptions {
            allow_unregistered_dialects: true,
            verify: false,
        };
        let program: IfrtIrProgram = registry
            .deserialize_as(&envelope, Some(&lenient))
            .unwrap();
        assert!(program.to_text().contains("\"toy.double\""));
    }

    #[test]
    fn test_foreign_options_rejected() {
        let registry = Registry::with_builtin_codecs();
        let envelope = crate::Envelope::new(IfrtIrProgram::TYPE_ID, "invalid data");
        let err = registry
            .deserialize_as::<IfrtIrProgram>(&envelope, Some(&OtherOptions))
            .unwrap_err();
        match err {
            SerDesError::InvalidOptions { type_id, expected } => {
                assert_eq!(type_id, "ifrt_ir_program");
                assert!(expected.ends_with("DeserializeIfrtIrProgramOptions"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_into_parts() {
        let program = IfrtIrProgram::parse("module @m {\n}\n").unwrap();
        let module = program.module();
        let (context, parts_module) = program.into_parts();
        assert_eq!(module, parts_module);
        assert_eq!(module.name(&context), Some("m"));
    }

    #[test]
    fn test_new_rejects_module_of_another_context() {
        let mut builder = Context::new();
        for _ in 0..3 {
            Module::create(&mut builder, None);
        }
        let foreign = Module::create(&mut builder, Some("late"));
        assert!(IfrtIrProgram::new(Context::new(), foreign).is_none());

        let mut small = Context::new();
        let own = Module::create(&mut small, Some("own"));

        let program = IfrtIrProgram::new(small, own).expect("module of its own context");
        assert!(program.to_text().contains("module @own"));
    }
}
