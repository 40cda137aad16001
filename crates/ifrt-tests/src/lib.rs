//! End-to-end tests for IFRT program serialization
//!
//! Exercises the complete path:
//! Text → Parser → Program → Registry → Envelope → wire bytes, and back

use ifrt_serdes::{DeserializeOptions, Envelope, IfrtIrProgram, Registry};

/// Single-device program calling into a nested `mhlo` module
pub const ADD_ONE: &str = r#"
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

/// Two chained calls ordered by a control dependency
pub const CHAINED: &str = r#"
!a = !ifrt.array<tensor<4xf32>, #ifrt.sharding_param<2 to [0] on 2>, [0, 1]>
module @chained {
  func.func @main(%arg0: !a) -> !a attributes {ifrt.function} {
    %0, %ctrl_0 = ifrt.Call @f(%arg0) on devices [0, 1] : (!a) -> !a
    %1, %ctrl_1 = ifrt.Call @f(%0) after %ctrl_0 on devices [0, 1] : (!a) -> !a
    return %1 : !a
  }
  func.func private @f(%arg0: tensor<2xf32>) -> tensor<2xf32> {
    return %arg0 : tensor<2xf32>
  }
}
"#;

/// Two-dimensional array split over a 2x2 device mesh
pub const SHARDED: &str = r#"
!grid = !ifrt.array<tensor<4x2xi32>, #ifrt.sharding_param<2x1 to [1, 0] on 2x2>, [0, 1, 2, 3]>
module @sharded {
  func.func @main(%arg0: !grid) -> !grid attributes {ifrt.function} {
    %0, %ctrl_0 = ifrt.Call @shard::@main(%arg0) on devices [0, 1, 2, 3] : (!grid) -> !grid
    return %0 : !grid
  }

  module @shard {
    func.func @main(%arg0: tensor<2x2xi32>) -> tensor<2x2xi32> {
      return %arg0 : tensor<2x2xi32>
    }
  }
}
"#;

/// Installs a subscriber that writes through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Parses `source`, panicking with the rendered diagnostics on failure
pub fn program(source: &str) -> IfrtIrProgram {
    match IfrtIrProgram::parse(source) {
        Ok(program) => program,
        Err(err) => panic!("Expected source to parse, but got:\n{}", err),
    }
}

/// Serializes `program` and deserializes it again through `registry`
pub fn round_trip(registry: &Registry, program: &IfrtIrProgram) -> IfrtIrProgram {
    let envelope = match registry.serialize(program) {
        Ok(envelope) => envelope,
        Err(err) => panic!("Expected program to serialize, but got: {}", err),
    };
    match registry.deserialize_as(&envelope, None) {
        Ok(program) => program,
        Err(err) => panic!("Expected envelope to deserialize, but got: {}", err),
    }
}

/// Asserts that a serialize/deserialize cycle preserves the printed module
pub fn assert_round_trip(source: &str) {
    let registry = Registry::with_builtin_codecs();
    let original = program(source);
    let restored = round_trip(&registry, &original);
    if restored.to_text() != original.to_text() {
        panic!(
            "Round trip changed the module.\n\nBefore:\n{}\nAfter:\n{}",
            original.to_text(),
            restored.to_text()
        );
    }
}

/// Asserts that deserializing `envelope` as an IFRT IR program fails with
/// a message containing `expected`
pub fn assert_deserialize_fails(
    registry: &Registry,
    envelope: &Envelope,
    options: Option<&dyn DeserializeOptions>,
    expected: &str,
) {
    match registry.deserialize_as::<IfrtIrProgram>(envelope, options) {
        Ok(program) => panic!(
            "Expected deserialization to fail, but got:\n{}",
            program.to_text()
        ),
        Err(err) => {
            let message = err.to_string();
            if !message.contains(expected) {
                panic!(
                    "Expected error to contain '{}', but it was:\n{}",
                    expected, message
                );
            }
        }
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use ifrt_ir::verify;
    use ifrt_serdes::ProgramType;
    use pretty_assertions::assert_eq;

    // =========================================
    // Round trip
    // =========================================

    #[test]
    fn test_add_one_round_trip() {
        init_tracing();
        let registry = Registry::with_builtin_codecs();
        let original = program(ADD_ONE);
        let expected = original.to_text();

        let envelope = registry.serialize(&original).unwrap();
        assert_eq!(envelope.type_id(), IfrtIrProgram::TYPE_ID);
        drop(original);

        let restored: IfrtIrProgram = registry.deserialize_as(&envelope, None).unwrap();
        assert_eq!(restored.to_text(), expected);
        assert!(verify(restored.context(), restored.module()).is_ok());
    }

    #[test]
    fn test_chained_round_trip() {
        assert_round_trip(CHAINED);
    }

    #[test]
    fn test_sharded_round_trip() {
        init_tracing();
        let registry = Registry::with_builtin_codecs();
        let restored = round_trip(&registry, &program(SHARDED));
        let text = restored.to_text();
        assert!(text.contains("#ifrt.sharding_param<2x1 to [1, 0] on 2x2>"), "{}", text);
        assert!(verify(restored.context(), restored.module()).is_ok());
        assert_round_trip(SHARDED);
    }

    #[test]
    fn test_empty_module_round_trip() {
        assert_round_trip("module {\n}\n");
    }

    #[test]
    fn test_repeated_round_trips_are_stable() {
        let registry = Registry::with_builtin_codecs();
        let first = round_trip(&registry, &program(CHAINED));
        let second = round_trip(&registry, &first);
        assert_eq!(second.to_text(), first.to_text());
    }

    #[test]
    fn test_module_name_survives() {
        let registry = Registry::with_builtin_codecs();
        let restored = round_trip(&registry, &program(CHAINED));
        let (context, module) = restored.into_parts();
        assert_eq!(module.name(&context), Some("chained"));
    }

    // =========================================
    // Corrupted payloads
    // =========================================

    #[test]
    fn test_invalid_data_payload() {
        init_tracing();
        let registry = Registry::with_builtin_codecs();
        let envelope = registry
            .serialize(&program(ADD_ONE))
            .unwrap()
            .with_payload("invalid data");
        assert_deserialize_fails(
            &registry,
            &envelope,
            None,
            "Failed to parse IFRT IR module string",
        );
    }

    #[test]
    fn test_truncated_payload() {
        let registry = Registry::with_builtin_codecs();
        let envelope = registry.serialize(&program(ADD_ONE)).unwrap();
        let truncated = &envelope.payload()[..envelope.payload().len() / 2];
        assert_deserialize_fails(
            &registry,
            &envelope.with_payload(truncated),
            None,
            "Failed to parse IFRT IR module string",
        );
    }

    #[test]
    fn test_non_utf8_payload() {
        let registry = Registry::with_builtin_codecs();
        let envelope = Envelope::new(IfrtIrProgram::TYPE_ID, vec![0x6d, 0xff, 0xfe]);
        assert_deserialize_fails(
            &registry,
            &envelope,
            None,
            "Failed to parse IFRT IR module string",
        );
    }

    #[test]
    fn test_deeply_nested_payload() {
        let registry = Registry::with_builtin_codecs();
        let text = format!("{}{}", "module {".repeat(1000), "}".repeat(1000));
        let envelope = Envelope::new(IfrtIrProgram::TYPE_ID, text);
        assert_deserialize_fails(
            &registry,
            &envelope,
            None,
            "Failed to parse IFRT IR module string",
        );
        assert_deserialize_fails(&registry, &envelope, None, "nesting exceeds the limit");
    }

    #[test]
    fn test_oversized_mesh_payload() {
        let registry = Registry::with_builtin_codecs();
        let text = SHARDED.replace(
            "[1, 0] on 2x2>",
            "[0, 1, 2, 3, 4] on 65536x65536x65536x65536x2>",
        );
        let envelope = Envelope::new(IfrtIrProgram::TYPE_ID, text);
        assert_deserialize_fails(&registry, &envelope, None, "too many devices");
    }

    #[test]
    fn test_unresolved_callee_fails_verification() {
        let registry = Registry::with_builtin_codecs();
        let text = ADD_ONE.replace("@add_one::@main(%arg0)", "@missing::@main(%arg0)");
        let envelope = Envelope::new(IfrtIrProgram::TYPE_ID, text);
        assert_deserialize_fails(&registry, &envelope, None, "@missing");
    }
}


#[cfg(test)]
mod wire_tests {
    use super::*;
    use ifrt_serdes::SerDesError;
    use pretty_assertions::assert_eq;
    use std::io::{Read, Seek, SeekFrom, Write};

    #[test]
    fn test_envelope_through_temp_file() {
        let registry = Registry::with_builtin_codecs();
        let envelope = registry.serialize(&program(CHAINED)).unwrap();

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&envelope.to_bytes().unwrap()).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();

        let restored = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(restored, envelope);
        let program: IfrtIrProgram = registry.deserialize_as(&restored, None).unwrap();
        assert_eq!(program.to_text(), super::program(CHAINED).to_text());
    }

    #[test]
    fn test_envelope_in_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("program.json");
        let envelope = Registry::with_builtin_codecs()
            .serialize(&program(ADD_ONE))
            .unwrap();

        std::fs::write(&path, envelope.to_bytes().unwrap()).unwrap();
        let restored = Envelope::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(restored.type_id(), "ifrt_ir_program");
        assert_eq!(restored.payload(), envelope.payload());
    }

    #[test]
    fn test_malformed_wire_bytes() {
        let err = Envelope::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, SerDesError::MalformedEnvelope(_)));
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_concurrent_deserialize() {
        let registry = Registry::with_builtin_codecs();
        let envelope = registry.serialize(&program(ADD_ONE)).unwrap();

        let texts: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let program: IfrtIrProgram =
                            registry.deserialize_as(&envelope, None).unwrap();
                        program.to_text()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for text in &texts {
            assert_eq!(text, &texts[0]);
        }
    }

    #[test]
    fn test_program_moves_between_threads() {
        let original = program(CHAINED);
        let expected = original.to_text();
        let text = std::thread::spawn(move || original.to_text())
            .join()
            .unwrap();
        assert_eq!(text, expected);
    }
}

#[cfg(test)]
mod global_tests {
    use super::*;
    use ifrt_serdes::{Program, ProgramType};

    #[test]
    fn test_global_registry_has_builtin_codec() {
        assert!(Registry::global().contains(IfrtIrProgram::TYPE_ID));

        let envelope = ifrt_serdes::serialize(&program(ADD_ONE)).unwrap();
        let restored: IfrtIrProgram = ifrt_serdes::deserialize_as(&envelope, None).unwrap();
        assert_eq!(restored.to_text(), program(ADD_ONE).to_text());

        let boxed = ifrt_serdes::deserialize(&envelope, IfrtIrProgram::TYPE_ID, None).unwrap();
        assert_eq!(boxed.program_type(), "ifrt_ir_program");
    }

    #[test]
    fn test_global_registration_is_rejected_twice() {
        let err = ifrt_serdes::register(ifrt_serdes::IfrtIrProgramCodec).unwrap_err();
        assert!(matches!(err, ifrt_serdes::SerDesError::DuplicateRegistration(_)));
    }
}
