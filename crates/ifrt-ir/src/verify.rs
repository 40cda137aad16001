//! Verifier - structural checks on a parsed module
//!
//! Runs after parsing and checks what the grammar alone cannot:
//! - symbol names are unique per module and call targets resolve
//! - call and return signatures agree with the callee/enclosing function
//! - `ifrt.Call` device lists and `!ifrt.array` shardings are well formed

use crate::attributes::{Attribute, SymbolRef};
use crate::context::{Context, Module, OpId, Value};
use crate::printer::type_to_string;
use crate::types::{ShardingParam, Type, TypeKind};
use ifrt_error::{Diagnostic, Diagnostics, ErrorCode};
use std::collections::{HashMap, HashSet};

/// Verifies `module`, returning every problem found
pub fn verify(ctx: &Context, module: Module) -> Result<(), Diagnostics> {
    let diagnostics = Verifier::new(ctx).verify_module(module.operation());
    if diagnostics.has_errors() {
        Err(diagnostics)
    } else {
        Ok(())
    }
}

/// View of an `!ifrt.array` type
struct ArrayView<'a> {
    shape: &'a [Option<i64>],
    element: Type,
    sharding: &'a ShardingParam,
    devices: &'a [i64],
}

pub struct Verifier<'a> {
    ctx: &'a Context,
    diagnostics: Diagnostics,
    /// Array types already checked
    checked_types: HashSet<Type>,
}

impl<'a> Verifier<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            diagnostics: Diagnostics::new(),
            checked_types: HashSet::new(),
        }
    }

    /// Checks the tree rooted at `root` and returns the diagnostics
    pub fn verify_module(mut self, root: OpId) -> Diagnostics {
        let ctx = self.ctx;
        if ctx.op(root).name != "builtin.module" {
            self.error(
                root,
                ErrorCode::NOT_A_MODULE,
                format!("expected a `module` at the top level, found `{}`", ctx.op(root).name),
            );
            return self.diagnostics;
        }

        let mut ops = Vec::new();
        ctx.walk(root, &mut |op| ops.push(op));
        for op in ops {
            self.verify_value_types(op);
            match ctx.op(op).name.as_str() {
                "builtin.module" => self.verify_symbol_table(op),
                "func.func" => self.verify_func(op),
                "func.return" => self.verify_return(op),
                "func.call" => self.verify_call(op),
                "ifrt.Call" => self.verify_ifrt_call(op),
                _ => {}
            }
        }
        self.diagnostics
    }

    fn error(&mut self, op: OpId, code: ErrorCode, message: impl Into<String>) {
        let mut diagnostic = Diagnostic::error(message).with_code(code);
        if let Some(span) = self.ctx.op(op).location {
            diagnostic = diagnostic.with_label(span, format!("in `{}`", self.ctx.op(op).name));
        }
        self.diagnostics.push(diagnostic);
    }

    fn type_str(&self, ty: Type) -> String {
        type_to_string(self.ctx, ty)
    }

    fn function_signature(&self, func: OpId) -> Option<(&'a [Type], &'a [Type])> {
        let ctx = self.ctx;
        let ty = ctx.op(func).attribute("function_type").and_then(Attribute::as_type)?;
        match ctx.type_kind(ty) {
            TypeKind::Function { inputs, results } => Some((inputs.as_slice(), results.as_slice())),
            _ => None,
        }
    }

    fn array_view(&self, ty: Type) -> Option<ArrayView<'a>> {
        let ctx = self.ctx;
        match ctx.type_kind(ty) {
            TypeKind::IfrtArray {
                shape,
                sharding,
                devices,
                ..
            } => match ctx.type_kind(*shape) {
                TypeKind::Tensor { shape, element } => Some(ArrayView {
                    shape: shape.as_slice(),
                    element: *element,
                    sharding,
                    devices: devices.as_slice(),
                }),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_control(&self, value: Value) -> bool {
        matches!(self.ctx.type_kind(self.ctx.value_type(value)), TypeKind::IfrtControl)
    }

    // =========================================
    // Symbols
    // =========================================

    fn verify_symbol_table(&mut self, module: OpId) {
        let ctx = self.ctx;
        let Some(body) = ctx.entry_block(module) else {
            return;
        };
        let mut seen: HashMap<&str, OpId> = HashMap::new();
        for &op in &ctx.block(body).operations {
            let Some(name) = ctx.op(op).symbol_name() else {
                continue;
            };
            if let Some(previous) = seen.insert(name, op) {
                let mut diagnostic = Diagnostic::error(format!("redefinition of symbol `@{}`", name))
                    .with_code(ErrorCode::DUPLICATE_SYMBOL);
                if let Some(span) = ctx.op(op).location {
                    diagnostic = diagnostic.with_label(span, "redefined here");
                }
                if let Some(span) = ctx.op(previous).location {
                    diagnostic = diagnostic.with_secondary_label(span, "previous definition here");
                }
                self.diagnostics.push(diagnostic);
            }
        }
    }

    fn nearest_symbol_table(&self, op: OpId) -> Option<OpId> {
        let mut current = self.ctx.parent_op(op);
        while let Some(candidate) = current {
            if self.ctx.op(candidate).name == "builtin.module" {
                return Some(candidate);
            }
            current = self.ctx.parent_op(candidate);
        }
        None
    }

    fn lookup_symbol(&self, table: OpId, name: &str) -> Option<OpId> {
        let body = self.ctx.entry_block(table)?;
        self.ctx
            .block(body)
            .operations
            .iter()
            .copied()
            .find(|&op| self.ctx.op(op).symbol_name() == Some(name))
    }

    /// Resolves `sym` from the symbol table nearest to `from`
    fn resolve_function(&self, from: OpId, sym: &SymbolRef) -> Result<OpId, String> {
        let mut table = self
            .nearest_symbol_table(from)
            .ok_or_else(|| "operation is not nested in a module".to_string())?;
        let mut path = sym.path().peekable();
        while let Some(name) = path.next() {
            let found = self
                .lookup_symbol(table, name)
                .ok_or_else(|| format!("symbol `@{}` of `{}` is not defined", name, sym))?;
            if path.peek().is_none() {
                if self.ctx.op(found).name != "func.func" {
                    return Err(format!("`{}` does not reference a function", sym));
                }
                return Ok(found);
            }
            if self.ctx.op(found).name != "builtin.module" {
                return Err(format!("`@{}` in `{}` is not a module", name, sym));
            }
            table = found;
        }
        Err(format!("empty symbol reference `{}`", sym))
    }

    fn callee(&mut self, op: OpId) -> Option<OpId> {
        let ctx = self.ctx;
        let Some(sym) = ctx.op(op).attribute("callee").and_then(Attribute::as_symbol_ref) else {
            self.error(op, ErrorCode::UNKNOWN_SYMBOL, "missing `callee` symbol reference");
            return None;
        };
        match self.resolve_function(op, sym) {
            Ok(func) => Some(func),
            Err(message) => {
                self.error(op, ErrorCode::UNKNOWN_SYMBOL, message);
                None
            }
        }
    }

    // =========================================
    // Functions
    // =========================================

    fn verify_func(&mut self, op: OpId) {
        let ctx = self.ctx;
        let Some((inputs, results)) = self.function_signature(op) else {
            self.error(op, ErrorCode::SIGNATURE_MISMATCH, "function is missing a `function_type`");
            return;
        };

        if ctx.op(op).attribute("ifrt.function").is_some() {
            let non_array = inputs
                .iter()
                .chain(results)
                .find(|ty| self.array_view(**ty).is_none());
            if let Some(&ty) = non_array {
                self.error(
                    op,
                    ErrorCode::INVALID_OPERAND,
                    format!(
                        "IFRT functions only take and return `!ifrt.array` values, found `{}`",
                        self.type_str(ty)
                    ),
                );
            }
        }

        let Some(entry) = ctx.entry_block(op) else {
            return;
        };
        let arg_types: Vec<Type> = ctx
            .block(entry)
            .arguments
            .iter()
            .map(|v| ctx.value_type(*v))
            .collect();
        if arg_types.as_slice() != inputs {
            self.error(
                op,
                ErrorCode::SIGNATURE_MISMATCH,
                "entry block arguments do not match the function inputs",
            );
        }

        let ends_with_return = ctx
            .block(entry)
            .operations
            .last()
            .is_some_and(|&last| ctx.op(last).name == "func.return");
        if !ends_with_return {
            self.error(
                op,
                ErrorCode::SIGNATURE_MISMATCH,
                "function body must end with `return`",
            );
        }
    }

    fn verify_return(&mut self, op: OpId) {
        let ctx = self.ctx;
        let Some(func) = ctx.parent_op(op).filter(|&p| ctx.op(p).name == "func.func") else {
            self.error(op, ErrorCode::INVALID_OPERAND, "`return` must be nested in a `func.func`");
            return;
        };
        let Some((_, results)) = self.function_signature(func) else {
            return;
        };
        let returned: Vec<Type> = ctx.op(op).operands.iter().map(|v| ctx.value_type(*v)).collect();
        if returned.as_slice() != results {
            let expected: Vec<String> = results.iter().map(|t| self.type_str(*t)).collect();
            let found: Vec<String> = returned.iter().map(|t| self.type_str(*t)).collect();
            self.error(
                op,
                ErrorCode::SIGNATURE_MISMATCH,
                format!(
                    "returned types ({}) do not match the function results ({})",
                    found.join(", "),
                    expected.join(", ")
                ),
            );
        }
    }

    fn verify_call(&mut self, op: OpId) {
        let ctx = self.ctx;
        let Some(callee) = self.callee(op) else {
            return;
        };
        let Some((inputs, results)) = self.function_signature(callee) else {
            return;
        };
        let data = ctx.op(op);
        let operand_types: Vec<Type> = data.operands.iter().map(|v| ctx.value_type(*v)).collect();
        let result_types: Vec<Type> = data.results.iter().map(|v| ctx.value_type(*v)).collect();
        if operand_types.as_slice() != inputs || result_types.as_slice() != results {
            self.error(
                op,
                ErrorCode::SIGNATURE_MISMATCH,
                "call signature does not match the callee's `function_type`",
            );
        }
    }

    // =========================================
    // IFRT
    // =========================================

    fn verify_ifrt_call(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);

        let devices = data
            .attribute("devices")
            .and_then(Attribute::as_integer_array)
            .unwrap_or_default();
        if devices.is_empty() {
            self.error(op, ErrorCode::INVALID_DEVICES, "`ifrt.Call` needs at least one device");
        }
        let unique: HashSet<i64> = devices.iter().copied().collect();
        if unique.len() != devices.len() {
            self.error(op, ErrorCode::INVALID_DEVICES, "`ifrt.Call` lists a device more than once");
        }

        let inputs: Vec<Value> = data.operands.iter().copied().filter(|v| !self.is_control(*v)).collect();
        let outputs: Vec<Value> = data.results.iter().copied().filter(|v| !self.is_control(*v)).collect();
        if data.results.len() != outputs.len() + 1 {
            self.error(
                op,
                ErrorCode::INVALID_OPERAND,
                "`ifrt.Call` must produce exactly one `!ifrt.control` result",
            );
        }

        let mut local_types = Vec::new();
        for &value in inputs.iter().chain(&outputs) {
            let ty = ctx.value_type(value);
            let Some(array) = self.array_view(ty) else {
                self.error(
                    op,
                    ErrorCode::INVALID_OPERAND,
                    format!("`ifrt.Call` expects `!ifrt.array` values, found `{}`", self.type_str(ty)),
                );
                return;
            };
            if !devices.is_empty() && array.devices != devices.as_slice() {
                self.error(
                    op,
                    ErrorCode::INVALID_DEVICES,
                    format!(
                        "array `{}` is placed on devices {:?} but the call runs on {:?}",
                        self.type_str(ty),
                        array.devices,
                        devices
                    ),
                );
            }
            local_types.push((array.sharding.local_shape(array.shape), array.element));
        }

        let Some(callee) = self.callee(op) else {
            return;
        };
        let Some((callee_inputs, callee_results)) = self.function_signature(callee) else {
            return;
        };
        if callee_inputs.len() != inputs.len() || callee_results.len() != outputs.len() {
            self.error(
                op,
                ErrorCode::SIGNATURE_MISMATCH,
                format!(
                    "callee takes {} inputs and returns {} results, but the call passes {} and expects {}",
                    callee_inputs.len(),
                    callee_results.len(),
                    inputs.len(),
                    outputs.len()
                ),
            );
            return;
        }

        let expected = callee_inputs.iter().chain(callee_results);
        for ((local_shape, element), &callee_ty) in local_types.into_iter().zip(expected) {
            let matches = match (local_shape, ctx.type_kind(callee_ty)) {
                (Some(local), TypeKind::Tensor { shape, element: callee_element }) => {
                    local == *shape && element == *callee_element
                }
                _ => false,
            };
            if !matches {
                self.error(
                    op,
                    ErrorCode::SIGNATURE_MISMATCH,
                    format!(
                        "per-shard shape does not match callee type `{}`",
                        self.type_str(callee_ty)
                    ),
                );
            }
        }
    }

    /// Checks every `!ifrt.array` type defined by `op` once
    fn verify_value_types(&mut self, op: OpId) {
        let ctx = self.ctx;
        let mut values: Vec<Value> = ctx.op(op).results.clone();
        for &region in &ctx.op(op).regions {
            for &block in &ctx.region(region).blocks {
                values.extend(ctx.block(block).arguments.iter().copied());
            }
        }

        for value in values {
            let ty = ctx.value_type(value);
            if !matches!(ctx.type_kind(ty), TypeKind::IfrtArray { .. }) || !self.checked_types.insert(ty) {
                continue;
            }
            let problem = match self.array_view(ty) {
                None => Some("array shape must be a ranked tensor".to_string()),
                Some(array) => Self::array_problem(&array),
            };
            if let Some(problem) = problem {
                self.error(
                    op,
                    ErrorCode::INVALID_SHARDING,
                    format!("invalid `{}`: {}", self.type_str(ty), problem),
                );
            }
        }
    }

    fn array_problem(array: &ArrayView<'_>) -> Option<String> {
        if let Err(problem) = array.sharding.verify() {
            return Some(problem);
        }
        let Some(num_devices) = array.sharding.num_devices() else {
            return Some("device mesh is too large".to_string());
        };
        if array.devices.len() as i64 != num_devices {
            return Some(format!(
                "sharding spans {} devices but {} are listed",
                num_devices,
                array.devices.len()
            ));
        }
        if array.sharding.local_shape(array.shape).is_none() {
            return Some("dimensions are not divisible by their shard counts".to_string());
        }
        let unique: HashSet<i64> = array.devices.iter().copied().collect();
        if unique.len() != array.devices.len() {
            return Some("device list has duplicates".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::SymbolRef;
    use crate::context::OperationState;

    fn add_func(ctx: &mut Context, parent: crate::context::BlockId, name: &str, ty: Type, with_return: bool) -> OpId {
        let body = ctx.create_region();
        let entry = ctx.append_block(body, &[ty]);
        if with_return {
            let arg = ctx.block(entry).arguments[0];
            let ret = ctx.create_operation(OperationState::new("func.return").with_operands([arg]));
            ctx.append_operation(entry, ret);
        }
        let fn_ty = ctx.function_type(vec![ty], vec![ty]);
        let func = ctx.create_operation(
            OperationState::new("func.func")
                .with_attribute("sym_name", Attribute::string(name))
                .with_attribute("function_type", Attribute::Type(fn_ty))
                .with_region(body),
        );
        ctx.append_operation(parent, func);
        func
    }

    fn codes(result: Result<(), Diagnostics>) -> Vec<ErrorCode> {
        result
            .err()
            .map(|d| d.iter().filter_map(|d| d.code).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_valid_module() {
        let mut ctx = Context::new();
        let module = Module::create(&mut ctx, None);
        let i32_ty = ctx.integer_type(32);
        let body = module.body(&ctx);
        add_func(&mut ctx, body, "main", i32_ty, true);
        assert!(verify(&ctx, module).is_ok());
    }

    #[test]
    fn test_duplicate_symbol() {
        let mut ctx = Context::new();
        let module = Module::create(&mut ctx, None);
        let i32_ty = ctx.integer_type(32);
        let body = module.body(&ctx);
        add_func(&mut ctx, body, "main", i32_ty, true);
        add_func(&mut ctx, body, "main", i32_ty, true);
        assert_eq!(codes(verify(&ctx, module)), vec![ErrorCode::DUPLICATE_SYMBOL]);
    }

    #[test]
    fn test_missing_return() {
        let mut ctx = Context::new();
        let module = Module::create(&mut ctx, None);
        let i32_ty = ctx.integer_type(32);
        let body = module.body(&ctx);
        add_func(&mut ctx, body, "main", i32_ty, false);
        assert_eq!(codes(verify(&ctx, module)), vec![ErrorCode::SIGNATURE_MISMATCH]);
    }

    #[test]
    fn test_call_to_unknown_symbol() {
        let mut ctx = Context::new();
        let module = Module::create(&mut ctx, None);
        let i32_ty = ctx.integer_type(32);
        let body = module.body(&ctx);
        let main = add_func(&mut ctx, body, "main", i32_ty, false);

        let entry = ctx.entry_block(main).unwrap();
        let arg = ctx.block(entry).arguments[0];
        let call = ctx.create_operation(
            OperationState::new("func.call")
                .with_attribute("callee", Attribute::SymbolRef(SymbolRef::new("missing")))
                .with_operands([arg])
                .with_results([i32_ty]),
        );
        ctx.append_operation(entry, call);
        let result = ctx.op(call).results[0];
        let ret = ctx.create_operation(OperationState::new("func.return").with_operands([result]));
        ctx.append_operation(entry, ret);

        assert_eq!(codes(verify(&ctx, module)), vec![ErrorCode::UNKNOWN_SYMBOL]);
    }

    #[test]
    fn test_oversized_mesh_is_invalid_sharding() {
        let mut ctx = Context::new();
        let module = Module::create(&mut ctx, None);
        let f32_ty = ctx.intern_type(TypeKind::Float(crate::types::FloatKind::F32));
        let tensor = ctx.tensor_type(vec![Some(4)], f32_ty);
        let array = ctx.intern_type(TypeKind::IfrtArray {
            shape: tensor,
            sharding: ShardingParam::new(
                vec![1],
                vec![0, 1, 2, 3, 4],
                vec![65536, 65536, 65536, 65536, 2],
            ),
            devices: vec![0],
            memory_kind: None,
        });
        let body = module.body(&ctx);
        add_func(&mut ctx, body, "main", array, true);

        let diagnostics = verify(&ctx, module).unwrap_err();
        let first = diagnostics.iter().next().unwrap();
        assert_eq!(first.code, Some(ErrorCode::INVALID_SHARDING));
        assert!(first.message.contains("too many devices"), "{}", first.message);
    }
}
