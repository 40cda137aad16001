//! Printer - canonical text form of a module
//!
//! Output is deterministic: two-space indentation, one operation per line,
//! sorted attribute dictionaries and SSA names renumbered per isolated
//! region (`%argN` for block arguments, `%N` for results, `%ctrl_N` for
//! control tokens). Printing a module, parsing the text and printing again
//! yields the same string.

use crate::attributes::{Attribute, AttributeMap};
use crate::context::{Context, Module, OpId, RegionId, Value};
use crate::dialect::Lookup;
use crate::types::{Type, TypeKind};
use std::collections::HashMap;
use std::fmt;

/// Renders a module to its canonical text
pub fn print_module(ctx: &Context, module: Module) -> String {
    ModulePrinter::new(ctx).print(module)
}

/// Renders a type, using aliases where defined
pub fn type_to_string(ctx: &Context, ty: Type) -> String {
    let mut out = String::new();
    write_type(ctx, &mut out, ty, true);
    out
}

/// Renders an attribute
pub fn attribute_to_string(ctx: &Context, attr: &Attribute) -> String {
    let mut out = String::new();
    write_attribute(ctx, &mut out, attr);
    out
}

/// `Display` adapter returned by [`Module::display`]
pub struct ModuleDisplay<'a> {
    ctx: &'a Context,
    module: Module,
}

impl fmt::Display for ModuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_module(self.ctx, self.module))
    }
}

impl Module {
    pub fn display<'a>(&self, ctx: &'a Context) -> ModuleDisplay<'a> {
        ModuleDisplay { ctx, module: *self }
    }
}

fn write_type(ctx: &Context, out: &mut String, ty: Type, use_alias: bool) {
    if use_alias {
        if let Some(alias) = ctx.alias_of(ty) {
            out.push('!');
            out.push_str(alias);
            return;
        }
    }

    match ctx.type_kind(ty) {
        TypeKind::Integer(width) => out.push_str(&format!("i{}", width)),
        TypeKind::Float(kind) => out.push_str(kind.as_str()),
        TypeKind::Index => out.push_str("index"),
        TypeKind::Tensor { shape, element } => {
            out.push_str("tensor<");
            for dim in shape {
                match dim {
                    Some(size) => out.push_str(&size.to_string()),
                    None => out.push('?'),
                }
                out.push('x');
            }
            write_type(ctx, out, *element, true);
            out.push('>');
        }
        TypeKind::Function { inputs, results } => write_function_type(ctx, out, inputs, results),
        TypeKind::IfrtArray {
            shape,
            sharding,
            devices,
            memory_kind,
        } => {
            out.push_str("!ifrt.array<");
            write_type(ctx, out, *shape, true);
            out.push_str(&format!(", #ifrt.sharding_param<{}>, ", sharding));
            write_integer_list(out, devices);
            if let Some(kind) = memory_kind {
                out.push_str(", memory_kind = ");
                write_string(out, kind);
            }
            out.push('>');
        }
        TypeKind::IfrtControl => out.push_str("!ifrt.control"),
        TypeKind::Opaque { dialect, name, body } => {
            out.push_str(&format!("!{}.{}", dialect, name));
            if let Some(body) = body {
                out.push_str(&format!("<{}>", body));
            }
        }
    }
}

fn write_type_list(ctx: &Context, out: &mut String, types: &[Type]) {
    for (i, &ty) in types.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_type(ctx, out, ty, true);
    }
}

/// `(A, B) -> C`; multiple or function-typed results are parenthesized
fn write_function_type(ctx: &Context, out: &mut String, inputs: &[Type], results: &[Type]) {
    out.push('(');
    write_type_list(ctx, out, inputs);
    out.push_str(") -> ");
    write_result_types(ctx, out, results);
}

fn write_result_types(ctx: &Context, out: &mut String, results: &[Type]) {
    match results {
        [single] if !matches!(ctx.type_kind(*single), TypeKind::Function { .. }) => {
            write_type(ctx, out, *single, true)
        }
        _ => {
            out.push('(');
            write_type_list(ctx, out, results);
            out.push(')');
        }
    }
}

fn write_integer_list(out: &mut String, values: &[i64]) {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    out.push_str(&format!("[{}]", items.join(", ")));
}

fn write_string(out: &mut String, value: &str) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}

/// Typed attributes print a ` : type` suffix
fn has_type_suffix(attr: &Attribute) -> bool {
    matches!(
        attr,
        Attribute::Integer { ty: Some(_), .. }
            | Attribute::Float { ty: Some(_), .. }
            | Attribute::DenseElements { ty: Some(_), .. }
    )
}

fn write_type_suffix(ctx: &Context, out: &mut String, ty: &Option<Type>) {
    if let Some(ty) = ty {
        out.push_str(" : ");
        write_type(ctx, out, *ty, true);
    }
}

fn write_attribute(ctx: &Context, out: &mut String, attr: &Attribute) {
    match attr {
        Attribute::Unit => out.push_str("unit"),
        Attribute::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
        Attribute::Integer { value, ty } => {
            out.push_str(&value.to_string());
            write_type_suffix(ctx, out, ty);
        }
        Attribute::Float { literal, ty } => {
            out.push_str(literal);
            write_type_suffix(ctx, out, ty);
        }
        Attribute::String(value) => write_string(out, value),
        Attribute::Type(ty) => write_type(ctx, out, *ty, true),
        Attribute::SymbolRef(sym) => out.push_str(&sym.to_string()),
        Attribute::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_attribute(ctx, out, item);
            }
            out.push(']');
        }
        Attribute::DenseElements { literal, ty } => {
            out.push_str(&format!("dense<{}>", literal));
            write_type_suffix(ctx, out, ty);
        }
        Attribute::Dictionary(entries) => write_dictionary(ctx, out, entries, &[]),
        Attribute::ShardingParam(sharding) => {
            out.push_str(&format!("#ifrt.sharding_param<{}>", sharding))
        }
        Attribute::Opaque { dialect, name, body } => {
            out.push_str(&format!("#{}.{}", dialect, name));
            if let Some(body) = body {
                out.push_str(&format!("<{}>", body));
            }
        }
    }
}

/// `{a = 1, flag}`, skipping the names in `elided`
fn write_dictionary(ctx: &Context, out: &mut String, entries: &AttributeMap, elided: &[&str]) {
    out.push('{');
    let visible = entries.iter().filter(|(name, _)| !elided.contains(&name.as_str()));
    for (i, (name, value)) in visible.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if is_bare_identifier(name) {
            out.push_str(name);
        } else {
            write_string(out, name);
        }
        if *value != Attribute::Unit {
            out.push_str(" = ");
            write_attribute(ctx, out, value);
        }
    }
    out.push('}');
}

fn has_visible_attributes(entries: &AttributeMap, elided: &[&str]) -> bool {
    entries.keys().any(|name| !elided.contains(&name.as_str()))
}

/// Per isolated-region counters for SSA names
#[derive(Debug, Default)]
struct NameScope {
    values: usize,
    args: usize,
    controls: usize,
}

/// Stateful printer for one module
pub struct ModulePrinter<'a> {
    ctx: &'a Context,
    out: String,
    indent: usize,
    names: HashMap<Value, String>,
    scopes: Vec<NameScope>,
}

impl<'a> ModulePrinter<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            out: String::new(),
            indent: 0,
            names: HashMap::new(),
            scopes: vec![NameScope::default()],
        }
    }

    /// Prints type aliases followed by the module operation
    pub fn print(mut self, module: Module) -> String {
        let ctx = self.ctx;
        for (alias, ty) in ctx.type_aliases() {
            self.out.push_str(&format!("!{} = ", alias));
            write_type(ctx, &mut self.out, *ty, false);
            self.out.push('\n');
        }
        self.print_op(module.operation());
        self.out
    }

    fn scope(&mut self) -> &mut NameScope {
        self.scopes
            .last_mut()
            .expect("printer always keeps the outermost name scope")
    }

    fn name_argument(&mut self, value: Value) -> String {
        let scope = self.scope();
        let name = format!("%arg{}", scope.args);
        scope.args += 1;
        self.names.insert(value, name.clone());
        name
    }

    fn name_result(&mut self, value: Value) -> String {
        let is_control = matches!(
            self.ctx.type_kind(self.ctx.value_type(value)),
            TypeKind::IfrtControl
        );
        let scope = self.scope();
        let name = if is_control {
            scope.controls += 1;
            format!("%ctrl_{}", scope.controls - 1)
        } else {
            scope.values += 1;
            format!("%{}", scope.values - 1)
        };
        self.names.insert(value, name.clone());
        name
    }

    fn value_name(&self, value: Value) -> &str {
        self.names
            .get(&value)
            .map(String::as_str)
            .unwrap_or("<<UNKNOWN SSA VALUE>>")
    }

    fn write_operands(&mut self, operands: &[Value]) {
        let names: Vec<&str> = operands.iter().map(|v| self.value_name(*v)).collect();
        let joined = names.join(", ");
        self.out.push_str(&joined);
    }

    fn write_types_of(&mut self, values: &[Value]) {
        let ctx = self.ctx;
        let types: Vec<Type> = values.iter().map(|v| ctx.value_type(*v)).collect();
        write_type_list(ctx, &mut self.out, &types);
    }

    fn write_signature_of(&mut self, operands: &[Value], results: &[Value]) {
        let ctx = self.ctx;
        let inputs: Vec<Type> = operands.iter().map(|v| ctx.value_type(*v)).collect();
        let outputs: Vec<Type> = results.iter().map(|v| ctx.value_type(*v)).collect();
        write_function_type(ctx, &mut self.out, &inputs, &outputs);
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn print_op(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);
        self.write_indent();

        if !data.results.is_empty() {
            let names: Vec<String> = data.results.iter().map(|v| self.name_result(*v)).collect();
            self.out.push_str(&names.join(", "));
            self.out.push_str(" = ");
        }

        match data.name.as_str() {
            "builtin.module" => self.print_module_op(op),
            "func.func" => self.print_func(op),
            "func.return" => self.print_return(op),
            "func.call" => self.print_call(op),
            "ifrt.Call" => self.print_ifrt_call(op),
            name if data.regions.is_empty() && ctx.dialects().lookup_op(name) == Lookup::Registered => {
                self.print_custom(op)
            }
            _ => self.print_generic(op),
        }
        self.out.push('\n');
    }

    /// Prints `{`, the ops of the region's entry block and `}`
    fn print_region_body(&mut self, region: RegionId) {
        let ctx = self.ctx;
        self.out.push_str("{\n");
        self.indent += 1;
        for &block in &ctx.region(region).blocks {
            for &nested in &ctx.block(block).operations {
                self.print_op(nested);
            }
        }
        self.indent -= 1;
        self.write_indent();
        self.out.push('}');
    }

    fn print_module_op(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);
        self.out.push_str("module");
        if let Some(name) = data.symbol_name() {
            self.out.push_str(&format!(" @{}", name));
        }
        let elided = ["sym_name"];
        if has_visible_attributes(&data.attributes, &elided) {
            self.out.push_str(" attributes ");
            write_dictionary(ctx, &mut self.out, &data.attributes, &elided);
        }
        self.out.push(' ');

        self.scopes.push(NameScope::default());
        match data.regions.first() {
            Some(&region) => self.print_region_body(region),
            None => self.out.push_str("{\n}"),
        }
        self.scopes.pop();
    }

    fn print_func(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);
        self.out.push_str("func.func ");
        if let Some(visibility) = data.attribute("sym_visibility").and_then(Attribute::as_str) {
            self.out.push_str(visibility);
            self.out.push(' ');
        }
        self.out.push_str(&format!("@{}(", data.symbol_name().unwrap_or("")));

        let (inputs, results) = match data
            .attribute("function_type")
            .and_then(Attribute::as_type)
            .map(|ty| ctx.type_kind(ty))
        {
            Some(TypeKind::Function { inputs, results }) => (inputs.clone(), results.clone()),
            _ => (Vec::new(), Vec::new()),
        };

        self.scopes.push(NameScope::default());
        match ctx.entry_block(op) {
            Some(entry) => {
                for (i, &arg) in ctx.block(entry).arguments.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    let name = self.name_argument(arg);
                    self.out.push_str(&format!("{}: ", name));
                    write_type(ctx, &mut self.out, ctx.value_type(arg), true);
                }
            }
            None => write_type_list(ctx, &mut self.out, &inputs),
        }
        self.out.push(')');

        if !results.is_empty() {
            self.out.push_str(" -> ");
            write_result_types(ctx, &mut self.out, &results);
        }

        let elided = ["sym_name", "function_type", "sym_visibility"];
        if has_visible_attributes(&data.attributes, &elided) {
            self.out.push_str(" attributes ");
            write_dictionary(ctx, &mut self.out, &data.attributes, &elided);
        }

        if let Some(&region) = data.regions.first() {
            self.out.push(' ');
            self.print_region_body(region);
        }
        self.scopes.pop();
    }

    fn print_return(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);
        self.out.push_str("return");
        if !data.operands.is_empty() {
            self.out.push(' ');
            self.write_operands(&data.operands);
            self.out.push_str(" : ");
            self.write_types_of(&data.operands);
        }
    }

    fn print_call(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);
        let callee = data
            .attribute("callee")
            .and_then(Attribute::as_symbol_ref)
            .map(|sym| sym.to_string())
            .unwrap_or_default();
        self.out.push_str(&format!("call {}(", callee));
        self.write_operands(&data.operands);
        self.out.push(')');
        let elided = ["callee"];
        if has_visible_attributes(&data.attributes, &elided) {
            self.out.push(' ');
            write_dictionary(ctx, &mut self.out, &data.attributes, &elided);
        }
        self.out.push_str(" : ");
        self.write_signature_of(&data.operands, &data.results);
    }

    fn print_ifrt_call(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);
        let is_control = |v: &&Value| matches!(ctx.type_kind(ctx.value_type(**v)), TypeKind::IfrtControl);
        let inputs: Vec<Value> = data.operands.iter().filter(|v| !is_control(v)).copied().collect();
        let controls: Vec<Value> = data.operands.iter().filter(|v| is_control(v)).copied().collect();
        let outputs: Vec<Value> = data.results.iter().filter(|v| !is_control(v)).copied().collect();

        let callee = data
            .attribute("callee")
            .and_then(Attribute::as_symbol_ref)
            .map(|sym| sym.to_string())
            .unwrap_or_default();
        self.out.push_str(&format!("ifrt.Call {}(", callee));
        self.write_operands(&inputs);
        self.out.push(')');
        if !controls.is_empty() {
            self.out.push_str(" after ");
            self.write_operands(&controls);
        }
        self.out.push_str(" on devices ");
        let devices = data
            .attribute("devices")
            .and_then(Attribute::as_integer_array)
            .unwrap_or_default();
        write_integer_list(&mut self.out, &devices);

        let elided = ["callee", "devices"];
        if has_visible_attributes(&data.attributes, &elided) {
            self.out.push_str(" attributes ");
            write_dictionary(ctx, &mut self.out, &data.attributes, &elided);
        }
        self.out.push_str(" : ");
        self.write_signature_of(&inputs, &outputs);
    }

    /// `dialect.op %a, %b[, positional] [{dict}] : type`
    fn print_custom(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);
        self.out.push_str(&data.name);

        let positional = data.attribute("value").filter(|attr| !has_type_suffix(attr));
        if !data.operands.is_empty() || positional.is_some() {
            self.out.push(' ');
        }
        self.write_operands(&data.operands);
        if let Some(attr) = positional {
            if !data.operands.is_empty() {
                self.out.push_str(", ");
            }
            write_attribute(ctx, &mut self.out, attr);
        }

        let elided: &[&str] = if positional.is_some() { &["value"] } else { &[] };
        if has_visible_attributes(&data.attributes, elided) {
            self.out.push(' ');
            write_dictionary(ctx, &mut self.out, &data.attributes, elided);
        }

        self.out.push_str(" : ");
        let result_ty = match data.results.as_slice() {
            [single] => Some(ctx.value_type(*single)),
            _ => None,
        };
        let uniform = result_ty.filter(|&ty| data.operands.iter().all(|v| ctx.value_type(*v) == ty));
        match uniform {
            Some(ty) => write_type(ctx, &mut self.out, ty, true),
            None => self.write_signature_of(&data.operands, &data.results),
        }
    }

    /// `"dialect.op"(%a) ({...}) {dict} : (T) -> T`
    fn print_generic(&mut self, op: OpId) {
        let ctx = self.ctx;
        let data = ctx.op(op);
        write_string(&mut self.out, &data.name);
        self.out.push('(');
        self.write_operands(&data.operands);
        self.out.push(')');

        if !data.regions.is_empty() {
            self.out.push_str(" (");
            for (i, &region) in data.regions.iter().enumerate() {
                if i > 0 {
                    self.out.push_str(", ");
                }
                self.print_region_body(region);
            }
            self.out.push(')');
        }

        if !data.attributes.is_empty() {
            self.out.push(' ');
            write_dictionary(ctx, &mut self.out, &data.attributes, &[]);
        }
        self.out.push_str(" : ");
        self.write_signature_of(&data.operands, &data.results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OperationState;
    use crate::types::{FloatKind, ShardingParam};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_print_types() {
        let mut ctx = Context::new();
        let i32_ty = ctx.integer_type(32);
        let f32_ty = ctx.intern_type(TypeKind::Float(FloatKind::F32));
        let tensor = ctx.tensor_type(vec![Some(2), None], f32_ty);
        let scalar = ctx.tensor_type(vec![], i32_ty);
        let fn_ty = ctx.function_type(vec![tensor, scalar], vec![tensor]);
        let multi = ctx.function_type(vec![], vec![i32_ty, i32_ty]);

        assert_eq!(type_to_string(&ctx, tensor), "tensor<2x?xf32>");
        assert_eq!(type_to_string(&ctx, scalar), "tensor<i32>");
        assert_eq!(type_to_string(&ctx, fn_ty), "(tensor<2x?xf32>, tensor<i32>) -> tensor<2x?xf32>");
        assert_eq!(type_to_string(&ctx, multi), "() -> (i32, i32)");
    }

    #[test]
    fn test_print_ifrt_array_with_alias() {
        let mut ctx = Context::new();
        let i32_ty = ctx.integer_type(32);
        let tensor = ctx.tensor_type(vec![Some(2)], i32_ty);
        let array = ctx.intern_type(TypeKind::IfrtArray {
            shape: tensor,
            sharding: ShardingParam::new(vec![1], vec![0], vec![1]),
            devices: vec![0],
            memory_kind: None,
        });
        assert_eq!(
            type_to_string(&ctx, array),
            "!ifrt.array<tensor<2xi32>, #ifrt.sharding_param<1 to [0] on 1>, [0]>"
        );

        ctx.define_type_alias("array", array).unwrap();
        assert_eq!(type_to_string(&ctx, array), "!array");
    }

    #[test]
    fn test_print_attributes() {
        let ctx = Context::new();
        let mut entries = AttributeMap::new();
        entries.insert("ifrt.function".into(), Attribute::Unit);
        entries.insert("name".into(), Attribute::string("a\"b"));
        entries.insert("odd key".into(), Attribute::Bool(true));
        let dict = Attribute::Dictionary(entries);
        assert_eq!(
            attribute_to_string(&ctx, &dict),
            "{ifrt.function, name = \"a\\\"b\", \"odd key\" = true}"
        );
    }

    #[test]
    fn test_print_module_renumbers_values() {
        let mut ctx = Context::new();
        let module = Module::create(&mut ctx, None);
        let i32_ty = ctx.integer_type(32);
        let tensor = ctx.tensor_type(vec![Some(2)], i32_ty);

        let body = ctx.create_region();
        let entry = ctx.append_block(body, &[tensor]);
        let arg = ctx.block(entry).arguments[0];
        let constant = ctx.create_operation(
            OperationState::new("mhlo.constant")
                .with_attribute(
                    "value",
                    Attribute::DenseElements {
                        literal: "1".into(),
                        ty: None,
                    },
                )
                .with_results([tensor]),
        );
        ctx.append_operation(entry, constant);
        let one = ctx.op(constant).results[0];
        let add = ctx.create_operation(
            OperationState::new("mhlo.add")
                .with_operands([arg, one])
                .with_results([tensor]),
        );
        ctx.append_operation(entry, add);
        let sum = ctx.op(add).results[0];
        let ret = ctx.create_operation(OperationState::new("func.return").with_operands([sum]));
        ctx.append_operation(entry, ret);

        let fn_ty = ctx.function_type(vec![tensor], vec![tensor]);
        let func = ctx.create_operation(
            OperationState::new("func.func")
                .with_attribute("sym_name", Attribute::string("main"))
                .with_attribute("function_type", Attribute::Type(fn_ty))
                .with_region(body),
        );
        let module_body = module.body(&ctx);
        ctx.append_operation(module_body, func);

        let expected = "\
module {
  func.func @main(%arg0: tensor<2xi32>) -> tensor<2xi32> {
    %0 = mhlo.constant dense<1> : tensor<2xi32>
    %1 = mhlo.add %arg0, %0 : tensor<2xi32>
    return %1 : tensor<2xi32>
  }
}
";
        assert_eq!(print_module(&ctx, module), expected);
        assert_eq!(module.display(&ctx).to_string(), expected);
    }
}
