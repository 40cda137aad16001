//! Parser for IFRT IR text
//!
//! Recursive descent over the token stream. Operations are built directly
//! into the `Context`; there is no intermediate syntax tree. Like MLIR,
//! parsing stops at the first error.

use ifrt_error::{Diagnostic, Diagnostics, ErrorCode, Span};
use ifrt_ir::{
    type_to_string, Attribute, AttributeMap, BlockId, Context, DialectRegistry, FloatKind, Lookup,
    Module, OpId, OperationState, ShardingParam, SymbolRef, Type, TypeKind, Value,
};
use ifrt_lexer::{Lexer, Token, TokenKind};
use std::collections::HashMap;

/// Deepest nesting of regions, attribute containers and function types.
/// Keeps hostile payloads from exhausting the stack.
pub const MAX_NESTING: usize = 128;

/// SSA names defined in one region
#[derive(Debug, Default)]
struct ValueScope {
    values: HashMap<String, Value>,
    /// Names of enclosing scopes are not visible from here
    isolated: bool,
}

/// A `%name` occurrence
#[derive(Debug, Clone)]
struct ValueRef {
    name: String,
    span: Span,
}

/// Parser for one IR module string
pub struct Parser<'src, 'ctx> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'ctx mut Context,
    scopes: Vec<ValueScope>,
    /// Current nesting level, bounded by `MAX_NESTING`
    depth: usize,
    diagnostics: Diagnostics,
}

impl<'src, 'ctx> Parser<'src, 'ctx> {
    /// `tokens` must come from lexing `source` and end with `Eof`
    pub fn new(source: &'src str, tokens: Vec<Token>, ctx: &'ctx mut Context) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            ctx,
            scopes: Vec::new(),
            depth: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Consumes and returns the diagnostics
    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    // =========================================
    // Helpers
    // =========================================

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream always ends with Eof"))
    }

    fn peek_next(&self) -> &Token {
        self.tokens
            .get(self.pos + 1)
            .unwrap_or_else(|| self.tokens.last().expect("token stream always ends with Eof"))
    }

    /// Checks the kind of the current token, ignoring its payload
    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().kind.is_keyword(keyword)
    }

    fn check_value_id(&self) -> bool {
        matches!(self.peek().kind, TokenKind::ValueId(_))
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Requires a token of the given kind and returns its span
    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<Span, ()> {
        if self.check(kind) {
            Ok(self.advance().span)
        } else {
            self.error_at_current(message)
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Span, ()> {
        if self.check_keyword(keyword) {
            Ok(self.advance().span)
        } else {
            self.error_at_current(format!("expected `{}`", keyword))
        }
    }

    fn expect_symbol(&mut self) -> Result<String, ()> {
        if let TokenKind::SymbolRef(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            return Ok(name);
        }
        self.error_at_current("expected symbol name like `@main`")
    }

    fn expect_string(&mut self) -> Result<String, ()> {
        if let TokenKind::Str(value) = &self.peek().kind {
            let value = value.clone();
            self.advance();
            return Ok(value);
        }
        self.error_at_current("expected string literal")
    }

    fn expect_value_ref(&mut self) -> Result<ValueRef, ()> {
        if let TokenKind::ValueId(name) = &self.peek().kind {
            let name = name.clone();
            let span = self.advance().span;
            return Ok(ValueRef { name, span });
        }
        self.error_at_current("expected SSA value name like `%0`")
    }

    /// Integer, optionally negated
    fn expect_integer(&mut self) -> Result<i64, ()> {
        let start = self.peek().span;
        let negative = self.match_token(&TokenKind::Minus);
        if let TokenKind::Int(magnitude) = self.peek().kind {
            self.advance();
            return self.signed_integer(negative, magnitude, start);
        }
        self.error_at_current("expected integer")
    }

    /// Applies the sign; `-9223372036854775808` is the one magnitude past `i64::MAX`
    fn signed_integer(&mut self, negative: bool, magnitude: u64, start: Span) -> Result<i64, ()> {
        let value = if negative {
            -i128::from(magnitude)
        } else {
            i128::from(magnitude)
        };
        match i64::try_from(value) {
            Ok(value) => Ok(value),
            Err(_) => {
                let span = self.span_from(start);
                self.error_at(
                    span,
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("integer `{}` is out of range", value),
                    "must fit in a signed 64-bit integer",
                )
            }
        }
    }

    /// Span from `start` to the end of the last consumed token
    fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous().span)
    }

    fn fail<T>(&mut self, diagnostic: Diagnostic) -> Result<T, ()> {
        self.diagnostics.push(diagnostic);
        Err(())
    }

    fn error_at<T>(
        &mut self,
        span: Span,
        code: ErrorCode,
        message: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<T, ()> {
        self.fail(Diagnostic::error(message).with_code(code).with_label(span, label))
    }

    /// Reports an unexpected token at the current position
    fn error_at_current<T>(&mut self, message: impl Into<String>) -> Result<T, ()> {
        let token = self.peek();
        let diagnostic = Diagnostic::error(message)
            .with_code(ErrorCode::UNEXPECTED_TOKEN)
            .with_label(token.span, format!("found: {}", token.kind));
        self.fail(diagnostic)
    }

    /// Runs `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ()>) -> Result<T, ()> {
        if self.depth >= MAX_NESTING {
            let span = self.peek().span;
            return self.error_at(
                span,
                ErrorCode::NESTING_TOO_DEEP,
                format!("nesting exceeds the limit of {} levels", MAX_NESTING),
                "nested too deeply",
            );
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn type_str(&self, ty: Type) -> String {
        type_to_string(self.ctx, ty)
    }

    // =========================================
    // SSA scopes
    // =========================================

    fn push_scope(&mut self, isolated: bool) {
        self.scopes.push(ValueScope {
            values: HashMap::new(),
            isolated,
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup_value(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(&value) = scope.values.get(name) {
                return Some(value);
            }
            if scope.isolated {
                break;
            }
        }
        None
    }

    fn define_value(&mut self, name: &ValueRef, value: Value) -> Result<(), ()> {
        if self.lookup_value(&name.name).is_some() {
            return self.error_at(
                name.span,
                ErrorCode::REDEFINED_VALUE,
                format!("redefinition of SSA value `%{}`", name.name),
                "already defined in this region",
            );
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.values.insert(name.name.clone(), value);
        }
        Ok(())
    }

    /// Resolves a use of `value`, which must have type `ty`
    fn resolve_operand(&mut self, value: &ValueRef, ty: Type) -> Result<Value, ()> {
        let Some(resolved) = self.lookup_value(&value.name) else {
            return self.error_at(
                value.span,
                ErrorCode::UNDEFINED_VALUE,
                format!("use of undeclared SSA value name `%{}`", value.name),
                "not defined in this region",
            );
        };
        let actual = self.ctx.value_type(resolved);
        if actual != ty {
            let message = format!(
                "use of value `%{}` expects different type than prior uses: `{}` vs `{}`",
                value.name,
                self.type_str(ty),
                self.type_str(actual)
            );
            return self.error_at(value.span, ErrorCode::USE_TYPE_MISMATCH, message, "used here");
        }
        Ok(resolved)
    }

    fn resolve_operands(&mut self, values: &[ValueRef], types: &[Type]) -> Result<Vec<Value>, ()> {
        if values.len() != types.len() {
            let span = match (values.first(), values.last()) {
                (Some(first), Some(last)) => first.span.merge(last.span),
                _ => self.previous().span,
            };
            return self.error_at(
                span,
                ErrorCode::USE_TYPE_MISMATCH,
                format!("{} operands present, but expected {}", values.len(), types.len()),
                "operands",
            );
        }
        values
            .iter()
            .zip(types)
            .map(|(value, &ty)| self.resolve_operand(value, ty))
            .collect()
    }

    // =========================================
    // Top level
    // =========================================

    /// Parses type aliases and operations until the end of input.
    ///
    /// A single top-level `module` is the result; any other list of
    /// operations is wrapped in an implicit module.
    pub fn parse(&mut self) -> Result<Module, ()> {
        let region = self.ctx.create_region();
        let block = self.ctx.append_block(region, &[]);
        self.push_scope(true);

        while !self.is_at_end() {
            if matches!(self.peek().kind, TokenKind::BangIdent(_))
                && self.peek_next().kind == TokenKind::Equal
            {
                self.parse_type_alias()?;
            } else {
                self.parse_operation(block)?;
            }
        }
        self.pop_scope();

        let ops = self.ctx.block(block).operations.clone();
        if let [op] = ops.as_slice() {
            if let Some(module) = Module::from_op(self.ctx, *op) {
                self.ctx.op_mut(*op).parent = None;
                return Ok(module);
            }
        }

        let op = self
            .ctx
            .create_operation(OperationState::new("builtin.module").with_region(region));
        match Module::from_op(self.ctx, op) {
            Some(module) => Ok(module),
            None => self.error_at_current("expected a module"),
        }
    }

    /// `!name = type`
    fn parse_type_alias(&mut self) -> Result<(), ()> {
        let start = self.peek().span;
        let name = match &self.peek().kind {
            TokenKind::BangIdent(name) => name.clone(),
            _ => return self.error_at_current("expected type alias name"),
        };
        self.advance();
        if name.contains('.') {
            return self.error_at(
                start,
                ErrorCode::UNSUPPORTED_SYNTAX,
                format!("type alias `!{}` must not contain `.`", name),
                "dotted names are reserved for dialect types",
            );
        }
        self.expect(&TokenKind::Equal, "expected `=` in type alias definition")?;
        let ty = self.parse_type()?;

        if let Err(existing) = self.ctx.define_type_alias(name.clone(), ty) {
            let note = format!("previously defined as `{}`", self.type_str(existing));
            let diagnostic = Diagnostic::error(format!("redefinition of type alias `!{}`", name))
                .with_code(ErrorCode::REDEFINED_VALUE)
                .with_label(self.span_from(start), "redefined here")
                .with_note(note);
            return self.fail(diagnostic);
        }
        Ok(())
    }

    // =========================================
    // Operations
    // =========================================

    /// `[%r, ... =] op` appended to `block`
    fn parse_operation(&mut self, block: BlockId) -> Result<OpId, ()> {
        let start = self.peek().span;
        let mut results = Vec::new();
        if self.check_value_id() {
            loop {
                results.push(self.expect_value_ref()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::Equal, "expected `=` after operation results")?;
        }

        let name_span = self.peek().span;
        let state = match self.peek().kind.clone() {
            TokenKind::Str(name) => {
                self.advance();
                self.parse_generic_op(name, name_span)?
            }
            TokenKind::BareIdent(name) => {
                self.advance();
                self.parse_named_op(&name, name_span, results.len())?
            }
            TokenKind::CaretIdent(label) => {
                return self.error_at(
                    name_span,
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    format!("block label `^{}` is not supported", label),
                    "regions hold a single unlabeled block",
                );
            }
            _ => return self.error_at_current("expected operation name"),
        };

        if state.result_types.len() != results.len() {
            let message = format!(
                "operation `{}` defines {} results but {} names were bound",
                state.name,
                state.result_types.len(),
                results.len()
            );
            return self.error_at(self.span_from(start), ErrorCode::RESULT_COUNT, message, "here");
        }

        let op = self.ctx.create_operation(state.at(self.span_from(start)));
        self.ctx.append_operation(block, op);
        let values = self.ctx.op(op).results.clone();
        for (name, value) in results.iter().zip(values) {
            self.define_value(name, value)?;
        }
        Ok(op)
    }

    /// Rejects operation names the context does not accept
    fn check_op_name(&mut self, name: &str, span: Span, generic: bool) -> Result<(), ()> {
        let dialect = name.split_once('.').map_or("", |(dialect, _)| dialect);
        match self.ctx.dialects().lookup_op(name) {
            Lookup::Registered => Ok(()),
            Lookup::Unregistered if generic => Ok(()),
            Lookup::Unregistered => self.error_at(
                span,
                ErrorCode::UNSUPPORTED_SYNTAX,
                format!("operation `{}` of an unregistered dialect must use the generic form", name),
                "custom syntax is unknown",
            ),
            Lookup::UnknownInDialect => self.error_at(
                span,
                ErrorCode::UNKNOWN_OPERATION,
                format!("custom op '{}' is unknown", name),
                format!("dialect `{}` has no such operation", dialect),
            ),
            Lookup::Rejected => {
                let diagnostic = Diagnostic::error(format!("dialect `{}` is not registered", dialect))
                    .with_code(ErrorCode::UNREGISTERED_DIALECT)
                    .with_label(span, format!("operation `{}`", name))
                    .with_help("enable `allow_unregistered_dialects` to accept unknown dialects");
                self.fail(diagnostic)
            }
        }
    }

    fn parse_named_op(
        &mut self,
        name: &str,
        span: Span,
        num_results: usize,
    ) -> Result<OperationState, ()> {
        let Some(full_name) = DialectRegistry::canonical_op_name(name) else {
            return self.error_at(
                span,
                ErrorCode::UNKNOWN_OPERATION,
                format!("custom op '{}' is unknown", name),
                "expected `dialect.operation`",
            );
        };
        match full_name.as_str() {
            "builtin.module" => self.parse_module_op(),
            "func.func" => self.parse_func(),
            "func.return" => self.parse_return(),
            "func.call" => self.parse_call(),
            "ifrt.Call" => self.parse_ifrt_call(),
            _ => {
                self.check_op_name(&full_name, span, false)?;
                self.parse_custom(full_name, num_results)
            }
        }
    }

    /// `{ ops }` into `block`
    fn parse_region_body(&mut self, block: BlockId) -> Result<(), ()> {
        self.nested(|parser| {
            parser.expect(&TokenKind::LBrace, "expected `{` to begin a region")?;
            while !parser.check(&TokenKind::RBrace) && !parser.is_at_end() {
                parser.parse_operation(block)?;
            }
            parser.expect(&TokenKind::RBrace, "expected `}` to close the region")?;
            Ok(())
        })
    }

    /// `module [@name] [attributes {dict}] { ops }`
    fn parse_module_op(&mut self) -> Result<OperationState, ()> {
        let mut state = OperationState::new("builtin.module");
        if let TokenKind::SymbolRef(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            state = state.with_attribute("sym_name", Attribute::string(name));
        }
        if self.match_keyword("attributes") {
            let attributes = self.parse_attribute_dict()?;
            state.attributes.extend(attributes);
        }

        let region = self.ctx.create_region();
        let block = self.ctx.append_block(region, &[]);
        self.push_scope(true);
        let body = self.parse_region_body(block);
        self.pop_scope();
        body?;
        Ok(state.with_region(region))
    }

    /// `func.func [visibility] @name(%a: T, ...) [-> results] [attributes {dict}] [{ body }]`
    ///
    /// A declaration lists bare argument types and has no body.
    fn parse_func(&mut self) -> Result<OperationState, ()> {
        let mut state = OperationState::new("func.func");
        let visibility = self
            .peek()
            .kind
            .as_ident()
            .filter(|word| matches!(*word, "private" | "public" | "nested"))
            .map(str::to_string);
        if let Some(visibility) = visibility {
            self.advance();
            state = state.with_attribute("sym_visibility", Attribute::string(visibility));
        }
        let name = self.expect_symbol()?;
        state = state.with_attribute("sym_name", Attribute::string(name));

        let list_start = self.expect(&TokenKind::LParen, "expected `(` to begin the argument list")?;
        let mut args = Vec::new();
        let mut inputs = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                if self.check_value_id() {
                    args.push(self.expect_value_ref()?);
                    self.expect(&TokenKind::Colon, "expected `:` after argument name")?;
                }
                inputs.push(self.parse_type()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "expected `)` to close the argument list")?;
        if !args.is_empty() && args.len() != inputs.len() {
            return self.error_at(
                self.span_from(list_start),
                ErrorCode::UNSUPPORTED_SYNTAX,
                "function arguments must be either all named or all unnamed",
                "argument list",
            );
        }

        let results = if self.match_token(&TokenKind::Arrow) {
            self.parse_result_types()?
        } else {
            Vec::new()
        };
        let fn_ty = self.ctx.function_type(inputs.clone(), results);
        state = state.with_attribute("function_type", Attribute::Type(fn_ty));

        if self.match_keyword("attributes") {
            let attributes = self.parse_attribute_dict()?;
            state.attributes.extend(attributes);
        }

        if self.check(&TokenKind::LBrace) {
            if args.len() != inputs.len() {
                return self.error_at(
                    self.span_from(list_start),
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    "a function with a body must name its arguments",
                    "expected `%name: type` entries",
                );
            }
            let region = self.ctx.create_region();
            let block = self.ctx.append_block(region, &inputs);
            self.push_scope(true);
            let body = self
                .bind_block_arguments(&args, block)
                .and_then(|()| self.parse_region_body(block));
            self.pop_scope();
            body?;
            state = state.with_region(region);
        }
        Ok(state)
    }

    fn bind_block_arguments(&mut self, names: &[ValueRef], block: BlockId) -> Result<(), ()> {
        let values = self.ctx.block(block).arguments.clone();
        for (name, value) in names.iter().zip(values) {
            self.define_value(name, value)?;
        }
        Ok(())
    }

    /// `return [%v, ... : T, ...]`
    fn parse_return(&mut self) -> Result<OperationState, ()> {
        let state = OperationState::new("func.return");
        if !self.check_value_id() {
            return Ok(state);
        }
        let values = self.parse_value_ref_list()?;
        self.expect(&TokenKind::Colon, "expected `:` before the returned types")?;
        let mut types = vec![self.parse_type()?];
        while self.match_token(&TokenKind::Comma) {
            types.push(self.parse_type()?);
        }
        let operands = self.resolve_operands(&values, &types)?;
        Ok(state.with_operands(operands))
    }

    /// `call @sym(%a, ...) [{dict}] : (T...) -> (T...)`
    fn parse_call(&mut self) -> Result<OperationState, ()> {
        let callee = self.parse_symbol_ref()?;
        let values = self.parse_paren_value_refs()?;
        let mut state = OperationState::new("func.call");
        if self.check(&TokenKind::LBrace) {
            let attributes = self.parse_attribute_dict()?;
            state.attributes.extend(attributes);
        }
        self.expect(&TokenKind::Colon, "expected `:` before the call signature")?;
        let (inputs, results) = self.parse_function_signature()?;
        let operands = self.resolve_operands(&values, &inputs)?;
        Ok(state
            .with_attribute("callee", Attribute::SymbolRef(callee))
            .with_operands(operands)
            .with_results(results))
    }

    /// `ifrt.Call @sym(%a, ...) [after %c, ...] on devices [0, 1] [attributes {dict}] : (T...) -> (T...)`
    fn parse_ifrt_call(&mut self) -> Result<OperationState, ()> {
        let callee = self.parse_symbol_ref()?;
        let inputs = self.parse_paren_value_refs()?;
        let controls = if self.match_keyword("after") {
            self.parse_value_ref_list()?
        } else {
            Vec::new()
        };
        self.expect_keyword("on")?;
        self.expect_keyword("devices")?;
        let devices = self.parse_integer_list()?;

        let mut state = OperationState::new("ifrt.Call");
        self.match_keyword("attributes");
        if self.check(&TokenKind::LBrace) {
            let attributes = self.parse_attribute_dict()?;
            state.attributes.extend(attributes);
        }
        self.expect(&TokenKind::Colon, "expected `:` before the call signature")?;
        let (input_types, output_types) = self.parse_function_signature()?;

        let control = self.ctx.control_type();
        let mut operands = self.resolve_operands(&inputs, &input_types)?;
        operands.extend(self.resolve_operands(&controls, &vec![control; controls.len()])?);

        Ok(state
            .with_attribute("callee", Attribute::SymbolRef(callee))
            .with_attribute(
                "devices",
                Attribute::Array(devices.into_iter().map(Attribute::integer).collect()),
            )
            .with_operands(operands)
            .with_results(output_types)
            .with_results([control]))
    }

    /// `dialect.op [%a, ...][, attr] [{dict}] : T | (T...) -> (T...)`
    ///
    /// A single trailing type applies to every operand and result.
    fn parse_custom(&mut self, name: String, num_results: usize) -> Result<OperationState, ()> {
        let mut state = OperationState::new(name);
        let values = if self.check_value_id() {
            self.parse_value_ref_list()?
        } else {
            Vec::new()
        };
        let has_positional = if values.is_empty() {
            !self.check(&TokenKind::LBrace) && !self.check(&TokenKind::Colon)
        } else {
            self.match_token(&TokenKind::Comma)
        };
        if has_positional {
            let value = self.parse_attribute(false)?;
            state = state.with_attribute("value", value);
        }
        if self.check(&TokenKind::LBrace) {
            let attributes = self.parse_attribute_dict()?;
            state.attributes.extend(attributes);
        }

        self.expect(&TokenKind::Colon, "expected `:` before the operation type")?;
        let ty = self.parse_type()?;
        let (inputs, results) = match self.ctx.type_kind(ty) {
            TypeKind::Function { inputs, results } => (inputs.clone(), results.clone()),
            _ => (vec![ty; values.len()], vec![ty; num_results]),
        };
        let operands = self.resolve_operands(&values, &inputs)?;
        Ok(state.with_operands(operands).with_results(results))
    }

    /// `"dialect.op"(%a, ...) [({...}, ...)] [{dict}] : (T...) -> (T...)`
    fn parse_generic_op(&mut self, name: String, span: Span) -> Result<OperationState, ()> {
        self.check_op_name(&name, span, true)?;
        let values = self.parse_paren_value_refs()?;
        let mut state = OperationState::new(name);

        if self.match_token(&TokenKind::LParen) {
            loop {
                let region = self.ctx.create_region();
                let block = self.ctx.append_block(region, &[]);
                self.push_scope(false);
                let body = self.parse_region_body(block);
                self.pop_scope();
                body?;
                state = state.with_region(region);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "expected `)` after the regions")?;
        }
        if self.check(&TokenKind::LBrace) {
            let attributes = self.parse_attribute_dict()?;
            state.attributes.extend(attributes);
        }

        self.expect(&TokenKind::Colon, "expected `:` before the operation signature")?;
        let (inputs, results) = self.parse_function_signature()?;
        let operands = self.resolve_operands(&values, &inputs)?;
        Ok(state.with_operands(operands).with_results(results))
    }

    /// `%a, %b`; stops before a comma not followed by a value
    fn parse_value_ref_list(&mut self) -> Result<Vec<ValueRef>, ()> {
        let mut values = vec![self.expect_value_ref()?];
        while self.check(&TokenKind::Comma) && matches!(self.peek_next().kind, TokenKind::ValueId(_)) {
            self.advance();
            values.push(self.expect_value_ref()?);
        }
        Ok(values)
    }

    /// `(%a, %b)` or `()`
    fn parse_paren_value_refs(&mut self) -> Result<Vec<ValueRef>, ()> {
        self.expect(&TokenKind::LParen, "expected `(` before the operands")?;
        let values = if self.check(&TokenKind::RParen) {
            Vec::new()
        } else {
            self.parse_value_ref_list()?
        };
        self.expect(&TokenKind::RParen, "expected `)` after the operands")?;
        Ok(values)
    }

    /// `@a` or `@a::@b`
    fn parse_symbol_ref(&mut self) -> Result<SymbolRef, ()> {
        let mut symbol = SymbolRef::new(self.expect_symbol()?);
        while self.match_token(&TokenKind::ColonColon) {
            symbol = symbol.nested(self.expect_symbol()?);
        }
        Ok(symbol)
    }

    /// `[1, 2, 3]`
    fn parse_integer_list(&mut self) -> Result<Vec<i64>, ()> {
        self.expect(&TokenKind::LBracket, "expected `[`")?;
        let mut values = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                values.push(self.expect_integer()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket, "expected `]`")?;
        Ok(values)
    }

    // =========================================
    // Types
    // =========================================

    pub(crate) fn parse_type(&mut self) -> Result<Type, ()> {
        let span = self.peek().span;
        match self.peek().kind.clone() {
            TokenKind::LParen => self.nested(|parser| {
                let inputs = parser.parse_type_list()?;
                parser.expect(&TokenKind::Arrow, "expected `->` in function type")?;
                let results = parser.parse_result_types()?;
                Ok(parser.ctx.function_type(inputs, results))
            }),
            TokenKind::BareIdent(keyword) => {
                self.advance();
                self.parse_builtin_type(&keyword, span)
            }
            TokenKind::BangIdent(name) => {
                self.advance();
                self.parse_dialect_type(&name, span)
            }
            _ => {
                let token = self.peek();
                let diagnostic = Diagnostic::error("expected type")
                    .with_code(ErrorCode::EXPECTED_TYPE)
                    .with_label(token.span, format!("found: {}", token.kind));
                self.fail(diagnostic)
            }
        }
    }

    /// `(T, ...)`
    fn parse_type_list(&mut self) -> Result<Vec<Type>, ()> {
        self.expect(&TokenKind::LParen, "expected `(` to begin a type list")?;
        let mut types = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                types.push(self.parse_type()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "expected `)` to close the type list")?;
        Ok(types)
    }

    /// Results after `->`: `(T, ...)` or a single type
    fn parse_result_types(&mut self) -> Result<Vec<Type>, ()> {
        if self.check(&TokenKind::LParen) {
            self.parse_type_list()
        } else {
            Ok(vec![self.parse_type()?])
        }
    }

    fn parse_function_signature(&mut self) -> Result<(Vec<Type>, Vec<Type>), ()> {
        let span = self.peek().span;
        let ty = self.parse_type()?;
        match self.ctx.type_kind(ty) {
            TypeKind::Function { inputs, results } => Ok((inputs.clone(), results.clone())),
            _ => {
                let message = format!("expected a function type, found `{}`", self.type_str(ty));
                self.error_at(self.span_from(span), ErrorCode::EXPECTED_TYPE, message, "here")
            }
        }
    }

    fn parse_builtin_type(&mut self, keyword: &str, span: Span) -> Result<Type, ()> {
        if keyword == "index" {
            return Ok(self.ctx.intern_type(TypeKind::Index));
        }
        if keyword == "tensor" {
            return self.parse_tensor_type();
        }
        if let Some(kind) = FloatKind::from_keyword(keyword) {
            return Ok(self.ctx.intern_type(TypeKind::Float(kind)));
        }
        if let Some(width) = keyword.strip_prefix('i').and_then(|w| w.parse::<u32>().ok()) {
            return Ok(self.ctx.integer_type(width));
        }
        self.error_at(
            span,
            ErrorCode::EXPECTED_TYPE,
            format!("unknown type `{}`", keyword),
            "not a builtin type",
        )
    }

    /// `tensor<2x?xf32>`; the shape prefix arrives as one `Dims` token
    fn parse_tensor_type(&mut self) -> Result<Type, ()> {
        self.expect(&TokenKind::Less, "expected `<` after `tensor`")?;
        let shape = match &self.peek().kind {
            TokenKind::Dims(dims) => {
                let dims = dims.clone();
                self.advance();
                dims
            }
            _ => Vec::new(),
        };
        if self.check(&TokenKind::Star) {
            let span = self.peek().span;
            return self.error_at(
                span,
                ErrorCode::UNSUPPORTED_SYNTAX,
                "unranked tensors are not supported",
                "expected a ranked shape",
            );
        }
        let element = self.parse_type()?;
        self.expect(&TokenKind::Greater, "expected `>` to close the tensor type")?;
        Ok(self.ctx.tensor_type(shape, element))
    }

    /// `!alias`, `!ifrt.array<...>`, `!ifrt.control` or an opaque dialect type
    fn parse_dialect_type(&mut self, name: &str, span: Span) -> Result<Type, ()> {
        let Some((dialect, local)) = name.split_once('.') else {
            return match self.ctx.type_alias(name) {
                Some(ty) => Ok(ty),
                None => self.error_at(
                    span,
                    ErrorCode::UNDEFINED_ALIAS,
                    format!("undefined symbol alias id `!{}`", name),
                    "no `!name = type` definition precedes this use",
                ),
            };
        };
        match self.ctx.dialects().lookup_type(name) {
            Lookup::Registered if name == "ifrt.array" => self.parse_array_type(),
            Lookup::Registered if name == "ifrt.control" => Ok(self.ctx.control_type()),
            Lookup::Registered | Lookup::Unregistered => {
                let body = if self.check(&TokenKind::Less) {
                    Some(self.parse_raw_body()?)
                } else {
                    None
                };
                Ok(self.ctx.intern_type(TypeKind::Opaque {
                    dialect: dialect.to_string(),
                    name: local.to_string(),
                    body,
                }))
            }
            Lookup::UnknownInDialect => self.error_at(
                span,
                ErrorCode::EXPECTED_TYPE,
                format!("dialect `{}` has no type named `{}`", dialect, local),
                "unknown type",
            ),
            Lookup::Rejected => {
                let diagnostic = Diagnostic::error(format!("dialect `{}` is not registered", dialect))
                    .with_code(ErrorCode::UNREGISTERED_DIALECT)
                    .with_label(span, format!("type `!{}`", name))
                    .with_help("enable `allow_unregistered_dialects` to accept unknown dialects");
                self.fail(diagnostic)
            }
        }
    }

    /// `!ifrt.array<tensor<...>, #ifrt.sharding_param<...>, [devices][, memory_kind = "..."]>`
    fn parse_array_type(&mut self) -> Result<Type, ()> {
        self.expect(&TokenKind::Less, "expected `<` after `!ifrt.array`")?;
        let shape_start = self.peek().span;
        let shape = self.parse_type()?;
        if !self.ctx.type_kind(shape).is_tensor() {
            let message = format!("array shape must be a ranked tensor, found `{}`", self.type_str(shape));
            return self.error_at(self.span_from(shape_start), ErrorCode::EXPECTED_TYPE, message, "here");
        }
        self.expect(&TokenKind::Comma, "expected `,` after the array shape")?;

        let is_sharding = matches!(
            &self.peek().kind,
            TokenKind::HashIdent(name) if name == "ifrt.sharding_param"
        );
        if !is_sharding {
            return self.error_at_current("expected `#ifrt.sharding_param<...>`");
        }
        self.advance();
        let sharding = self.parse_sharding_param()?;
        self.expect(&TokenKind::Comma, "expected `,` after the sharding")?;
        let devices = self.parse_integer_list()?;

        let mut memory_kind = None;
        if self.match_token(&TokenKind::Comma) {
            self.expect_keyword("memory_kind")?;
            self.expect(&TokenKind::Equal, "expected `=` after `memory_kind`")?;
            memory_kind = Some(self.expect_string()?);
        }
        self.expect(&TokenKind::Greater, "expected `>` to close the array type")?;

        Ok(self.ctx.intern_type(TypeKind::IfrtArray {
            shape,
            sharding,
            devices,
            memory_kind,
        }))
    }

    /// `<2x1 to [1, 0] on 2x2>`
    fn parse_sharding_param(&mut self) -> Result<ShardingParam, ()> {
        self.expect(&TokenKind::Less, "expected `<` to begin the sharding")?;
        let dim_shards = if self.check_keyword("to") {
            Vec::new()
        } else {
            self.parse_x_list()?
        };
        self.expect_keyword("to")?;
        let permutation = self.parse_integer_list()?;
        self.expect_keyword("on")?;
        let axis_sizes = self.parse_x_list()?;
        self.expect(&TokenKind::Greater, "expected `>` to close the sharding")?;
        Ok(ShardingParam::new(dim_shards, permutation, axis_sizes))
    }

    /// `2x1x4` (one `Sizes` token) or a single integer
    fn parse_x_list(&mut self) -> Result<Vec<i64>, ()> {
        if let TokenKind::Sizes(sizes) = &self.peek().kind {
            let sizes = sizes.clone();
            self.advance();
            return Ok(sizes);
        }
        Ok(vec![self.expect_integer()?])
    }

    /// Text between balanced `<` and `>`, kept verbatim
    fn parse_raw_body(&mut self) -> Result<String, ()> {
        let open = self.expect(&TokenKind::Less, "expected `<`")?;
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Less => depth += 1,
                TokenKind::Greater if depth == 0 => break,
                TokenKind::Greater => depth -= 1,
                TokenKind::Eof => {
                    return self.error_at(
                        open,
                        ErrorCode::UNEXPECTED_TOKEN,
                        "unbalanced `<` in dialect body",
                        "opened here",
                    );
                }
                _ => {}
            }
            self.advance();
        }
        let close = self.advance().span;
        Ok(self.source[open.end.offset..close.start.offset].trim().to_string())
    }

    // =========================================
    // Attributes
    // =========================================

    /// Attribute value; `allow_type_suffix` accepts `1 : i32`
    fn parse_attribute(&mut self, allow_type_suffix: bool) -> Result<Attribute, ()> {
        self.nested(|parser| parser.parse_attribute_value(allow_type_suffix))
    }

    fn parse_attribute_value(&mut self, allow_type_suffix: bool) -> Result<Attribute, ()> {
        let span = self.peek().span;
        let attribute = match self.peek().kind.clone() {
            TokenKind::Minus | TokenKind::Int(_) | TokenKind::Float(_) => {
                return self.parse_number_attribute(allow_type_suffix);
            }
            TokenKind::Str(value) => {
                self.advance();
                Attribute::String(value)
            }
            TokenKind::SymbolRef(_) => Attribute::SymbolRef(self.parse_symbol_ref()?),
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_attribute(true)?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "expected `]` to close the array")?;
                Attribute::Array(items)
            }
            TokenKind::LBrace => Attribute::Dictionary(self.parse_attribute_dict()?),
            TokenKind::HashIdent(name) => {
                self.advance();
                self.parse_dialect_attribute(&name, span)?
            }
            TokenKind::BareIdent(word) => match word.as_str() {
                "unit" => {
                    self.advance();
                    Attribute::Unit
                }
                "true" | "false" => {
                    self.advance();
                    Attribute::Bool(word == "true")
                }
                "dense" => {
                    self.advance();
                    let literal = self.parse_raw_body()?;
                    let ty = self.parse_type_suffix(allow_type_suffix)?;
                    Attribute::DenseElements { literal, ty }
                }
                _ => Attribute::Type(self.parse_type()?),
            },
            TokenKind::BangIdent(_) | TokenKind::LParen => Attribute::Type(self.parse_type()?),
            _ => {
                let token = self.peek();
                let diagnostic = Diagnostic::error("expected attribute value")
                    .with_code(ErrorCode::EXPECTED_ATTRIBUTE)
                    .with_label(token.span, format!("found: {}", token.kind));
                return self.fail(diagnostic);
            }
        };
        Ok(attribute)
    }

    fn parse_number_attribute(&mut self, allow_type_suffix: bool) -> Result<Attribute, ()> {
        let start = self.peek().span;
        let negative = self.match_token(&TokenKind::Minus);
        match self.peek().kind.clone() {
            TokenKind::Int(magnitude) => {
                self.advance();
                let value = self.signed_integer(negative, magnitude, start)?;
                let ty = self.parse_type_suffix(allow_type_suffix)?;
                Ok(Attribute::Integer { value, ty })
            }
            TokenKind::Float(literal) => {
                self.advance();
                let ty = self.parse_type_suffix(allow_type_suffix)?;
                let literal = if negative { format!("-{}", literal) } else { literal };
                Ok(Attribute::Float { literal, ty })
            }
            _ => self.error_at_current("expected number"),
        }
    }

    fn parse_type_suffix(&mut self, allowed: bool) -> Result<Option<Type>, ()> {
        if allowed && self.match_token(&TokenKind::Colon) {
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    fn parse_dialect_attribute(&mut self, name: &str, span: Span) -> Result<Attribute, ()> {
        let Some((dialect, local)) = name.split_once('.') else {
            return self.error_at(
                span,
                ErrorCode::UNSUPPORTED_SYNTAX,
                format!("attribute alias `#{}` is not supported", name),
                "write the attribute inline",
            );
        };
        match self.ctx.dialects().lookup_attribute(name) {
            Lookup::Registered if name == "ifrt.sharding_param" => {
                Ok(Attribute::ShardingParam(self.parse_sharding_param()?))
            }
            Lookup::Registered | Lookup::Unregistered => {
                let body = if self.check(&TokenKind::Less) {
                    Some(self.parse_raw_body()?)
                } else {
                    None
                };
                Ok(Attribute::Opaque {
                    dialect: dialect.to_string(),
                    name: local.to_string(),
                    body,
                })
            }
            Lookup::UnknownInDialect => self.error_at(
                span,
                ErrorCode::EXPECTED_ATTRIBUTE,
                format!("dialect `{}` has no attribute named `{}`", dialect, local),
                "unknown attribute",
            ),
            Lookup::Rejected => {
                let diagnostic = Diagnostic::error(format!("dialect `{}` is not registered", dialect))
                    .with_code(ErrorCode::UNREGISTERED_DIALECT)
                    .with_label(span, format!("attribute `#{}`", name))
                    .with_help("enable `allow_unregistered_dialects` to accept unknown dialects");
                self.fail(diagnostic)
            }
        }
    }

    /// `{name = attr, flag, "quoted name" = attr}`
    fn parse_attribute_dict(&mut self) -> Result<AttributeMap, ()> {
        self.expect(&TokenKind::LBrace, "expected `{` to begin an attribute dictionary")?;
        let mut entries = AttributeMap::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = match self.peek().kind.clone() {
                    TokenKind::BareIdent(name) | TokenKind::Str(name) => {
                        self.advance();
                        name
                    }
                    _ => return self.error_at_current("expected attribute name"),
                };
                let value = if self.match_token(&TokenKind::Equal) {
                    self.parse_attribute(true)?
                } else {
                    Attribute::Unit
                };
                entries.insert(key, value);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace, "expected `}` to close the attribute dictionary")?;
        Ok(entries)
    }
}

/// Parses a module string into `ctx`, using buffer id 0 for spans
pub fn parse_module(source: &str, ctx: &mut Context) -> Result<Module, Diagnostics> {
    parse_module_in(source, 0, ctx)
}

/// Parses a module string registered as `file_id` in a `SourceCache`.
///
/// On error `ctx` may hold detached operations; callers discard it.
pub fn parse_module_in(source: &str, file_id: u32, ctx: &mut Context) -> Result<Module, Diagnostics> {
    let mut lexer = Lexer::new(source, file_id);
    let tokens = lexer.tokenize();
    let lex_diagnostics = lexer.take_diagnostics();
    if lex_diagnostics.has_errors() {
        return Err(lex_diagnostics);
    }

    let mut parser = Parser::new(source, tokens, ctx);
    match parser.parse() {
        Ok(module) => Ok(module),
        Err(()) => Err(parser.take_diagnostics()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifrt_ir::{print_module, verify, ContextConfig};
    use pretty_assertions::assert_eq;

    const ADD_ONE: &str = r#"
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

    const ADD_ONE_CANONICAL: &str = "\
!array = !ifrt.array<tensor<2xi32>, #ifrt.sharding_param<1 to [0] on 1>, [0]>
module {
  func.func @main(%arg0: !array) -> !array attributes {ifrt.function} {
    %0, %ctrl_0 = ifrt.Call @add_one::@main(%arg0) on devices [0] : (!array) -> !array
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
";

    fn parse_ok(source: &str) -> (Context, Module) {
        let mut ctx = Context::new();
        let module = match parse_module(source, &mut ctx) {
            Ok(module) => module,
            Err(diagnostics) => panic!("unexpected diagnostics: {:?}", diagnostics),
        };
        (ctx, module)
    }

    fn first_error(source: &str) -> ErrorCode {
        let mut ctx = Context::new();
        let diagnostics = parse_module(source, &mut ctx).expect_err("parse should fail");
        let code = diagnostics.iter().next().and_then(|d| d.code);
        code.expect("diagnostic has a code")
    }

    #[test]
    fn test_parse_and_print_canonical() {
        let (ctx, module) = parse_ok(ADD_ONE);
        assert_eq!(print_module(&ctx, module), ADD_ONE_CANONICAL);
        assert!(verify(&ctx, module).is_ok());
    }

    #[test]
    fn test_print_parse_print_is_stable() {
        let (ctx, module) = parse_ok(ADD_ONE);
        let printed = print_module(&ctx, module);
        let (reparsed_ctx, reparsed) = parse_ok(&printed);
        assert_eq!(print_module(&reparsed_ctx, reparsed), printed);
    }

    #[test]
    fn test_structure() {
        let (ctx, module) = parse_ok(ADD_ONE);
        let body = module.body(&ctx);
        let names: Vec<&str> = ctx
            .block(body)
            .operations
            .iter()
            .map(|&op| ctx.op(op).name.as_str())
            .collect();
        assert_eq!(names, vec!["func.func", "builtin.module"]);
        assert_eq!(ctx.parent_op(module.operation()), None);

        let main = ctx.block(body).operations[0];
        let entry = ctx.entry_block(main).unwrap();
        let call = ctx.block(entry).operations[0];
        let data = ctx.op(call);
        assert_eq!(data.results.len(), 2);
        assert_eq!(
            ctx.type_kind(ctx.value_type(data.results[1])),
            &TypeKind::IfrtControl
        );
        assert_eq!(
            data.attribute("callee").and_then(Attribute::as_symbol_ref),
            Some(&SymbolRef::new("add_one").nested("main"))
        );
        assert_eq!(
            data.attribute("devices").and_then(Attribute::as_integer_array),
            Some(vec![0])
        );
    }

    #[test]
    fn test_implicit_module() {
        let (ctx, module) = parse_ok("func.func private @decl(i32) -> i32\n");
        let printed = print_module(&ctx, module);
        assert_eq!(printed, "module {\n  func.func private @decl(i32) -> i32\n}\n");
    }

    #[test]
    fn test_empty_input_is_empty_module() {
        let (ctx, module) = parse_ok("");
        assert!(ctx.block(module.body(&ctx)).operations.is_empty());
    }

    #[test]
    fn test_control_dependencies() {
        let source = r#"
!a = !ifrt.array<tensor<4xf32>, #ifrt.sharding_param<2 to [0] on 2>, [0, 1]>
module {
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
        let (ctx, module) = parse_ok(source);
        assert!(verify(&ctx, module).is_ok());
        let printed = print_module(&ctx, module);
        assert!(printed.contains("ifrt.Call @f(%0) after %ctrl_0 on devices [0, 1] : (!a) -> !a"));
    }

    #[test]
    fn test_generic_form_of_unregistered_dialect() {
        let source = r#"
func.func @main(%arg0: i32) -> i32 {
  %0 = "toy.double"(%arg0) {factor = 2 : i64} : (i32) -> i32
  return %0 : i32
}
"#;
        let mut ctx = Context::new();
        let err = parse_module(source, &mut ctx).unwrap_err();
        assert!(err
            .iter()
            .any(|d| d.code == Some(ErrorCode::UNREGISTERED_DIALECT)));

        let mut ctx = Context::with_config(ContextConfig {
            allow_unregistered_dialects: true,
        });
        let module = parse_module(source, &mut ctx).unwrap();
        let printed = print_module(&ctx, module);
        assert!(printed.contains("%0 = \"toy.double\"(%arg0) {factor = 2 : i64} : (i32) -> i32"));
    }

    #[test]
    fn test_generic_region_sees_outer_values() {
        let source = r#"
func.func @main(%arg0: i32) {
  "test.wrap"() ({
    "test.use"(%arg0) : (i32) -> ()
  }) : () -> ()
  return
}
"#;
        let mut ctx = Context::with_config(ContextConfig {
            allow_unregistered_dialects: true,
        });
        assert!(parse_module(source, &mut ctx).is_ok());
    }

    #[test]
    fn test_unknown_operation() {
        assert_eq!(first_error("invalid data"), ErrorCode::UNKNOWN_OPERATION);
        assert_eq!(first_error("%0 = mhlo.bogus : tensor<i32>"), ErrorCode::UNKNOWN_OPERATION);
    }

    #[test]
    fn test_undefined_value() {
        let source = "func.func @f() -> i32 {\n  return %x : i32\n}";
        assert_eq!(first_error(source), ErrorCode::UNDEFINED_VALUE);
    }

    #[test]
    fn test_values_do_not_cross_functions() {
        let source = r#"
func.func @f(%a: i32) -> i32 {
  return %a : i32
}
func.func @g() -> i32 {
  return %a : i32
}
"#;
        assert_eq!(first_error(source), ErrorCode::UNDEFINED_VALUE);
    }

    #[test]
    fn test_redefined_value() {
        let source = r#"
func.func @f(%a: tensor<i32>) -> tensor<i32> {
  %0 = mhlo.add %a, %a : tensor<i32>
  %0 = mhlo.add %0, %a : tensor<i32>
  return %0 : tensor<i32>
}
"#;
        assert_eq!(first_error(source), ErrorCode::REDEFINED_VALUE);
    }

    #[test]
    fn test_use_type_mismatch() {
        let source = "func.func @f(%a: i32) -> i64 {\n  return %a : i64\n}";
        assert_eq!(first_error(source), ErrorCode::USE_TYPE_MISMATCH);
    }

    #[test]
    fn test_result_count_mismatch() {
        let source = r#"
func.func @f(%a: tensor<i32>) -> tensor<i32> {
  %0, %1 = mhlo.negate %a : (tensor<i32>) -> tensor<i32>
  return %0 : tensor<i32>
}
"#;
        assert_eq!(first_error(source), ErrorCode::RESULT_COUNT);
    }

    #[test]
    fn test_undefined_alias() {
        assert_eq!(
            first_error("func.func private @f(!missing) -> i32"),
            ErrorCode::UNDEFINED_ALIAS
        );
    }

    #[test]
    fn test_block_labels_rejected() {
        let source = "func.func @f() {\n^bb0:\n  return\n}";
        assert_eq!(first_error(source), ErrorCode::UNSUPPORTED_SYNTAX);
    }

    #[test]
    fn test_lexer_errors_are_reported() {
        assert_eq!(first_error("module { ~ }"), ErrorCode::UNEXPECTED_CHAR);
    }

    #[test]
    fn test_diagnostic_points_into_source() {
        let mut ctx = Context::new();
        let diagnostics = parse_module("module {\n  bogus\n}", &mut ctx).unwrap_err();
        let diagnostic = diagnostics.iter().next().unwrap();
        let span = diagnostic.labels[0].span;
        assert_eq!(span.start.line, 2);
        assert_eq!(span.start.column, 3);
    }

    #[test]
    fn test_attribute_forms() {
        let source = r#"
module @m attributes {mhlo.num_partitions = 1 : i32, note = "x", flags = [true, -2, 1.5], nested = {k = @sym}} {
}
"#;
        let (ctx, module) = parse_ok(source);
        let attrs = &ctx.op(module.operation()).attributes;
        assert_eq!(attrs.get("note"), Some(&Attribute::string("x")));
        assert_eq!(
            attrs.get("flags"),
            Some(&Attribute::Array(vec![
                Attribute::Bool(true),
                Attribute::integer(-2),
                Attribute::Float {
                    literal: "1.5".into(),
                    ty: None
                },
            ]))
        );
        let printed = print_module(&ctx, module);
        let (again_ctx, again) = parse_ok(&printed);
        assert_eq!(print_module(&again_ctx, again), printed);
    }

    #[test]
    fn test_multi_axis_sharding_round_trip() {
        let source = r#"
!array = !ifrt.array<tensor<4x2xi32>, #ifrt.sharding_param<2x1 to [1, 0] on 2x2>, [0, 1, 2, 3]>
module {
  func.func @main(%arg0: !array) -> !array attributes {ifrt.function} {
    %0, %ctrl_0 = ifrt.Call @shard::@main(%arg0) on devices [0, 1, 2, 3] : (!array) -> !array
    return %0 : !array
  }
  module @shard {
    func.func @main(%arg0: tensor<2x2xi32>) -> tensor<2x2xi32> {
      return %arg0 : tensor<2x2xi32>
    }
  }
}
"#;
        let (ctx, module) = parse_ok(source);
        verify(&ctx, module).unwrap();
        let printed = print_module(&ctx, module);
        assert!(printed.contains("#ifrt.sharding_param<2x1 to [1, 0] on 2x2>"), "{}", printed);

        let (again_ctx, again) = parse_ok(&printed);
        assert_eq!(print_module(&again_ctx, again), printed);
    }

    #[test]
    fn test_nesting_limit() {
        let depth = MAX_NESTING + 10;
        let modules = format!("{}{}", "module {".repeat(depth), "}".repeat(depth));
        assert_eq!(first_error(&modules), ErrorCode::NESTING_TOO_DEEP);

        let arrays = format!(
            "module attributes {{a = {}1{}}} {{\n}}",
            "[".repeat(depth),
            "]".repeat(depth)
        );
        assert_eq!(first_error(&arrays), ErrorCode::NESTING_TOO_DEEP);

        let shallow = format!("{}{}", "module {".repeat(8), "}".repeat(8));
        parse_ok(&shallow);
    }

    #[test]
    fn test_integer_limits() {
        let (ctx, module) = parse_ok("module attributes {low = -9223372036854775808 : i64} {\n}\n");
        let low = ctx.op(module.operation()).attributes.get("low").and_then(Attribute::as_integer);
        assert_eq!(low, Some(i64::MIN));

        let printed = print_module(&ctx, module);
        let (again_ctx, again) = parse_ok(&printed);
        assert_eq!(print_module(&again_ctx, again), printed);

        assert_eq!(
            first_error("module attributes {high = 9223372036854775808} {\n}"),
            ErrorCode::UNEXPECTED_TOKEN
        );
    }
}
