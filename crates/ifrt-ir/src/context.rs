//! Context - arena owning every node of one module tree
//!
//! Operations, regions, blocks and values live in flat vectors inside the
//! `Context` and refer to each other through `u32` handles. Nothing is
//! reference counted: dropping the context drops the whole tree at once.

use crate::attributes::{Attribute, AttributeMap};
use crate::dialect::DialectRegistry;
use crate::types::{Type, TypeKind, TypeStorage};
use ifrt_error::Span;

/// Handle to an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub(crate) u32);

/// Handle to a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub(crate) u32);

/// Handle to a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);

/// Handle to an SSA value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(pub(crate) u32);

/// Where a value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    BlockArgument { block: BlockId, index: usize },
    OpResult { op: OpId, index: usize },
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub ty: Type,
    pub def: ValueDef,
}

#[derive(Debug, Clone)]
pub struct OperationData {
    /// Fully qualified name, e.g. `func.func`
    pub name: String,
    pub operands: Vec<Value>,
    pub results: Vec<Value>,
    pub attributes: AttributeMap,
    pub regions: Vec<RegionId>,
    /// Block the operation was appended to
    pub parent: Option<BlockId>,
    /// Location in the text it was parsed from
    pub location: Option<Span>,
}

impl OperationData {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// `sym_name` of symbol operations
    pub fn symbol_name(&self) -> Option<&str> {
        self.attribute("sym_name").and_then(Attribute::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionData {
    pub blocks: Vec<BlockId>,
    pub parent: Option<OpId>,
}

#[derive(Debug, Clone)]
pub struct BlockData {
    pub arguments: Vec<Value>,
    pub operations: Vec<OpId>,
    pub parent: RegionId,
}

/// Everything needed to create an operation
#[derive(Debug, Clone)]
pub struct OperationState {
    pub name: String,
    pub operands: Vec<Value>,
    pub result_types: Vec<Type>,
    pub attributes: AttributeMap,
    pub regions: Vec<RegionId>,
    pub location: Option<Span>,
}

impl OperationState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operands: Vec::new(),
            result_types: Vec::new(),
            attributes: AttributeMap::new(),
            regions: Vec::new(),
            location: None,
        }
    }

    pub fn with_operands(mut self, operands: impl IntoIterator<Item = Value>) -> Self {
        self.operands.extend(operands);
        self
    }

    pub fn with_results(mut self, types: impl IntoIterator<Item = Type>) -> Self {
        self.result_types.extend(types);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Attribute) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_region(mut self, region: RegionId) -> Self {
        self.regions.push(region);
        self
    }

    pub fn at(mut self, location: Span) -> Self {
        self.location = Some(location);
        self
    }
}

/// Context configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextConfig {
    /// Accept operations, types and attributes of unknown dialects
    pub allow_unregistered_dialects: bool,
}

/// Arena owning one module tree and its interned types
#[derive(Debug, Default)]
pub struct Context {
    operations: Vec<OperationData>,
    regions: Vec<RegionData>,
    blocks: Vec<BlockData>,
    values: Vec<ValueData>,
    types: TypeStorage,
    /// `!name = type` definitions, in definition order
    type_aliases: Vec<(String, Type)>,
    dialects: DialectRegistry,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ContextConfig) -> Self {
        let mut ctx = Self::default();
        ctx.dialects.set_allow_unregistered(config.allow_unregistered_dialects);
        ctx
    }

    pub fn dialects(&self) -> &DialectRegistry {
        &self.dialects
    }

    pub fn dialects_mut(&mut self) -> &mut DialectRegistry {
        &mut self.dialects
    }

    // =========================================
    // Types
    // =========================================

    pub fn intern_type(&mut self, kind: TypeKind) -> Type {
        self.types.intern(kind)
    }

    pub fn type_kind(&self, ty: Type) -> &TypeKind {
        self.types.get(ty)
    }

    pub fn integer_type(&mut self, width: u32) -> Type {
        self.intern_type(TypeKind::Integer(width))
    }

    pub fn tensor_type(&mut self, shape: Vec<Option<i64>>, element: Type) -> Type {
        self.intern_type(TypeKind::Tensor { shape, element })
    }

    pub fn function_type(&mut self, inputs: Vec<Type>, results: Vec<Type>) -> Type {
        self.intern_type(TypeKind::Function { inputs, results })
    }

    pub fn control_type(&mut self) -> Type {
        self.intern_type(TypeKind::IfrtControl)
    }

    /// Registers `!name = ty`. Returns the existing target if the name is taken.
    pub fn define_type_alias(&mut self, name: impl Into<String>, ty: Type) -> Result<(), Type> {
        let name = name.into();
        if let Some(existing) = self.type_alias(&name) {
            return Err(existing);
        }
        self.type_aliases.push((name, ty));
        Ok(())
    }

    pub fn type_alias(&self, name: &str) -> Option<Type> {
        self.type_aliases
            .iter()
            .find(|(alias, _)| alias == name)
            .map(|(_, ty)| *ty)
    }

    /// First alias defined for `ty`
    pub fn alias_of(&self, ty: Type) -> Option<&str> {
        self.type_aliases
            .iter()
            .find(|(_, target)| *target == ty)
            .map(|(alias, _)| alias.as_str())
    }

    pub fn type_aliases(&self) -> &[(String, Type)] {
        &self.type_aliases
    }

    // =========================================
    // Construction
    // =========================================

    /// Creates a detached region
    pub fn create_region(&mut self) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(RegionData::default());
        id
    }

    /// Appends a block with arguments of the given types to `region`
    pub fn append_block(&mut self, region: RegionId, arg_types: &[Type]) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let arguments = arg_types
            .iter()
            .enumerate()
            .map(|(index, &ty)| self.new_value(ty, ValueDef::BlockArgument { block: id, index }))
            .collect();
        self.blocks.push(BlockData {
            arguments,
            operations: Vec::new(),
            parent: region,
        });
        self.regions[region.0 as usize].blocks.push(id);
        id
    }

    /// Creates a detached operation and its result values
    pub fn create_operation(&mut self, state: OperationState) -> OpId {
        let id = OpId(self.operations.len() as u32);
        let results = state
            .result_types
            .iter()
            .enumerate()
            .map(|(index, &ty)| self.new_value(ty, ValueDef::OpResult { op: id, index }))
            .collect();
        for &region in &state.regions {
            self.regions[region.0 as usize].parent = Some(id);
        }
        self.operations.push(OperationData {
            name: state.name,
            operands: state.operands,
            results,
            attributes: state.attributes,
            regions: state.regions,
            parent: None,
            location: state.location,
        });
        id
    }

    pub fn append_operation(&mut self, block: BlockId, op: OpId) {
        self.blocks[block.0 as usize].operations.push(op);
        self.operations[op.0 as usize].parent = Some(block);
    }

    fn new_value(&mut self, ty: Type, def: ValueDef) -> Value {
        let id = Value(self.values.len() as u32);
        self.values.push(ValueData { ty, def });
        id
    }

    // =========================================
    // Access
    // =========================================

    pub fn op(&self, id: OpId) -> &OperationData {
        &self.operations[id.0 as usize]
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut OperationData {
        &mut self.operations[id.0 as usize]
    }

    pub fn region(&self, id: RegionId) -> &RegionData {
        &self.regions[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.0 as usize]
    }

    pub fn value(&self, id: Value) -> &ValueData {
        &self.values[id.0 as usize]
    }

    pub fn value_type(&self, id: Value) -> Type {
        self.value(id).ty
    }

    /// Operation that owns the region containing `block`
    pub fn block_owner(&self, block: BlockId) -> Option<OpId> {
        self.region(self.block(block).parent).parent
    }

    /// Enclosing operation of `op`
    pub fn parent_op(&self, op: OpId) -> Option<OpId> {
        self.op(op).parent.and_then(|block| self.block_owner(block))
    }

    /// Entry block of the first region of `op`
    pub fn entry_block(&self, op: OpId) -> Option<BlockId> {
        let region = *self.op(op).regions.first()?;
        self.region(region).blocks.first().copied()
    }

    /// Visits `op` and every nested operation in pre-order
    pub fn walk(&self, op: OpId, f: &mut impl FnMut(OpId)) {
        f(op);
        for &region in &self.op(op).regions {
            for &block in &self.region(region).blocks {
                for &nested in &self.block(block).operations {
                    self.walk(nested, f);
                }
            }
        }
    }

    pub fn num_operations(&self) -> usize {
        self.operations.len()
    }
}

/// Root of a parsed or built module: an index into its `Context`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Module {
    op: OpId,
}

impl Module {
    /// Creates an empty `builtin.module`
    pub fn create(ctx: &mut Context, name: Option<&str>) -> Self {
        let region = ctx.create_region();
        ctx.append_block(region, &[]);
        let mut state = OperationState::new("builtin.module").with_region(region);
        if let Some(name) = name {
            state = state.with_attribute("sym_name", Attribute::string(name));
        }
        Self {
            op: ctx.create_operation(state),
        }
    }

    /// Wraps an existing operation; it must be a `builtin.module` with a body
    pub fn from_op(ctx: &Context, op: OpId) -> Option<Self> {
        let data = ctx.operations.get(op.0 as usize)?;
        let is_module = data.name == "builtin.module" && ctx.entry_block(op).is_some();
        is_module.then_some(Self { op })
    }

    /// Whether this handle names a module operation of `ctx`
    pub fn belongs_to(&self, ctx: &Context) -> bool {
        Self::from_op(ctx, self.op).is_some()
    }

    pub fn operation(&self) -> OpId {
        self.op
    }

    pub fn name<'a>(&self, ctx: &'a Context) -> Option<&'a str> {
        ctx.op(self.op).symbol_name()
    }

    pub fn body(&self, ctx: &Context) -> BlockId {
        ctx.entry_block(self.op)
            .expect("module operations are always created with a body block")
    }
}
