//! ifrt-ir - In-memory IR for IFRT programs
//!
//! A module tree lives entirely inside one [`Context`]:
//! - operations, regions, blocks and SSA values are arena entries
//!   addressed by copyable handles
//! - types are interned, so type equality is handle equality
//! - a [`Module`] is just the index of the root `builtin.module`
//!
//! # Architecture
//!
//! ```text
//! text (ifrt-parser)
//!         ↓
//!      Context
//!      └── builtin.module
//!          ├── func.func
//!          │   └── entry block
//!          │       └── operations
//!          └── nested modules
//!         ↓
//!   [verify] → Diagnostics
//!         ↓
//!   [print_module] → canonical text
//! ```

pub mod attributes;
pub mod context;
pub mod dialect;
pub mod printer;
pub mod types;
pub mod verify;

pub use attributes::{Attribute, AttributeMap, SymbolRef};
pub use context::{
    BlockData, BlockId, Context, ContextConfig, Module, OpId, OperationData, OperationState,
    RegionData, RegionId, Value, ValueData, ValueDef,
};
pub use dialect::{Dialect, DialectRegistry, Lookup};
pub use printer::{attribute_to_string, print_module, type_to_string, ModuleDisplay, ModulePrinter};
pub use types::{FloatKind, ShardingParam, Type, TypeKind};
pub use verify::{verify, Verifier};
