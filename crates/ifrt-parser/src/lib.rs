//! ifrt-parser - Parser for IFRT IR text
//!
//! Turns a module string into operations inside an `ifrt_ir::Context`.
//!
//! # Example
//!
//! ```rust
//! use ifrt_ir::{print_module, Context};
//! use ifrt_parser::parse_module;
//!
//! let source = "func.func private @f(tensor<2xi32>) -> tensor<2xi32>";
//!
//! let mut ctx = Context::new();
//! let module = parse_module(source, &mut ctx).expect("valid module");
//! println!("{}", print_module(&ctx, module));
//! ```

pub mod parser;

pub use parser::{parse_module, parse_module_in, Parser, MAX_NESTING};
