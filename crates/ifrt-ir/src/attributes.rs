//! Attributes - compile-time constants attached to operations

use crate::types::{ShardingParam, Type};
use std::collections::BTreeMap;
use std::fmt;

/// Sorted attribute dictionary, so printing is deterministic
pub type AttributeMap = BTreeMap<String, Attribute>;

/// Reference to a symbol, possibly nested: `@outer::@inner`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    pub root: String,
    pub nested: Vec<String>,
}

impl SymbolRef {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            nested: Vec::new(),
        }
    }

    pub fn nested(mut self, name: impl Into<String>) -> Self {
        self.nested.push(name.into());
        self
    }

    /// All path components, outermost first
    pub fn path(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.root.as_str()).chain(self.nested.iter().map(String::as_str))
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.root)?;
        for name in &self.nested {
            write!(f, "::@{}", name)?;
        }
        Ok(())
    }
}

/// Attribute values
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// Present-or-absent flag: `{ifrt.function}`
    Unit,
    Bool(bool),
    Integer {
        value: i64,
        ty: Option<Type>,
    },
    /// Float literal kept as written so printing is exact
    Float {
        literal: String,
        ty: Option<Type>,
    },
    String(String),
    Type(Type),
    SymbolRef(SymbolRef),
    Array(Vec<Attribute>),
    /// `dense<...>` with the body kept verbatim
    DenseElements {
        literal: String,
        ty: Option<Type>,
    },
    Dictionary(AttributeMap),
    /// `#ifrt.sharding_param<...>`
    ShardingParam(ShardingParam),
    /// Attribute of an unregistered dialect, kept verbatim
    Opaque {
        dialect: String,
        name: String,
        body: Option<String>,
    },
}

impl Attribute {
    pub fn integer(value: i64) -> Self {
        Attribute::Integer { value, ty: None }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Attribute::String(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Attribute::Integer { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<Type> {
        match self {
            Attribute::Type(ty) => Some(*ty),
            _ => None,
        }
    }

    pub fn as_symbol_ref(&self) -> Option<&SymbolRef> {
        match self {
            Attribute::SymbolRef(sym) => Some(sym),
            _ => None,
        }
    }

    /// Elements of an array of integers
    pub fn as_integer_array(&self) -> Option<Vec<i64>> {
        match self {
            Attribute::Array(items) => items.iter().map(Attribute::as_integer).collect(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_ref_display() {
        let sym = SymbolRef::new("add_one").nested("main");
        assert_eq!(sym.to_string(), "@add_one::@main");
        assert_eq!(sym.path().collect::<Vec<_>>(), vec!["add_one", "main"]);
    }

    #[test]
    fn test_integer_array() {
        let devices = Attribute::Array(vec![Attribute::integer(0), Attribute::integer(3)]);
        assert_eq!(devices.as_integer_array(), Some(vec![0, 3]));
        let mixed = Attribute::Array(vec![Attribute::integer(0), Attribute::Unit]);
        assert_eq!(mixed.as_integer_array(), None);
    }
}
