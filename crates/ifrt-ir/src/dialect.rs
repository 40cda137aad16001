//! Dialect registry
//!
//! A context only accepts operations, types and attributes of the dialects
//! it knows about, unless unregistered dialects are explicitly allowed.

use std::collections::HashMap;

/// Static description of one dialect
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    pub namespace: &'static str,
    pub operations: &'static [&'static str],
    pub types: &'static [&'static str],
    pub attributes: &'static [&'static str],
}

const ELEMENTWISE_OPS: &[&str] = &[
    "constant",
    "add",
    "subtract",
    "multiply",
    "divide",
    "maximum",
    "minimum",
    "negate",
    "abs",
    "exponential",
    "log",
    "tanh",
    "sqrt",
    "convert",
    "reshape",
];

pub const BUILTIN: Dialect = Dialect {
    namespace: "builtin",
    operations: &["module"],
    types: &[],
    attributes: &[],
};

pub const FUNC: Dialect = Dialect {
    namespace: "func",
    operations: &["func", "return", "call"],
    types: &[],
    attributes: &[],
};

pub const IFRT: Dialect = Dialect {
    namespace: "ifrt",
    operations: &["Call"],
    types: &["array", "control"],
    attributes: &["sharding_param"],
};

pub const MHLO: Dialect = Dialect {
    namespace: "mhlo",
    operations: ELEMENTWISE_OPS,
    types: &[],
    attributes: &[],
};

pub const STABLEHLO: Dialect = Dialect {
    namespace: "stablehlo",
    operations: ELEMENTWISE_OPS,
    types: &[],
    attributes: &[],
};

/// Result of looking a fully-qualified name up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Known entity of a registered dialect
    Registered,
    /// The dialect is registered but does not define this name
    UnknownInDialect,
    /// The dialect is not registered and unregistered dialects are allowed
    Unregistered,
    /// The dialect is not registered and unregistered dialects are rejected
    Rejected,
}

#[derive(Debug, Clone)]
pub struct DialectRegistry {
    dialects: HashMap<&'static str, Dialect>,
    allow_unregistered: bool,
}

impl Default for DialectRegistry {
    fn default() -> Self {
        let mut registry = Self {
            dialects: HashMap::new(),
            allow_unregistered: false,
        };
        for dialect in [BUILTIN, FUNC, IFRT, MHLO, STABLEHLO] {
            registry.insert(dialect);
        }
        registry
    }
}

impl DialectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dialect: Dialect) {
        self.dialects.insert(dialect.namespace, dialect);
    }

    pub fn set_allow_unregistered(&mut self, allow: bool) {
        self.allow_unregistered = allow;
    }

    pub fn allows_unregistered(&self) -> bool {
        self.allow_unregistered
    }

    pub fn is_registered(&self, namespace: &str) -> bool {
        self.dialects.contains_key(namespace)
    }

    /// Expands the short forms `module`, `return` and `call`
    pub fn canonical_op_name(name: &str) -> Option<String> {
        match name {
            "module" => Some("builtin.module".to_string()),
            "return" => Some("func.return".to_string()),
            "call" => Some("func.call".to_string()),
            _ if name.contains('.') => Some(name.to_string()),
            _ => None,
        }
    }

    pub fn lookup_op(&self, name: &str) -> Lookup {
        self.lookup(name, |dialect| dialect.operations)
    }

    pub fn lookup_type(&self, name: &str) -> Lookup {
        self.lookup(name, |dialect| dialect.types)
    }

    pub fn lookup_attribute(&self, name: &str) -> Lookup {
        self.lookup(name, |dialect| dialect.attributes)
    }

    fn lookup(&self, name: &str, names: impl Fn(&Dialect) -> &'static [&'static str]) -> Lookup {
        let (namespace, local) = name.split_once('.').unwrap_or(("", name));
        match self.dialects.get(namespace) {
            Some(dialect) if names(dialect).contains(&local) => Lookup::Registered,
            Some(_) => Lookup::UnknownInDialect,
            None if self.allow_unregistered => Lookup::Unregistered,
            None => Lookup::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_op() {
        let registry = DialectRegistry::new();
        assert_eq!(registry.lookup_op("mhlo.add"), Lookup::Registered);
        assert_eq!(registry.lookup_op("ifrt.Call"), Lookup::Registered);
        assert_eq!(registry.lookup_op("mhlo.bogus"), Lookup::UnknownInDialect);
        assert_eq!(registry.lookup_op("toy.print"), Lookup::Rejected);
    }

    #[test]
    fn test_allow_unregistered() {
        let mut registry = DialectRegistry::new();
        registry.set_allow_unregistered(true);
        assert_eq!(registry.lookup_op("toy.print"), Lookup::Unregistered);
        assert_eq!(registry.lookup_op("func.bogus"), Lookup::UnknownInDialect);
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(DialectRegistry::canonical_op_name("module").as_deref(), Some("builtin.module"));
        assert_eq!(DialectRegistry::canonical_op_name("return").as_deref(), Some("func.return"));
        assert_eq!(DialectRegistry::canonical_op_name("invalid"), None);
    }
}
