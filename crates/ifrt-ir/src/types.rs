//! IR types
//!
//! Types are interned in the owning `Context`; a `Type` is a cheap handle
//! that compares equal exactly when the two types are structurally equal.

use std::collections::HashMap;
use std::fmt;

/// Handle to an interned type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(pub(crate) u32);

/// Floating point formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F16,
    BF16,
    F32,
    F64,
}

impl FloatKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "f16" => Some(FloatKind::F16),
            "bf16" => Some(FloatKind::BF16),
            "f32" => Some(FloatKind::F32),
            "f64" => Some(FloatKind::F64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FloatKind::F16 => "f16",
            FloatKind::BF16 => "bf16",
            FloatKind::F32 => "f32",
            FloatKind::F64 => "f64",
        }
    }
}

/// Structure of a type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// `i1`, `i32`, ...
    Integer(u32),
    Float(FloatKind),
    Index,
    /// Ranked tensor; `None` is a dynamic dimension
    Tensor {
        shape: Vec<Option<i64>>,
        element: Type,
    },
    Function {
        inputs: Vec<Type>,
        results: Vec<Type>,
    },
    /// `!ifrt.array<tensor<...>, #ifrt.sharding_param<...>, [devices]>`
    IfrtArray {
        shape: Type,
        sharding: ShardingParam,
        devices: Vec<i64>,
        memory_kind: Option<String>,
    },
    /// `!ifrt.control`
    IfrtControl,
    /// Type of a dialect that is not registered, kept verbatim
    Opaque {
        dialect: String,
        name: String,
        body: Option<String>,
    },
}

impl TypeKind {
    pub fn is_tensor(&self) -> bool {
        matches!(self, TypeKind::Tensor { .. })
    }
}

/// How a global array is split over a device mesh.
///
/// Printed as `2x1 to [1, 0] on 2x2`: per-dimension shard counts, the
/// major-to-minor permutation of mesh axes, and the mesh axis sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardingParam {
    pub dim_shards: Vec<i64>,
    pub permutation: Vec<i64>,
    pub axis_sizes: Vec<i64>,
}

impl ShardingParam {
    pub fn new(dim_shards: Vec<i64>, permutation: Vec<i64>, axis_sizes: Vec<i64>) -> Self {
        Self {
            dim_shards,
            permutation,
            axis_sizes,
        }
    }

    /// Fully replicated over `num_devices` devices for an array of `rank` dims
    pub fn replicated(rank: usize, num_devices: i64) -> Self {
        Self::new(vec![1; rank], vec![0], vec![num_devices])
    }

    /// Number of devices in the mesh
    /// Size of the device mesh, `None` if it overflows `i64`
    pub fn num_devices(&self) -> Option<i64> {
        checked_product(&self.axis_sizes)
    }

    /// Number of distinct shards, `None` if it overflows `i64`
    pub fn num_shards(&self) -> Option<i64> {
        checked_product(&self.dim_shards)
    }

    /// Checks internal consistency. Returns a description of the first problem.
    pub fn verify(&self) -> Result<(), String> {
        if self.axis_sizes.is_empty() {
            return Err("device mesh must have at least one axis".to_string());
        }
        if let Some(size) = self.axis_sizes.iter().chain(&self.dim_shards).find(|s| **s <= 0) {
            return Err(format!("shard and axis sizes must be positive, found {}", size));
        }
        if self.permutation.len() != self.axis_sizes.len() {
            return Err(format!(
                "permutation has {} entries but the mesh has {} axes",
                self.permutation.len(),
                self.axis_sizes.len()
            ));
        }
        let mut seen = vec![false; self.axis_sizes.len()];
        for &axis in &self.permutation {
            let slot = usize::try_from(axis)
                .ok()
                .and_then(|idx| seen.get_mut(idx))
                .ok_or_else(|| format!("permutation entry {} is out of range", axis))?;
            if *slot {
                return Err(format!("permutation repeats axis {}", axis));
            }
            *slot = true;
        }
        let devices = self
            .num_devices()
            .ok_or_else(|| format!("device mesh {} has too many devices", join_x(&self.axis_sizes)))?;
        let shards = self
            .num_shards()
            .ok_or_else(|| format!("shard counts {} overflow", join_x(&self.dim_shards)))?;
        if devices % shards != 0 {
            return Err(format!(
                "{} shards cannot be spread evenly over {} devices",
                shards, devices
            ));
        }
        Ok(())
    }

    /// Per-shard shape of a global shape, `None` if a dimension does not divide
    pub fn local_shape(&self, global: &[Option<i64>]) -> Option<Vec<Option<i64>>> {
        if global.len() != self.dim_shards.len() {
            return None;
        }
        global
            .iter()
            .zip(&self.dim_shards)
            .map(|(dim, &shards)| match dim {
                Some(size) if size % shards == 0 => Some(Some(size / shards)),
                Some(_) => None,
                None => Some(None),
            })
            .collect()
    }
}

fn checked_product(values: &[i64]) -> Option<i64> {
    values.iter().try_fold(1i64, |acc, &v| acc.checked_mul(v))
}

fn join_x(values: &[i64]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("x")
}

impl fmt::Display for ShardingParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.dim_shards.is_empty() {
            write!(f, "{} ", join_x(&self.dim_shards))?;
        }
        let permutation = self
            .permutation
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "to [{}] on {}", permutation, join_x(&self.axis_sizes))
    }
}

/// Interning table owned by a `Context`
#[derive(Debug, Default)]
pub(crate) struct TypeStorage {
    kinds: Vec<TypeKind>,
    lookup: HashMap<TypeKind, Type>,
}

impl TypeStorage {
    pub(crate) fn intern(&mut self, kind: TypeKind) -> Type {
        if let Some(&ty) = self.lookup.get(&kind) {
            return ty;
        }
        let ty = Type(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.lookup.insert(kind, ty);
        ty
    }

    pub(crate) fn get(&self, ty: Type) -> &TypeKind {
        &self.kinds[ty.0 as usize]
    }
}
