//! Type system for the Prism IR.

use crate::arena::{Handle, UniqueArena};
use crate::global::AddressSpace;

/// Width of a scalar type in bytes.
pub type Bytes = u8;

/// The kind of a scalar type.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ScalarKind {
    /// Boolean.
    Bool,
    /// Signed integer.
    Sint,
    /// Unsigned integer.
    Uint,
    /// Floating point.
    Float,
}

/// A scalar type: kind + byte width.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub width: Bytes,
}

impl Scalar {
    pub const BOOL: Self = Self {
        kind: ScalarKind::Bool,
        width: 1,
    };
    pub const I32: Self = Self {
        kind: ScalarKind::Sint,
        width: 4,
    };
    pub const U32: Self = Self {
        kind: ScalarKind::Uint,
        width: 4,
    };
    pub const F16: Self = Self {
        kind: ScalarKind::Float,
        width: 2,
    };
    pub const F32: Self = Self {
        kind: ScalarKind::Float,
        width: 4,
    };
}

/// Number of components in a vector.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum VectorSize {
    /// 2 components.
    Bi = 2,
    /// 3 components.
    Tri = 3,
    /// 4 components.
    Quad = 4,
}

/// Size of an array.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ArraySize {
    /// Fixed-size array.
    Constant(u32),
    /// Runtime-sized array.
    Dynamic,
}

/// A member of a struct type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: Handle<Type>,
    pub offset: u32,
}

/// A named type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Type {
    pub name: Option<String>,
    pub inner: TypeInner,
}

impl Type {
    /// Creates an anonymous type.
    pub fn anonymous(inner: TypeInner) -> Self {
        Self { name: None, inner }
    }
}

/// The concrete shape of a type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum TypeInner {
    /// A single scalar value.
    Scalar(Scalar),
    /// A vector of scalars.
    Vector { size: VectorSize, scalar: Scalar },
    /// A matrix of column vectors.
    Matrix {
        columns: VectorSize,
        rows: VectorSize,
        scalar: Scalar,
    },
    /// An atomic scalar.
    Atomic(Scalar),
    /// A pointer to a value in a given address space.
    Pointer {
        base: Handle<Type>,
        space: AddressSpace,
    },
    /// A fixed-size or runtime-sized array.
    Array {
        base: Handle<Type>,
        size: ArraySize,
        stride: u32,
    },
    /// A composite struct type.
    Struct {
        members: Vec<StructMember>,
        span: u32,
    },
}

impl TypeInner {
    /// Returns the pointee type and address space if this is a pointer.
    pub fn pointer(&self) -> Option<(Handle<Type>, AddressSpace)> {
        match *self {
            Self::Pointer { base, space } => Some((base, space)),
            _ => None,
        }
    }
}

/// Interns `array<u32, len>`, the type of an index-array parameter.
pub fn index_array_type(types: &mut UniqueArena<Type>, len: u32) -> Handle<Type> {
    let u32_ty = types.insert(Type::anonymous(TypeInner::Scalar(Scalar::U32)));
    types.insert(Type::anonymous(TypeInner::Array {
        base: u32_ty,
        size: ArraySize::Constant(len),
        stride: 4,
    }))
}

/// Interns `ptr<space, base>`.
pub fn pointer_type(
    types: &mut UniqueArena<Type>,
    base: Handle<Type>,
    space: AddressSpace,
) -> Handle<Type> {
    types.insert(Type::anonymous(TypeInner::Pointer { base, space }))
}
