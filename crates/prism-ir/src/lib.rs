//! Prism intermediate representation.
//!
//! An arena-based, AST-level IR for shader programs as produced by a
//! type-checking front end: expressions keep their source tree shape
//! (address-of, dereference, member and index accessors, calls with side
//! effects) so that source-level rewrites can be expressed directly.

pub mod arena;
mod display;
mod expr;
mod func;
mod global;
mod stmt;
mod types;

pub use arena::{Arena, Handle, HandleMap, UniqueArena};
pub use display::{dump_function, dump_module, format_type, format_type_inner};
pub use expr::{BinaryOp, Expression, Literal, UnaryOp};
pub use func::{
    EntryPoint, Function, FunctionArgument, FunctionResult, LocalKind, LocalVariable, Span,
};
pub use global::{AddressSpace, Binding, BuiltIn, GlobalVariable, ResourceBinding, StorageAccess};
pub use stmt::{Barrier, Block, Statement};
pub use types::{
    ArraySize, Bytes, Scalar, ScalarKind, StructMember, Type, TypeInner, VectorSize,
    index_array_type, pointer_type,
};

/// A Prism IR module.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Deduplicated type arena.
    pub types: UniqueArena<Type>,
    /// Module-scope variables.
    pub global_variables: Arena<GlobalVariable>,
    /// Helper (non-entry-point) functions.
    pub functions: Arena<Function>,
    /// Compute entry points.
    pub entry_points: Vec<EntryPoint>,
}
