//! Access chains and their shapes.
//!
//! An [`AccessChain`] records how a pointer value was derived from a root
//! variable. Erasing the index values yields an [`AccessShape`], the
//! identity used to decide which function specializations are needed.

use prism_ir::{AddressSpace, Expression, Function, GlobalVariable, Handle, LocalVariable, Type};

/// The value selecting an element in an index step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexValue {
    /// An integer literal.
    Constant(u32),
    /// Any other expression, evaluated in the function being traced.
    Dynamic(Handle<Expression>),
}

/// One accessor applied on the way from the root to the pointee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessStep {
    /// A struct member (or vector component), fixed by name.
    Member(String),
    /// An array, matrix or vector element.
    Index(IndexValue),
}

/// Where a chain starts, relative to the function it was traced in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessRoot {
    /// A module-scope variable.
    ModuleVariable(Handle<GlobalVariable>),
    /// A `var` declared in the traced function.
    LocalVariable(Handle<LocalVariable>),
    /// A pointer parameter of the traced function, by argument index.
    Parameter(u32),
}

/// A root plus the ordered accessors applied to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessChain {
    pub root: AccessRoot,
    pub steps: Vec<AccessStep>,
}

impl AccessChain {
    pub fn new(root: AccessRoot) -> Self {
        Self {
            root,
            steps: Vec::new(),
        }
    }

    /// Iterates over the index steps, in chain order.
    pub fn indices(&self) -> impl Iterator<Item = IndexValue> + '_ {
        self.steps.iter().filter_map(|step| match step {
            AccessStep::Index(value) => Some(*value),
            AccessStep::Member(_) => None,
        })
    }

    /// Returns the dynamic index expressions, in chain order.
    pub fn dynamic_indices(&self) -> Vec<Handle<Expression>> {
        self.indices()
            .filter_map(|value| match value {
                IndexValue::Dynamic(expr) => Some(expr),
                IndexValue::Constant(_) => None,
            })
            .collect()
    }

    /// The step sequence with index values erased.
    pub fn shape_steps(&self) -> Vec<ShapeStep> {
        self.steps
            .iter()
            .map(|step| match step {
                AccessStep::Member(name) => ShapeStep::Member(name.clone()),
                AccessStep::Index(_) => ShapeStep::Index,
            })
            .collect()
    }
}

/// The root of an [`AccessShape`].
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum ShapeRoot {
    /// A module variable in a shared address space, named directly by the
    /// specialized callee.
    Variable(Handle<GlobalVariable>),
    /// A function or private root, passed to the callee as a pointer to
    /// `ty` in `space`.
    Scoped {
        space: AddressSpace,
        ty: Handle<Type>,
    },
}

/// An access step with its index value erased.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum ShapeStep {
    Member(String),
    Index,
}

/// An access chain with index values erased.
///
/// Two chains that differ only in their index values (constant or dynamic)
/// have equal shapes and therefore share one specialization.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AccessShape {
    pub root: ShapeRoot,
    pub steps: Vec<ShapeStep>,
}

impl AccessShape {
    /// Number of slots in the index array for this shape.
    pub fn index_count(&self) -> u32 {
        self.steps
            .iter()
            .filter(|step| matches!(step, ShapeStep::Index))
            .count() as u32
    }

    /// Returns `true` if the callee receives the root as a pointer.
    pub fn has_root_pointer(&self) -> bool {
        matches!(self.root, ShapeRoot::Scoped { .. })
    }

    /// Mangled name fragment, e.g. `U_arr_X_mat_X` or `F_X`.
    pub fn mangle(&self, globals: &prism_ir::Arena<GlobalVariable>) -> String {
        let mut parts = vec![match &self.root {
            ShapeRoot::Variable(var) => globals[*var].name.clone(),
            ShapeRoot::Scoped {
                space: AddressSpace::Function,
                ..
            } => "F".to_string(),
            ShapeRoot::Scoped { .. } => "P".to_string(),
        }];
        parts.extend(self.steps.iter().map(|step| match step {
            ShapeStep::Member(name) => name.clone(),
            ShapeStep::Index => "X".to_string(),
        }));
        parts.join("_")
    }
}

/// Identifies one specialization: the generic function plus the shape of
/// every transformed parameter, in parameter order.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SpecializationKey {
    pub function: Handle<Function>,
    pub shapes: Vec<AccessShape>,
}
