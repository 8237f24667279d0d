//! Functions, entry points, and local variables.

use std::collections::HashMap;

use crate::arena::{Arena, Handle};
use crate::expr::Expression;
use crate::global::Binding;
use crate::stmt::Block;
use crate::types::Type;

/// A function argument declaration.
#[derive(Clone, Debug)]
pub struct FunctionArgument {
    /// Optional argument name.
    pub name: Option<String>,
    /// The type of this argument.
    pub ty: Handle<Type>,
    /// Optional binding (e.g. built-in or location).
    pub binding: Option<Binding>,
}

/// The return type and optional binding of a function.
#[derive(Clone, Debug)]
pub struct FunctionResult {
    /// The return type.
    pub ty: Handle<Type>,
    /// Optional binding for the return value.
    pub binding: Option<Binding>,
}

/// Whether a local declaration is mutable storage or an immutable value.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum LocalKind {
    /// `var`: function address space storage.
    Var,
    /// `let`: an immutable value, possibly a pointer.
    Let,
}

/// A function-local declaration.
#[derive(Clone, Debug)]
pub struct LocalVariable {
    /// Variable name.
    pub name: String,
    /// `var` or `let`.
    pub kind: LocalKind,
    /// Declared (or front-end resolved) type; `None` when left to inference.
    pub ty: Option<Handle<Type>>,
    /// Optional initializer expression.
    pub init: Option<Handle<Expression>>,
}

/// A byte range in the original source text.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

/// An IR function.
#[derive(Clone, Debug)]
pub struct Function {
    /// Optional function name.
    pub name: Option<String>,
    /// Formal parameters.
    pub arguments: Vec<FunctionArgument>,
    /// Return type and optional binding.
    pub result: Option<FunctionResult>,
    /// Function-local declarations.
    pub local_variables: Arena<LocalVariable>,
    /// Expression arena for this function.
    pub expressions: Arena<Expression>,
    /// Source locations of expressions, when the front end recorded them.
    pub spans: HashMap<Handle<Expression>, Span>,
    /// The function body.
    pub body: Block,
}

impl Function {
    /// Creates an empty function with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            arguments: Vec::new(),
            result: None,
            local_variables: Arena::new(),
            expressions: Arena::new(),
            spans: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Returns the function name, or `"_"` for anonymous functions.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("_")
    }

    /// Returns `true` if evaluating `expr` may have observable side effects,
    /// i.e. if it contains a function call.
    pub fn has_side_effects(&self, expr: Handle<Expression>) -> bool {
        let mut stack = vec![expr];
        while let Some(handle) = stack.pop() {
            let node = &self.expressions[handle];
            if let Expression::Call { .. } = node {
                return true;
            }
            stack.extend(node.operands());
        }
        false
    }
}

/// A compute shader entry point.
#[derive(Clone, Debug)]
pub struct EntryPoint {
    /// Entry point name.
    pub name: String,
    /// Workgroup dimensions `[x, y, z]`.
    pub workgroup_size: [u32; 3],
    /// The entry point function body.
    pub function: Function,
}
