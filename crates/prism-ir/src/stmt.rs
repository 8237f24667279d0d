//! Statements: operations with side effects and control flow.

use crate::arena::Handle;
use crate::expr::Expression;

/// A block of statements.
pub type Block = Vec<Statement>;

/// Bitflags for synchronization barriers.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Barrier(u32);

impl Barrier {
    /// Empty barrier (no flags set).
    pub const EMPTY: Self = Self(0);
    /// Storage buffer barrier.
    pub const STORAGE: Self = Self(1);
    /// Workgroup memory barrier.
    pub const WORKGROUP: Self = Self(2);

    /// Returns `true` if `self` contains all flags in `other`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flags are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Barrier {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A statement in the IR.
///
/// Statements have side effects and/or control flow.
/// They operate on expressions referenced by handles.
#[derive(Clone, Debug)]
pub enum Statement {
    /// Declare a local `var` or `let`; evaluates its initializer, if any.
    Local(Handle<crate::LocalVariable>),
    /// `target = value`, where `target` is a reference expression.
    Assign {
        target: Handle<Expression>,
        value: Handle<Expression>,
    },
    /// Evaluate an expression for its side effects (usually a call).
    Eval(Handle<Expression>),
    /// Conditional branch.
    If {
        condition: Handle<Expression>,
        accept: Block,
        reject: Block,
    },
    /// `loop { body continuing { continuing break if break_if } }`.
    Loop {
        body: Block,
        continuing: Block,
        break_if: Option<Handle<Expression>>,
    },
    /// `for (init; condition; update) { body }`.
    For {
        init: Option<Box<Statement>>,
        condition: Option<Handle<Expression>>,
        update: Option<Box<Statement>>,
        body: Block,
    },
    /// `while condition { body }`.
    While {
        condition: Handle<Expression>,
        body: Block,
    },
    /// A nested lexical scope.
    Block(Block),
    /// Break out of the innermost loop.
    Break,
    /// Continue to the next iteration of the innermost loop.
    Continue,
    /// Return from the function.
    Return { value: Option<Handle<Expression>> },
    /// Synchronization barrier.
    Barrier(Barrier),
}

impl Statement {
    /// Returns the expression handles this statement evaluates directly,
    /// excluding nested statements.
    pub fn expressions(&self) -> Vec<Handle<Expression>> {
        match self {
            Self::Assign { target, value } => vec![*target, *value],
            Self::Eval(e) => vec![*e],
            Self::If { condition, .. } | Self::While { condition, .. } => vec![*condition],
            Self::Loop { break_if, .. } => break_if.iter().copied().collect(),
            Self::For { condition, .. } => condition.iter().copied().collect(),
            Self::Return { value } => value.iter().copied().collect(),
            // A declaration's initializer lives on the local variable.
            Self::Local(_)
            | Self::Block(_)
            | Self::Break
            | Self::Continue
            | Self::Barrier(_) => vec![],
        }
    }
}
