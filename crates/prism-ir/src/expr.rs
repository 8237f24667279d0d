//! Expressions: tree nodes stored in a per-function arena.
//!
//! Unlike statements, most expressions are pure. The exception is
//! [`Expression::Call`], which evaluates a function for its result and may
//! have observable side effects; passes that move or duplicate expressions
//! must check [`crate::Function::has_side_effects`] first.

use crate::arena::Handle;
use crate::types::{Bytes, Scalar, ScalarKind, Type};

/// A literal constant value.
#[derive(Clone, Copy, Debug)]
pub enum Literal {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    AbstractInt(i64),
}

impl Literal {
    /// Returns the scalar type of this literal.
    pub fn scalar(&self) -> Scalar {
        match *self {
            Self::Bool(_) => Scalar::BOOL,
            Self::I32(_) => Scalar::I32,
            Self::U32(_) => Scalar::U32,
            Self::F32(_) => Scalar::F32,
            Self::AbstractInt(_) => Scalar {
                kind: ScalarKind::Sint,
                width: 8,
            },
        }
    }

    /// Returns the value of an integer literal.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Self::I32(v) => Some(i64::from(v)),
            Self::U32(v) => Some(i64::from(v)),
            Self::AbstractInt(v) => Some(v),
            Self::Bool(_) | Self::F32(_) => None,
        }
    }
}

/// A unary operator.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitwiseNot,
}

/// A binary operator.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
}

/// An expression in the IR.
///
/// Expressions are stored in per-function arenas and referenced by
/// [`Handle<Expression>`]. Each syntactic occurrence in the source program
/// is its own arena node, so handle equality identifies one occurrence.
///
/// Variable references ([`GlobalVariable`](Self::GlobalVariable),
/// [`LocalVariable`](Self::LocalVariable) of a `var`) denote memory;
/// [`AddressOf`](Self::AddressOf) turns such a reference into a pointer
/// value and [`Deref`](Self::Deref) turns a pointer back into a reference.
#[derive(Clone, Debug)]
pub enum Expression {
    /// A literal constant.
    Literal(Literal),
    /// Construct a composite type from components.
    Compose {
        ty: Handle<Type>,
        components: Vec<Handle<Expression>>,
    },
    /// Reference to a function argument by index.
    FunctionArgument(u32),
    /// Reference to a global variable.
    GlobalVariable(Handle<crate::GlobalVariable>),
    /// Reference to a local `var`, or the value of a local `let`.
    LocalVariable(Handle<crate::LocalVariable>),
    /// `&expr`: take the address of a reference.
    AddressOf(Handle<Expression>),
    /// `*expr`: dereference a pointer.
    Deref(Handle<Expression>),
    /// `base[index]`.
    Access {
        base: Handle<Expression>,
        index: Handle<Expression>,
    },
    /// `base.name`: struct member or vector component.
    Member {
        base: Handle<Expression>,
        name: String,
    },
    /// Apply a unary operator.
    Unary {
        op: UnaryOp,
        expr: Handle<Expression>,
    },
    /// Apply a binary operator.
    Binary {
        op: BinaryOp,
        left: Handle<Expression>,
        right: Handle<Expression>,
    },
    /// Select between two values based on a condition.
    Select {
        condition: Handle<Expression>,
        accept: Handle<Expression>,
        reject: Handle<Expression>,
    },
    /// Type conversion, e.g. `u32(expr)`.
    As {
        expr: Handle<Expression>,
        kind: ScalarKind,
        convert: Option<Bytes>,
    },
    /// `arrayLength(pointer)` for a runtime-sized array.
    ArrayLength(Handle<Expression>),
    /// Call a function and produce its result.
    Call {
        function: Handle<crate::Function>,
        arguments: Vec<Handle<Expression>>,
    },
}

impl Expression {
    /// Returns all expression handles directly referenced by this expression,
    /// in evaluation order.
    pub fn operands(&self) -> Vec<Handle<Expression>> {
        match self {
            Self::Literal(_)
            | Self::FunctionArgument(_)
            | Self::GlobalVariable(_)
            | Self::LocalVariable(_) => vec![],

            Self::AddressOf(e) | Self::Deref(e) | Self::ArrayLength(e) => vec![*e],
            Self::Unary { expr, .. } | Self::As { expr, .. } => vec![*expr],
            Self::Member { base, .. } => vec![*base],
            Self::Access { base, index } => vec![*base, *index],
            Self::Binary { left, right, .. } => vec![*left, *right],
            Self::Select {
                condition,
                accept,
                reject,
            } => vec![*condition, *accept, *reject],
            Self::Compose { components, .. } => components.clone(),
            Self::Call { arguments, .. } => arguments.clone(),
        }
    }

    /// Replaces every direct operand equal to `old` with `new`.
    ///
    /// Returns `true` if any operand was replaced.
    pub fn replace_operand(&mut self, old: Handle<Expression>, new: Handle<Expression>) -> bool {
        let mut replaced = false;
        let mut swap = |slot: &mut Handle<Expression>| {
            if *slot == old {
                *slot = new;
                replaced = true;
            }
        };
        match self {
            Self::Literal(_)
            | Self::FunctionArgument(_)
            | Self::GlobalVariable(_)
            | Self::LocalVariable(_) => {}
            Self::AddressOf(e) | Self::Deref(e) | Self::ArrayLength(e) => swap(e),
            Self::Unary { expr, .. } | Self::As { expr, .. } => swap(expr),
            Self::Member { base, .. } => swap(base),
            Self::Access { base, index } => {
                swap(base);
                swap(index);
            }
            Self::Binary { left, right, .. } => {
                swap(left);
                swap(right);
            }
            Self::Select {
                condition,
                accept,
                reject,
            } => {
                swap(condition);
                swap(accept);
                swap(reject);
            }
            Self::Compose { components: args, .. } | Self::Call { arguments: args, .. } => {
                args.iter_mut().for_each(swap);
            }
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn literal_scalars() {
        assert_eq!(Literal::F32(1.0).scalar(), Scalar::F32);
        assert_eq!(Literal::I32(-1).scalar(), Scalar::I32);
        assert_eq!(Literal::U32(42).scalar(), Scalar::U32);
        assert_eq!(Literal::Bool(true).scalar(), Scalar::BOOL);
    }

    #[test]
    fn literal_as_integer() {
        assert_eq!(Literal::I32(-3).as_integer(), Some(-3));
        assert_eq!(Literal::U32(7).as_integer(), Some(7));
        assert_eq!(Literal::AbstractInt(9).as_integer(), Some(9));
        assert_eq!(Literal::F32(1.0).as_integer(), None);
    }

    #[test]
    fn operands_in_evaluation_order() {
        let mut exprs = Arena::new();
        let base = exprs.append(Expression::FunctionArgument(0));
        let index = exprs.append(Expression::Literal(Literal::U32(1)));
        let access = Expression::Access { base, index };
        assert_eq!(access.operands(), vec![base, index]);
    }

    #[test]
    fn replace_operand_rewrites_all_slots() {
        let mut exprs = Arena::new();
        let a = exprs.append(Expression::FunctionArgument(0));
        let b = exprs.append(Expression::FunctionArgument(1));
        let mut add = Expression::Binary {
            op: BinaryOp::Add,
            left: a,
            right: a,
        };
        assert!(add.replace_operand(a, b));
        assert_eq!(add.operands(), vec![b, b]);
        assert!(!add.replace_operand(a, b));
    }
}
