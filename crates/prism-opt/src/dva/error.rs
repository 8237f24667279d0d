//! Errors reported by the direct variable access transform.

use std::fmt;

use prism_ir::{Expression, Handle, Span};

/// Why a pointer expression could not be traced back to a variable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceError {
    /// The pointer is the result of a call, whose origin is opaque.
    #[error("pointer is produced by a call to '{0}'")]
    CallResult(String),
    /// The expression does not construct or forward a pointer.
    #[error("expression {0:?} is not a pointer")]
    NotAPointer(Handle<Expression>),
    /// The expression does not denote memory that can have its address taken.
    #[error("expression {0:?} is not a memory reference")]
    NotAReference(Handle<Expression>),
    /// A pointer `let` without an initializer.
    #[error("pointer alias '{0}' has no initializer")]
    UninitializedAlias(String),
    /// A function or private root whose type the front end did not record.
    #[error("root variable '{0}' has no declared type")]
    UntypedRoot(String),
    /// A forwarded pointer parameter that no caller context describes.
    #[error("parameter {0} is not a pointer into a transformed address space")]
    UntransformedParameter(u32),
    /// A constant index that cannot be passed as a `u32` slot.
    #[error("constant index {0} does not fit in u32")]
    IndexOutOfRange(i64),
}

/// A call site whose pointer argument could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedCall {
    /// Name of the function containing the call.
    pub caller: String,
    /// Name of the called function.
    pub callee: String,
    /// Index of the offending argument.
    pub argument: u32,
    /// The call expression in the caller.
    pub call: Handle<Expression>,
    /// Source location of the call, when known.
    pub span: Option<Span>,
    pub reason: TraceError,
}

impl fmt::Display for UnresolvedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in '{}': argument {} of call to '{}'",
            self.caller, self.argument, self.callee
        )?;
        if let Some(span) = self.span {
            write!(f, " at {}..{}", span.start, span.end)?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Errors from the direct variable access transform.
#[derive(Debug, thiserror::Error)]
pub enum DvaError {
    /// One or more call sites pass pointers that cannot be traced.
    #[error(
        "{} call site(s) pass pointers that cannot be traced to a variable: {}",
        .0.len(),
        format_calls(.0)
    )]
    Unresolved(Vec<UnresolvedCall>),
    /// A call site needed a specialization that planning did not produce.
    #[error("no specialization of '{callee}' planned for call in '{caller}'")]
    MissingSpecialization { caller: String, callee: String },
}

fn format_calls(calls: &[UnresolvedCall]) -> String {
    calls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
