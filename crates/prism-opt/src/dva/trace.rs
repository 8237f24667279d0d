//! Resolves pointer-valued expressions to access chains.
//!
//! Tracing walks backwards from a pointer expression: `&e` decomposes the
//! accessors of `e`, pointer `let` aliases are replaced by their
//! initializers, and forwarded pointer parameters become
//! [`AccessRoot::Parameter`] roots. Results are memoized per node handle so
//! an alias shared by several call sites is unwound once.

use std::collections::HashMap;

use prism_ir::{Expression, Function, Handle, LocalKind, Module};

use super::chain::{AccessChain, AccessRoot, AccessStep, IndexValue};
use super::error::TraceError;

/// Traces pointer expressions within one function body.
pub struct ChainTracer<'a> {
    module: &'a Module,
    func: &'a Function,
    memo: HashMap<Handle<Expression>, Result<AccessChain, TraceError>>,
}

impl<'a> ChainTracer<'a> {
    pub fn new(module: &'a Module, func: &'a Function) -> Self {
        Self {
            module,
            func,
            memo: HashMap::new(),
        }
    }

    /// Resolves the pointer value produced by `expr`.
    pub fn trace(&mut self, expr: Handle<Expression>) -> Result<AccessChain, TraceError> {
        if let Some(cached) = self.memo.get(&expr) {
            return cached.clone();
        }
        let result = self.pointer(expr);
        self.memo.insert(expr, result.clone());
        result
    }

    fn pointer(&mut self, expr: Handle<Expression>) -> Result<AccessChain, TraceError> {
        let func = self.func;
        match &func.expressions[expr] {
            Expression::AddressOf(target) => self.reference(*target),
            Expression::LocalVariable(local) => {
                let decl = &func.local_variables[*local];
                match (decl.kind, decl.init) {
                    (LocalKind::Let, Some(init)) => self.trace(init),
                    (LocalKind::Let, None) => {
                        Err(TraceError::UninitializedAlias(decl.name.clone()))
                    }
                    // A `var` never holds a pointer.
                    (LocalKind::Var, _) => Err(TraceError::NotAPointer(expr)),
                }
            }
            Expression::FunctionArgument(index) => {
                Ok(AccessChain::new(AccessRoot::Parameter(*index)))
            }
            Expression::Call { function, .. } => {
                let name = self
                    .module
                    .functions
                    .try_get(*function)
                    .map_or("_", Function::label);
                Err(TraceError::CallResult(name.to_string()))
            }
            _ => Err(TraceError::NotAPointer(expr)),
        }
    }

    fn reference(&mut self, expr: Handle<Expression>) -> Result<AccessChain, TraceError> {
        let func = self.func;
        match &func.expressions[expr] {
            Expression::GlobalVariable(var) => {
                Ok(AccessChain::new(AccessRoot::ModuleVariable(*var)))
            }
            Expression::LocalVariable(local) => match func.local_variables[*local].kind {
                LocalKind::Var => Ok(AccessChain::new(AccessRoot::LocalVariable(*local))),
                // Indexing through a pointer `let` dereferences it implicitly.
                LocalKind::Let => self.trace(expr),
            },
            Expression::FunctionArgument(_) => self.trace(expr),
            Expression::Deref(pointer) => self.trace(*pointer),
            Expression::Access { base, index } => {
                let (base, index) = (*base, *index);
                let mut chain = self.reference(base)?;
                let value = match &func.expressions[index] {
                    Expression::Literal(lit) => match lit.as_integer() {
                        Some(value) => IndexValue::Constant(
                            u32::try_from(value).map_err(|_| TraceError::IndexOutOfRange(value))?,
                        ),
                        None => IndexValue::Dynamic(index),
                    },
                    _ => IndexValue::Dynamic(index),
                };
                chain.steps.push(AccessStep::Index(value));
                Ok(chain)
            }
            Expression::Member { base, name } => {
                let mut chain = self.reference(*base)?;
                chain.steps.push(AccessStep::Member(name.clone()));
                Ok(chain)
            }
            _ => Err(TraceError::NotAReference(expr)),
        }
    }
}
