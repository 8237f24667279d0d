//! Body rewriting: parameter substitution in clones and call-site
//! rewriting in every body that calls an affected function.

use std::collections::{HashMap, HashSet};

use prism_ir::{
    Expression, Function, Handle, LocalKind, Literal, Module, ScalarKind, Type, TypeInner,
    UniqueArena, index_array_type,
};

use super::analyze::Usage;
use super::chain::{AccessChain, AccessRoot, IndexValue, ShapeStep, SpecializationKey};
use super::error::DvaError;
use super::hoist;
use super::specialize::{self, CallSite, ParamBinding, RootBinding, TransformedParam};
use super::trace::ChainTracer;
use super::walk;

/// Rewrites every reference to a parameter of a freshly cloned function.
///
/// Kept parameters are renumbered. Each reference to a transformed
/// parameter becomes `&root.m[indices[0]]…`, rebuilt from the shape, with
/// `root` the module variable or `*base` for a root pointer parameter.
pub fn substitute_parameters(func: &mut Function, bindings: &[ParamBinding]) {
    let references: Vec<(Handle<Expression>, u32)> = func
        .expressions
        .iter()
        .filter_map(|(handle, expr)| match *expr {
            Expression::FunctionArgument(index) => Some((handle, index)),
            _ => None,
        })
        .collect();

    for (handle, index) in references {
        match bindings.get(index as usize) {
            Some(ParamBinding::Kept(new)) => {
                func.expressions[handle] = Expression::FunctionArgument(*new);
            }
            Some(ParamBinding::Transformed(param)) => {
                let access = build_access(func, param, handle);
                func.expressions[handle] = Expression::AddressOf(access);
            }
            None => {}
        }
    }
}

fn build_access(
    func: &mut Function,
    param: &TransformedParam,
    origin: Handle<Expression>,
) -> Handle<Expression> {
    let span = func.spans.get(&origin).copied();
    let append = |func: &mut Function, expr| {
        let handle = func.expressions.append(expr);
        if let Some(span) = span {
            func.spans.insert(handle, span);
        }
        handle
    };

    let mut current = match param.root {
        RootBinding::Variable(var) => append(func, Expression::GlobalVariable(var)),
        RootBinding::Pointer(base) => {
            let pointer = append(func, Expression::FunctionArgument(base));
            append(func, Expression::Deref(pointer))
        }
    };
    let mut slot = 0;
    for step in &param.steps {
        current = match (step, param.indices) {
            (ShapeStep::Member(name), _) => append(
                func,
                Expression::Member {
                    base: current,
                    name: name.clone(),
                },
            ),
            (ShapeStep::Index, Some(indices)) => {
                let array = append(func, Expression::FunctionArgument(indices));
                let position = append(func, Expression::Literal(Literal::U32(slot)));
                slot += 1;
                let index = append(
                    func,
                    Expression::Access {
                        base: array,
                        index: position,
                    },
                );
                append(func, Expression::Access { base: current, index })
            }
            // Shapes with index steps always come with an index array.
            (ShapeStep::Index, None) => current,
        };
    }
    current
}

/// Folds `*&e` to `e` and `&*p` to `p` until none remain.
pub fn fold_derefs(func: &mut Function) -> usize {
    let mut folded = 0;
    loop {
        let mut changed = false;
        let handles: Vec<_> = func.expressions.iter().map(|(h, _)| h).collect();
        for handle in handles {
            let replacement = match func.expressions[handle] {
                Expression::Deref(pointer) => match func.expressions[pointer] {
                    Expression::AddressOf(target) => Some(target),
                    _ => None,
                },
                Expression::AddressOf(target) => match func.expressions[target] {
                    Expression::Deref(pointer) => Some(pointer),
                    _ => None,
                },
                _ => None,
            };
            if let Some(inner) = replacement {
                func.expressions[handle] = func.expressions[inner].clone();
                changed = true;
                folded += 1;
            }
        }
        if !changed {
            return folded;
        }
    }
}

/// Shared state for rewriting call sites across bodies.
pub struct CallRewriter<'a> {
    pub module: &'a Module,
    pub usage: &'a Usage,
    pub lookup: &'a HashMap<SpecializationKey, Handle<Function>>,
    pub types: &'a mut UniqueArena<Type>,
}

impl CallRewriter<'_> {
    /// Redirects every call to an affected function in `func` to its
    /// specialization, hoisting dynamic indices first where evaluating
    /// them at the call would change how often or when they run.
    ///
    /// Returns the number of rewritten call sites.
    pub fn rewrite(&mut self, func: &mut Function) -> Result<usize, DvaError> {
        let sites = self.resolve(func)?;
        if sites.is_empty() {
            return Ok(0);
        }

        let mut seen = HashSet::new();
        let mut requests = Vec::new();
        for site in &sites {
            for chain in &site.chains {
                for index in chain.dynamic_indices() {
                    if needs_hoist(func, site.call, index) && seen.insert(index) {
                        requests.push(index);
                    }
                }
            }
        }
        let hoisted = hoist::hoist(func, &requests);

        for site in &sites {
            let call = hoisted.moved.get(&site.call).copied().unwrap_or(site.call);
            self.redirect(func, call, site)?;
        }
        log::debug!(
            "dva: rewrote {} call site(s) in '{}'",
            sites.len(),
            func.label()
        );
        Ok(sites.len())
    }

    fn resolve(&self, func: &Function) -> Result<Vec<CallSite>, DvaError> {
        let mut tracer = ChainTracer::new(self.module, func);
        let mut sites = Vec::new();
        let mut errors = Vec::new();
        for call in walk::call_sites(func, |f| self.usage.is_affected(f)) {
            let resolved = specialize::resolve_call(
                self.module,
                &*self.types,
                self.usage,
                &mut tracer,
                func,
                call,
            );
            match resolved {
                Ok(site) => sites.push(site),
                Err(unresolved) => errors.extend(unresolved),
            }
        }
        if errors.is_empty() {
            Ok(sites)
        } else {
            Err(DvaError::Unresolved(errors))
        }
    }

    fn redirect(
        &mut self,
        func: &mut Function,
        call: Handle<Expression>,
        site: &CallSite,
    ) -> Result<(), DvaError> {
        let callee = site.key.function;
        let Some(&target) = self.lookup.get(&site.key) else {
            return Err(DvaError::MissingSpecialization {
                caller: func.label().to_string(),
                callee: self.module.functions[callee].label().to_string(),
            });
        };
        let Expression::Call { arguments, .. } = &func.expressions[call] else {
            return Ok(());
        };
        let arguments = arguments.clone();
        let transformed = self.usage.transformed_params(callee);

        let mut new_arguments = Vec::with_capacity(arguments.len());
        for (i, &argument) in arguments.iter().enumerate() {
            let Some(position) = transformed.iter().position(|&p| p as usize == i) else {
                new_arguments.push(argument);
                continue;
            };
            let chain = &site.chains[position];
            let shape = &site.key.shapes[position];
            if shape.has_root_pointer() {
                new_arguments.push(root_pointer(func, chain));
            }
            let count = shape.index_count();
            if count > 0 {
                let ty = index_array_type(self.types, count);
                new_arguments.push(index_array(func, &*self.types, chain, ty));
            }
        }

        log::trace!(
            "dva: call {:?} in '{}' now targets {:?}",
            call,
            func.label(),
            target
        );
        func.expressions[call] = Expression::Call {
            function: target,
            arguments: new_arguments,
        };
        Ok(())
    }
}

/// The pointer passed as the root of a scoped chain.
fn root_pointer(func: &mut Function, chain: &AccessChain) -> Handle<Expression> {
    match chain.root {
        AccessRoot::ModuleVariable(var) => {
            let reference = func.expressions.append(Expression::GlobalVariable(var));
            func.expressions.append(Expression::AddressOf(reference))
        }
        AccessRoot::LocalVariable(local) => {
            let reference = func.expressions.append(Expression::LocalVariable(local));
            func.expressions.append(Expression::AddressOf(reference))
        }
        AccessRoot::Parameter(index) => {
            func.expressions.append(Expression::FunctionArgument(index))
        }
    }
}

/// `array<u32, N>(…)` holding the index values of `chain`.
fn index_array(
    func: &mut Function,
    types: &UniqueArena<Type>,
    chain: &AccessChain,
    ty: Handle<Type>,
) -> Handle<Expression> {
    let components = chain
        .indices()
        .map(|value| match value {
            IndexValue::Constant(v) => {
                func.expressions.append(Expression::Literal(Literal::U32(v)))
            }
            IndexValue::Dynamic(expr) if is_slot_read(func, types, expr) => expr,
            IndexValue::Dynamic(expr) => func.expressions.append(Expression::As {
                expr,
                kind: ScalarKind::Uint,
                convert: Some(4),
            }),
        })
        .collect();
    func.expressions.append(Expression::Compose { ty, components })
}

/// A dynamic index must be hoisted if it has side effects, or if it is
/// evaluated away from the call (through an alias) and might read a value
/// that changes in between.
fn needs_hoist(func: &Function, call: Handle<Expression>, index: Handle<Expression>) -> bool {
    func.has_side_effects(index) || (!walk::contains(func, call, index) && !is_stable(func, index))
}

/// Reads of values that cannot change once the function is running.
fn is_stable(func: &Function, expr: Handle<Expression>) -> bool {
    match &func.expressions[expr] {
        Expression::Literal(_) | Expression::FunctionArgument(_) => true,
        Expression::LocalVariable(local) => func.local_variables[*local].kind == LocalKind::Let,
        Expression::As { expr, .. } => is_stable(func, *expr),
        Expression::Access { base, index } => {
            matches!(func.expressions[*base], Expression::FunctionArgument(_))
                && matches!(func.expressions[*index], Expression::Literal(_))
        }
        _ => false,
    }
}

/// `indices[k]` on an index-array parameter of the enclosing clone.
fn is_slot_read(func: &Function, types: &UniqueArena<Type>, expr: Handle<Expression>) -> bool {
    let Expression::Access { base, index } = func.expressions[expr] else {
        return false;
    };
    let Expression::FunctionArgument(param) = func.expressions[base] else {
        return false;
    };
    let is_index_array = func
        .arguments
        .get(param as usize)
        .is_some_and(|arg| matches!(types[arg.ty].inner, TypeInner::Array { .. }));
    is_index_array && matches!(func.expressions[index], Expression::Literal(Literal::U32(_)))
}
