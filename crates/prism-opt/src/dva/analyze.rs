//! Usage analysis: which functions take pointers that must be eliminated,
//! and which bodies call them.

use std::collections::{BTreeMap, BTreeSet};

use prism_ir::{Expression, Function, Handle, Module};

use super::Options;

/// A function body in the module: a helper function or an entry point.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum BodyRef {
    Function(Handle<Function>),
    EntryPoint(usize),
}

/// Result of scanning a module for transformable pointer parameters.
#[derive(Debug, Default)]
pub struct Usage {
    /// Affected functions, mapped to the indices of their pointer
    /// parameters in eligible address spaces (ascending).
    affected: BTreeMap<Handle<Function>, Vec<u32>>,
    /// Bodies containing at least one call to an affected function.
    callers: BTreeSet<BodyRef>,
}

impl Usage {
    /// Scans `module` under the eligibility rules of `options`.
    pub fn new(module: &Module, options: &Options) -> Self {
        let mut usage = Self::default();

        for (handle, func) in module.functions.iter() {
            let params: Vec<u32> = func
                .arguments
                .iter()
                .enumerate()
                .filter(|(_, arg)| {
                    module.types[arg.ty]
                        .inner
                        .pointer()
                        .is_some_and(|(_, space)| options.is_eligible(space))
                })
                .map(|(i, _)| i as u32)
                .collect();
            if !params.is_empty() {
                usage.affected.insert(handle, params);
            }
        }

        if usage.affected.is_empty() {
            return usage;
        }

        for (handle, func) in module.functions.iter() {
            if usage.calls_affected(func) {
                usage.callers.insert(BodyRef::Function(handle));
            }
        }
        for (index, ep) in module.entry_points.iter().enumerate() {
            if usage.calls_affected(&ep.function) {
                usage.callers.insert(BodyRef::EntryPoint(index));
            }
        }

        log::debug!(
            "dva: {} affected function(s), {} calling body(ies)",
            usage.affected.len(),
            usage.callers.len()
        );
        usage
    }

    /// Returns `true` if no function needs to be transformed.
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }

    pub fn is_affected(&self, func: Handle<Function>) -> bool {
        self.affected.contains_key(&func)
    }

    /// Indices of the transformed parameters of `func`, or an empty slice
    /// for unaffected functions.
    pub fn transformed_params(&self, func: Handle<Function>) -> &[u32] {
        self.affected.get(&func).map_or(&[], Vec::as_slice)
    }

    /// Iterates over the affected functions in handle order.
    pub fn affected(&self) -> impl Iterator<Item = Handle<Function>> + '_ {
        self.affected.keys().copied()
    }

    /// Returns `true` if `body` calls an affected function.
    pub fn is_caller(&self, body: BodyRef) -> bool {
        self.callers.contains(&body)
    }

    fn calls_affected(&self, func: &Function) -> bool {
        func.expressions.iter().any(|(_, expr)| match expr {
            Expression::Call { function, .. } => self.is_affected(*function),
            _ => false,
        })
    }
}
