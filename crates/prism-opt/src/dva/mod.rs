//! Direct variable access.
//!
//! Eliminates pointer parameters into transformed address spaces. Each
//! function taking such a pointer is replaced by specializations, one per
//! distinct access shape seen at its call sites: the specialization names
//! the root variable itself (or receives a pointer to a function or
//! private root) and takes the dynamic part of the access as an
//! `array<u32, N>` of indices.
//!
//! The transform runs in stages:
//!
//! 1. [`Usage`] finds the affected functions.
//! 2. [`Plan`] traces every call site with a [`ChainTracer`] and
//!    instantiates one clone per (function, shape tuple) key.
//! 3. Call sites in the surviving bodies and in the clones are redirected
//!    to their specialization; index expressions that must not be
//!    re-evaluated are hoisted into `let` temporaries first.
//! 4. The generic functions and pointer aliases left without readers are
//!    removed.

mod analyze;
mod chain;
mod error;
mod hoist;
mod prune;
mod rewrite;
mod specialize;
mod trace;
mod walk;

pub use analyze::{BodyRef, Usage};
pub use chain::{
    AccessChain, AccessRoot, AccessShape, AccessStep, IndexValue, ShapeRoot, ShapeStep,
    SpecializationKey,
};
pub use error::{DvaError, TraceError, UnresolvedCall};
pub use hoist::{Hoisted, InsertionPoint, hoist};
pub use specialize::{Plan, Specialization};
pub use trace::ChainTracer;

use prism_ir::{AddressSpace, Module};

use crate::{Pass, PassError};

/// Which scoped address spaces are transformed.
///
/// Pointers into `uniform`, `storage` and `workgroup` variables are always
/// transformed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Transform pointers into `private` variables.
    pub transform_private: bool,
    /// Transform pointers into function-local variables.
    pub transform_function: bool,
}

impl Options {
    pub fn is_eligible(&self, space: AddressSpace) -> bool {
        match space {
            AddressSpace::Private => self.transform_private,
            AddressSpace::Function => self.transform_function,
            AddressSpace::Workgroup | AddressSpace::Uniform | AddressSpace::Storage { .. } => true,
        }
    }
}

/// The direct variable access pass.
#[derive(Debug, Default)]
pub struct DirectVariableAccess {
    options: Options,
}

impl DirectVariableAccess {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl Pass for DirectVariableAccess {
    fn name(&self) -> &str {
        "direct-variable-access"
    }

    fn run(&self, module: &mut Module) -> Result<bool, PassError> {
        transform(module, &self.options).map_err(|source| PassError::new(self.name(), source))
    }
}

/// Runs the transform on `module`.
///
/// Returns `Ok(false)` when no function takes a pointer into a transformed
/// address space. On error the module is left as it was.
pub fn transform(module: &mut Module, options: &Options) -> Result<bool, DvaError> {
    let usage = Usage::new(module, options);
    if usage.is_empty() {
        return Ok(false);
    }

    let plan = Plan::build(module, &usage)?;
    if plan.is_identity(module, &usage) {
        log::debug!("dva: every pointer parameter already names a whole root");
        return Ok(false);
    }
    let Plan {
        mut types,
        mut specializations,
        lookup,
    } = plan;

    // Rewrite into copies so that a failure leaves the module untouched.
    let mut functions = Vec::new();
    let mut entry_points = Vec::new();
    {
        let mut rewriter = rewrite::CallRewriter {
            module: &*module,
            usage: &usage,
            lookup: &lookup,
            types: &mut types,
        };
        for (handle, func) in module.functions.iter() {
            if usage.is_affected(handle) || !usage.is_caller(BodyRef::Function(handle)) {
                continue;
            }
            let mut func = func.clone();
            rewriter.rewrite(&mut func)?;
            functions.push((handle, func));
        }
        for (index, ep) in module.entry_points.iter().enumerate() {
            if !usage.is_caller(BodyRef::EntryPoint(index)) {
                continue;
            }
            let mut func = ep.function.clone();
            rewriter.rewrite(&mut func)?;
            entry_points.push((index, func));
        }
        for specialization in &mut specializations {
            rewriter.rewrite(&mut specialization.function)?;
        }
    }

    let mut aliases = 0;
    for (_, func) in &mut functions {
        aliases += prune::remove_dead_aliases(func, &types);
    }
    for (_, func) in &mut entry_points {
        aliases += prune::remove_dead_aliases(func, &types);
    }
    for specialization in &mut specializations {
        aliases += prune::remove_dead_aliases(&mut specialization.function, &types);
    }
    log::debug!("dva: removed {aliases} dead pointer alias(es)");

    module.types = types;
    for (handle, func) in functions {
        module.functions[handle] = func;
    }
    for (index, func) in entry_points {
        module.entry_points[index].function = func;
    }
    for specialization in specializations {
        let handle = module.functions.append(specialization.function);
        debug_assert_eq!(handle, specialization.handle);
    }
    prune::remove_generic_functions(module, &usage);
    Ok(true)
}
