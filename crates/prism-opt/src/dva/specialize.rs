//! Specialization planning.
//!
//! Planning discovers every (function, shape tuple) pair reachable from
//! the bodies that survive the transform, instantiates one clone per pair
//! and fixes the handle each clone will occupy. It never touches the
//! module: types are interned into a working copy of the type arena, and
//! an unresolvable call site aborts the transform before any mutation.

use std::collections::{HashMap, HashSet, VecDeque};

use prism_ir::{
    AddressSpace, Expression, Function, FunctionArgument, GlobalVariable, Handle, Module, Type,
    UniqueArena, index_array_type, pointer_type,
};

use super::analyze::{BodyRef, Usage};
use super::chain::{AccessChain, AccessRoot, AccessShape, ShapeRoot, ShapeStep, SpecializationKey};
use super::error::{DvaError, TraceError, UnresolvedCall};
use super::rewrite;
use super::trace::ChainTracer;
use super::walk;

/// How a parameter of the generic function is passed to a clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamBinding {
    /// Copied unchanged, now at the given argument index.
    Kept(u32),
    /// Replaced by a root reference and an index array.
    Transformed(TransformedParam),
}

/// The clone-side form of a transformed pointer parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformedParam {
    pub root: RootBinding,
    /// Argument index of the `array<u32, N>` parameter, if the shape has
    /// index steps.
    pub indices: Option<u32>,
    pub steps: Vec<ShapeStep>,
}

/// How a clone reaches the root of a transformed parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootBinding {
    /// Names the module variable directly.
    Variable(Handle<GlobalVariable>),
    /// Dereferences the root pointer passed at the given argument index.
    Pointer(u32),
}

/// One resolved call to an affected function.
#[derive(Clone, Debug)]
pub struct CallSite {
    pub call: Handle<Expression>,
    pub key: SpecializationKey,
    /// The traced chain of each transformed argument, in parameter order.
    pub chains: Vec<AccessChain>,
}

/// A planned clone of an affected function.
#[derive(Clone, Debug)]
pub struct Specialization {
    pub key: SpecializationKey,
    /// The handle the clone receives once appended to the module.
    pub handle: Handle<Function>,
    /// The clone with parameters substituted, before its own call sites
    /// are rewritten.
    pub function: Function,
}

/// The complete set of clones required by a module.
#[derive(Debug)]
pub struct Plan {
    /// Working copy of the module's types, extended with the pointer and
    /// index-array types the clones need.
    pub types: UniqueArena<Type>,
    /// Clones in emission order: every clone follows the clones it calls.
    pub specializations: Vec<Specialization>,
    pub lookup: HashMap<SpecializationKey, Handle<Function>>,
}

/// A body scheduled for call-site discovery.
#[derive(Clone, Copy, Debug)]
enum Pending {
    Original(BodyRef),
    Clone(usize),
}

struct Discovered {
    key: SpecializationKey,
    function: Function,
    callees: Vec<usize>,
}

impl Plan {
    /// Discovers the specializations needed by `module`.
    ///
    /// Bodies are visited breadth-first starting from the unaffected
    /// callers and entry points; each new clone is queued in turn so that
    /// call chains through affected functions are followed transitively.
    /// Affected functions that no surviving body reaches are never cloned.
    pub fn build(module: &Module, usage: &Usage) -> Result<Self, DvaError> {
        let mut types = module.types.clone();
        let mut taken: HashSet<String> = module
            .functions
            .iter()
            .map(|(_, f)| f.label().to_string())
            .chain(module.entry_points.iter().map(|ep| ep.name.clone()))
            .collect();

        let mut discovered: Vec<Discovered> = Vec::new();
        let mut positions: HashMap<SpecializationKey, usize> = HashMap::new();
        let mut errors = Vec::new();

        let mut queue: VecDeque<Pending> = module
            .functions
            .iter()
            .filter(|&(handle, _)| !usage.is_affected(handle))
            .map(|(handle, _)| BodyRef::Function(handle))
            .chain((0..module.entry_points.len()).map(BodyRef::EntryPoint))
            .filter(|&body| usage.is_caller(body))
            .map(Pending::Original)
            .collect();

        while let Some(pending) = queue.pop_front() {
            let func = match pending {
                Pending::Original(BodyRef::Function(handle)) => &module.functions[handle],
                Pending::Original(BodyRef::EntryPoint(i)) => &module.entry_points[i].function,
                Pending::Clone(i) => &discovered[i].function,
            };
            let keys = {
                let mut tracer = ChainTracer::new(module, func);
                let mut keys = Vec::new();
                for call in walk::call_sites(func, |f| usage.is_affected(f)) {
                    match resolve_call(module, &types, usage, &mut tracer, func, call) {
                        Ok(site) => keys.push(site.key),
                        Err(unresolved) => errors.extend(unresolved),
                    }
                }
                keys
            };

            let mut callees = Vec::new();
            for key in keys {
                let position = match positions.get(&key) {
                    Some(&position) => position,
                    None => {
                        let name = clone_name(module, &key, &mut taken);
                        log::trace!(
                            "dva: '{}' specializes '{}'",
                            name,
                            module.functions[key.function].label()
                        );
                        let function = instantiate(module, &mut types, usage, &key, name);
                        discovered.push(Discovered {
                            key: key.clone(),
                            function,
                            callees: Vec::new(),
                        });
                        let position = discovered.len() - 1;
                        positions.insert(key, position);
                        queue.push_back(Pending::Clone(position));
                        position
                    }
                };
                callees.push(position);
            }
            if let Pending::Clone(i) = pending {
                discovered[i].callees = callees;
            }
        }

        if !errors.is_empty() {
            return Err(DvaError::Unresolved(errors));
        }

        let order = emission_order(&discovered);
        let base = module.functions.len();
        let mut slots: Vec<Option<Discovered>> = discovered.into_iter().map(Some).collect();
        let mut specializations = Vec::with_capacity(order.len());
        let mut lookup = HashMap::with_capacity(order.len());
        for (offset, position) in order.into_iter().enumerate() {
            let Some(Discovered { key, function, .. }) = slots[position].take() else {
                continue;
            };
            let index = base + offset;
            let handle = Handle::from_usize(index)
                .unwrap_or_else(|| panic!("arena overflow: {index} functions exceeds u32::MAX"));
            lookup.insert(key.clone(), handle);
            specializations.push(Specialization {
                key,
                handle,
                function,
            });
        }

        log::debug!(
            "dva: planned {} specialization(s)",
            specializations.len()
        );
        Ok(Self {
            types,
            specializations,
            lookup,
        })
    }
}

impl Plan {
    /// Returns `true` if applying the plan would only rename functions.
    ///
    /// That is the case when every affected function gets exactly one
    /// clone, and each of its transformed parameters already points at a
    /// whole function or private root: the shape of every parameter of a
    /// previously specialized function.
    pub fn is_identity(&self, module: &Module, usage: &Usage) -> bool {
        let mut counts: HashMap<Handle<Function>, usize> = HashMap::new();
        for specialization in &self.specializations {
            *counts.entry(specialization.key.function).or_default() += 1;
        }
        usage.affected().all(|handle| counts.get(&handle) == Some(&1))
            && self
                .specializations
                .iter()
                .all(|s| is_identity_key(module, &self.types, usage, &s.key))
    }
}

fn is_identity_key(
    module: &Module,
    types: &UniqueArena<Type>,
    usage: &Usage,
    key: &SpecializationKey,
) -> bool {
    let generic = &module.functions[key.function];
    usage
        .transformed_params(key.function)
        .iter()
        .zip(&key.shapes)
        .all(|(&param, shape)| {
            let pointer = generic
                .arguments
                .get(param as usize)
                .and_then(|arg| types[arg.ty].inner.pointer());
            match (&shape.root, pointer) {
                (ShapeRoot::Scoped { space, ty }, Some((pointee, param_space))) => {
                    shape.steps.is_empty() && *space == param_space && *ty == pointee
                }
                _ => false,
            }
        })
}

/// Post-order over the clone call graph, roots in discovery order.
fn emission_order(discovered: &[Discovered]) -> Vec<usize> {
    fn visit(at: usize, discovered: &[Discovered], seen: &mut [bool], order: &mut Vec<usize>) {
        if std::mem::replace(&mut seen[at], true) {
            return;
        }
        for &callee in &discovered[at].callees {
            visit(callee, discovered, seen, order);
        }
        order.push(at);
    }

    let mut seen = vec![false; discovered.len()];
    let mut order = Vec::with_capacity(discovered.len());
    for at in 0..discovered.len() {
        visit(at, discovered, &mut seen, &mut order);
    }
    order
}

/// Traces the transformed arguments of `call` and derives its key.
///
/// Every unresolvable argument is reported, not just the first.
pub fn resolve_call(
    module: &Module,
    types: &UniqueArena<Type>,
    usage: &Usage,
    tracer: &mut ChainTracer<'_>,
    func: &Function,
    call: Handle<Expression>,
) -> Result<CallSite, Vec<UnresolvedCall>> {
    let Expression::Call {
        function,
        arguments,
    } = &func.expressions[call]
    else {
        // Not a call: nothing to report.
        return Err(Vec::new());
    };

    let mut chains = Vec::new();
    let mut shapes = Vec::new();
    let mut errors = Vec::new();
    for &param in usage.transformed_params(*function) {
        let traced = match arguments.get(param as usize) {
            Some(&arg) => tracer.trace(arg).and_then(|chain| {
                let shape = resolve_shape(module, types, func, &chain)?;
                Ok((chain, shape))
            }),
            None => Err(TraceError::NotAPointer(call)),
        };
        match traced {
            Ok((chain, shape)) => {
                chains.push(chain);
                shapes.push(shape);
            }
            Err(reason) => errors.push(UnresolvedCall {
                caller: func.label().to_string(),
                callee: module.functions[*function].label().to_string(),
                argument: param,
                call,
                span: func.spans.get(&call).copied(),
                reason,
            }),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(CallSite {
        call,
        key: SpecializationKey {
            function: *function,
            shapes,
        },
        chains,
    })
}

/// Erases the index values of `chain`, traced in `func`.
pub fn resolve_shape(
    module: &Module,
    types: &UniqueArena<Type>,
    func: &Function,
    chain: &AccessChain,
) -> Result<AccessShape, TraceError> {
    let root = match chain.root {
        AccessRoot::ModuleVariable(var) => {
            let var_decl = &module.global_variables[var];
            if var_decl.space.is_shared() {
                ShapeRoot::Variable(var)
            } else {
                ShapeRoot::Scoped {
                    space: var_decl.space,
                    ty: var_decl.ty,
                }
            }
        }
        AccessRoot::LocalVariable(local) => {
            let decl = &func.local_variables[local];
            let ty = decl
                .ty
                .ok_or_else(|| TraceError::UntypedRoot(decl.name.clone()))?;
            ShapeRoot::Scoped {
                space: AddressSpace::Function,
                ty,
            }
        }
        AccessRoot::Parameter(index) => {
            let pointer = func
                .arguments
                .get(index as usize)
                .and_then(|arg| types[arg.ty].inner.pointer());
            match pointer {
                Some((ty, space)) if !space.is_shared() => ShapeRoot::Scoped { space, ty },
                _ => return Err(TraceError::UntransformedParameter(index)),
            }
        }
    };
    Ok(AccessShape {
        root,
        steps: chain.shape_steps(),
    })
}

/// `<function>_<shape>_<shape>…`, suffixed with a counter when taken.
fn clone_name(module: &Module, key: &SpecializationKey, taken: &mut HashSet<String>) -> String {
    let mut name = module.functions[key.function].label().to_string();
    for shape in &key.shapes {
        name.push('_');
        name.push_str(&shape.mangle(&module.global_variables));
    }
    if taken.insert(name.clone()) {
        return name;
    }
    (1..)
        .map(|n| format!("{name}_{n}"))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or(name)
}

/// Builds the clone of `key.function` for the shapes of `key`.
fn instantiate(
    module: &Module,
    types: &mut UniqueArena<Type>,
    usage: &Usage,
    key: &SpecializationKey,
    name: String,
) -> Function {
    let generic = &module.functions[key.function];
    let shapes: HashMap<u32, &AccessShape> = usage
        .transformed_params(key.function)
        .iter()
        .copied()
        .zip(&key.shapes)
        .collect();

    let mut arguments = Vec::with_capacity(generic.arguments.len());
    let mut bindings = Vec::with_capacity(generic.arguments.len());
    for (i, arg) in generic.arguments.iter().enumerate() {
        let Some(shape) = shapes.get(&(i as u32)) else {
            bindings.push(ParamBinding::Kept(arguments.len() as u32));
            arguments.push(arg.clone());
            continue;
        };

        let param = arg.name.clone().unwrap_or_else(|| format!("arg{i}"));
        let root = match shape.root {
            ShapeRoot::Variable(var) => RootBinding::Variable(var),
            ShapeRoot::Scoped { space, ty } => {
                arguments.push(FunctionArgument {
                    name: Some(format!("{param}_base")),
                    ty: pointer_type(types, ty, space),
                    binding: None,
                });
                RootBinding::Pointer(arguments.len() as u32 - 1)
            }
        };
        let count = shape.index_count();
        let indices = (count > 0).then(|| {
            arguments.push(FunctionArgument {
                name: Some(format!("{param}_indices")),
                ty: index_array_type(types, count),
                binding: None,
            });
            arguments.len() as u32 - 1
        });
        bindings.push(ParamBinding::Transformed(TransformedParam {
            root,
            indices,
            steps: shape.steps.clone(),
        }));
    }

    let mut function = generic.clone();
    function.name = Some(name);
    function.arguments = arguments;
    rewrite::substitute_parameters(&mut function, &bindings);
    rewrite::fold_derefs(&mut function);
    function
}
