//! Removal of generic functions and pointer aliases made obsolete by
//! specialization.

use std::collections::HashSet;

use prism_ir::{
    Block, Expression, Function, Handle, HandleMap, LocalKind, LocalVariable, Module, Statement,
    Type, UniqueArena,
};

use super::analyze::Usage;
use super::walk;

/// Deletes every affected function and renumbers call targets.
///
/// Entry points live outside the function arena and are never removed.
/// Returns the number of deleted functions.
pub fn remove_generic_functions(module: &mut Module, usage: &Usage) -> usize {
    let map = module
        .functions
        .compact(|handle, _| !usage.is_affected(handle));
    let removed = map.removed();
    if removed == 0 {
        return 0;
    }

    for (_, func) in module.functions.iter_mut() {
        remap_calls(func, &map);
    }
    for ep in &mut module.entry_points {
        remap_calls(&mut ep.function, &map);
    }
    log::debug!("dva: removed {removed} generic function(s)");
    removed
}

fn remap_calls(func: &mut Function, map: &HandleMap<Function>) {
    for (_, expr) in func.expressions.iter_mut() {
        if let Expression::Call { function, .. } = expr {
            if let Some(new) = map.get(*function) {
                *function = new;
            }
        }
    }
}

/// Deletes pointer `let` declarations nobody reads, repeating until none
/// are left so that chains of aliases disappear together.
///
/// Returns the number of deleted declarations.
pub fn remove_dead_aliases(func: &mut Function, types: &UniqueArena<Type>) -> usize {
    let mut removed = 0;
    loop {
        let live = walk::live_expressions(func);
        let read: HashSet<Handle<LocalVariable>> = live
            .iter()
            .filter_map(|&handle| match func.expressions[handle] {
                Expression::LocalVariable(local) => Some(local),
                _ => None,
            })
            .collect();

        let dead: HashSet<Handle<LocalVariable>> = func
            .local_variables
            .iter()
            .filter(|&(handle, local)| {
                !read.contains(&handle)
                    && is_pointer_alias(func, types, local)
                    && local.init.is_none_or(|init| !func.has_side_effects(init))
            })
            .map(|(handle, _)| handle)
            .collect();

        let count = remove_declarations(&mut func.body, &dead);
        if count == 0 {
            return removed;
        }
        removed += count;
    }
}

fn is_pointer_alias(func: &Function, types: &UniqueArena<Type>, local: &LocalVariable) -> bool {
    if local.kind != LocalKind::Let {
        return false;
    }
    if let Some(ty) = local.ty {
        return types[ty].inner.pointer().is_some();
    }
    local
        .init
        .is_some_and(|init| is_pointer_value(func, types, init))
}

fn is_pointer_value(func: &Function, types: &UniqueArena<Type>, expr: Handle<Expression>) -> bool {
    match func.expressions[expr] {
        Expression::AddressOf(_) => true,
        Expression::FunctionArgument(index) => func
            .arguments
            .get(index as usize)
            .is_some_and(|arg| types[arg.ty].inner.pointer().is_some()),
        Expression::LocalVariable(local) => {
            is_pointer_alias(func, types, &func.local_variables[local])
        }
        _ => false,
    }
}

fn remove_declarations(block: &mut Block, dead: &HashSet<Handle<LocalVariable>>) -> usize {
    if dead.is_empty() {
        return 0;
    }
    let mut removed = 0;
    block.retain_mut(|stmt| match stmt {
        Statement::Local(local) if dead.contains(&*local) => {
            removed += 1;
            false
        }
        Statement::If { accept, reject, .. } => {
            removed += remove_declarations(accept, dead);
            removed += remove_declarations(reject, dead);
            true
        }
        Statement::Loop {
            body, continuing, ..
        } => {
            removed += remove_declarations(body, dead);
            removed += remove_declarations(continuing, dead);
            true
        }
        Statement::For { init, body, .. } => {
            if let Some(Statement::Local(local)) = init.as_deref() {
                if dead.contains(local) {
                    *init = None;
                    removed += 1;
                }
            }
            removed += remove_declarations(body, dead);
            true
        }
        Statement::While { body, .. } => {
            removed += remove_declarations(body, dead);
            true
        }
        Statement::Block(inner) => {
            removed += remove_declarations(inner, dead);
            true
        }
        _ => true,
    });
    removed
}
