//! Traversal helpers over statement trees and expression arenas.

use std::collections::HashSet;

use prism_ir::{Expression, Function, Handle, Statement};

/// Returns the expressions a statement evaluates itself, including the
/// initializer of a declared local and the clauses of a `for` header.
/// Nested blocks are not included.
pub fn statement_roots(func: &Function, stmt: &Statement) -> Vec<Handle<Expression>> {
    match stmt {
        Statement::Local(local) => func.local_variables[*local].init.into_iter().collect(),
        Statement::For {
            init,
            condition,
            update,
            ..
        } => {
            let mut roots = Vec::new();
            if let Some(init) = init {
                roots.extend(statement_roots(func, init));
            }
            roots.extend(condition.iter().copied());
            if let Some(update) = update {
                roots.extend(statement_roots(func, update));
            }
            roots
        }
        other => other.expressions(),
    }
}

/// Calls `f` for every root expression in `block`, in statement order,
/// descending into nested blocks.
pub fn for_each_root(
    func: &Function,
    block: &[Statement],
    f: &mut impl FnMut(Handle<Expression>),
) {
    for stmt in block {
        match stmt {
            Statement::If {
                condition,
                accept,
                reject,
            } => {
                f(*condition);
                for_each_root(func, accept, f);
                for_each_root(func, reject, f);
            }
            Statement::Loop {
                body,
                continuing,
                break_if,
            } => {
                for_each_root(func, body, f);
                for_each_root(func, continuing, f);
                if let Some(brk) = break_if {
                    f(*brk);
                }
            }
            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                if let Some(init) = init {
                    for_each_root(func, std::slice::from_ref(init.as_ref()), f);
                }
                if let Some(cond) = condition {
                    f(*cond);
                }
                for_each_root(func, body, f);
                if let Some(update) = update {
                    for_each_root(func, std::slice::from_ref(update.as_ref()), f);
                }
            }
            Statement::While { condition, body } => {
                f(*condition);
                for_each_root(func, body, f);
            }
            Statement::Block(inner) => for_each_root(func, inner, f),
            simple => statement_roots(func, simple).into_iter().for_each(&mut *f),
        }
    }
}

/// Visits the subtree at `root` in evaluation (post-)order.
pub fn post_order(func: &Function, root: Handle<Expression>, out: &mut Vec<Handle<Expression>>) {
    for operand in func.expressions[root].operands() {
        post_order(func, operand, out);
    }
    out.push(root);
}

/// Returns every expression reachable from the statements of the body.
pub fn live_expressions(func: &Function) -> HashSet<Handle<Expression>> {
    let mut live = HashSet::new();
    let mut worklist = Vec::new();
    for_each_root(func, &func.body, &mut |root| worklist.push(root));
    while let Some(handle) = worklist.pop() {
        if live.insert(handle) {
            worklist.extend(func.expressions[handle].operands());
        }
    }
    live
}

/// Returns `true` if `needle` occurs in the subtree rooted at `root`.
pub fn contains(func: &Function, root: Handle<Expression>, needle: Handle<Expression>) -> bool {
    let mut stack = vec![root];
    while let Some(handle) = stack.pop() {
        if handle == needle {
            return true;
        }
        stack.extend(func.expressions[handle].operands());
    }
    false
}

/// Returns the calls in the body for which `select` holds, in program
/// order. A call nested in the arguments of another call comes first.
pub fn call_sites(
    func: &Function,
    mut select: impl FnMut(Handle<Function>) -> bool,
) -> Vec<Handle<Expression>> {
    let mut order = Vec::new();
    for_each_root(func, &func.body, &mut |root| post_order(func, root, &mut order));

    let mut seen = HashSet::new();
    order
        .into_iter()
        .filter(|&handle| match &func.expressions[handle] {
            Expression::Call { function, .. } => select(*function) && seen.insert(handle),
            _ => false,
        })
        .collect()
}
