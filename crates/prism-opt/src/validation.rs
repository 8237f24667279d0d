//! Pointer parameter validation pass.
//!
//! Checks the post-conditions of direct variable access and logs warnings
//! for problems found. This pass never modifies the module.

use prism_ir::{Expression, Function, Module};

use crate::{Pass, PassError};

/// Validates that no function takes a pointer into a shared address space
/// and that every call matches its callee. Returns `false` (never modifies
/// the module).
///
/// Pointers into function and private variables may remain: they are the
/// root pointers of specialized functions.
#[derive(Debug)]
pub struct PointerParamValidation;

impl Pass for PointerParamValidation {
    fn name(&self) -> &str {
        "pointer-param-validation"
    }

    fn run(&self, module: &mut Module) -> Result<bool, PassError> {
        validate_module(module);
        Ok(false)
    }
}

/// Returns the number of problems found.
fn validate_module(module: &Module) -> usize {
    let mut problems = 0;

    for (handle, func) in module.functions.iter() {
        for (index, arg) in func.arguments.iter().enumerate() {
            let Some((_, space)) = module.types[arg.ty].inner.pointer() else {
                continue;
            };
            if space.is_shared() {
                log::warn!(
                    "function '{}' ({:?}) still takes pointer parameter {} into {} memory",
                    func.label(),
                    handle,
                    index,
                    space
                );
                problems += 1;
            }
        }
    }

    for (handle, func) in module.functions.iter() {
        let context = format!("function '{}' ({handle:?})", func.label());
        problems += validate_calls(module, func, &context);
    }
    for ep in &module.entry_points {
        problems += validate_calls(module, &ep.function, &format!("ep '{}'", ep.name));
    }
    problems
}

fn validate_calls(module: &Module, func: &Function, context: &str) -> usize {
    let function_count = module.functions.len();
    let mut problems = 0;

    for (handle, expr) in func.expressions.iter() {
        let Expression::Call {
            function,
            arguments,
        } = expr
        else {
            continue;
        };
        let Some(callee) = module.functions.try_get(*function) else {
            log::warn!(
                "{}: call {:?} targets out-of-bounds function {:?} (arena size {})",
                context,
                handle,
                function,
                function_count,
            );
            problems += 1;
            continue;
        };
        if callee.arguments.len() != arguments.len() {
            log::warn!(
                "{}: call {:?} passes {} argument(s) to '{}', which takes {}",
                context,
                handle,
                arguments.len(),
                callee.label(),
                callee.arguments.len(),
            );
            problems += 1;
        }
    }
    problems
}
