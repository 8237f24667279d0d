//! IR transformation passes for Prism.
//!
//! Provides a [`Pass`] trait, a [`PassManager`] with fixed-point iteration,
//! the [`DirectVariableAccess`] transform and a [`PointerParamValidation`]
//! check for its output.

pub mod dva;
mod validation;

pub use dva::{DirectVariableAccess, DvaError, Options};
pub use validation::PointerParamValidation;

use std::fmt::Debug;

use prism_ir::Module;

/// A pass failed; the module is left as it was before that pass ran.
#[derive(Debug, thiserror::Error)]
#[error("pass '{pass}' failed")]
pub struct PassError {
    /// Name of the failing pass.
    pub pass: String,
    #[source]
    pub source: DvaError,
}

impl PassError {
    pub fn new(pass: impl Into<String>, source: DvaError) -> Self {
        Self {
            pass: pass.into(),
            source,
        }
    }
}

/// A pass that transforms an IR module.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a module. Returns `true` if anything was modified.
    fn run(&self, module: &mut Module) -> Result<bool, PassError>;
}

/// Maximum number of fixed-point iterations before giving up.
const MAX_ITERATIONS: usize = 10;

/// Runs passes in sequence with fixed-point iteration.
#[derive(Debug, Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    /// Creates an empty pass manager with no passes.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Adds a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Runs all passes until a fixed point is reached or the iteration limit.
    ///
    /// Stops at the first failing pass.
    pub fn run(&self, module: &mut Module) -> Result<(), PassError> {
        for iteration in 0..MAX_ITERATIONS {
            let mut changed = false;
            for pass in &self.passes {
                let modified = pass.run(module)?;
                if modified {
                    log::debug!("pass '{}' modified the module", pass.name());
                }
                changed |= modified;
            }
            if !changed {
                log::debug!("pass pipeline converged after {} iteration(s)", iteration + 1);
                return Ok(());
            }
        }
        log::warn!("pass pipeline did not converge within {MAX_ITERATIONS} iterations");
        Ok(())
    }
}

/// Convenience function: removes pointer parameters into the address spaces
/// selected by `options`, then validates the result.
pub fn direct_variable_access(module: &mut Module, options: &Options) -> Result<(), PassError> {
    let mut pm = PassManager::new();
    pm.add_pass(Box::new(DirectVariableAccess::new(*options)));
    pm.add_pass(Box::new(PointerParamValidation));
    pm.run(module)
}
