//! Execution engines: turn a planned call site into a reusable producer
//!
//! - [`InterpreterEngine`] walks the call-site tree on every invocation.
//! - [`CompiledEngine`] translates the tree once into nested closures.
//! - [`DynamicEngine`] starts interpreted and swaps in a compiled producer,
//!   built on a background task, once a call site gets hot.

mod compiled;
mod dynamic;
mod interpreter;

pub use compiled::CompiledEngine;
pub use dynamic::DynamicEngine;
pub use interpreter::InterpreterEngine;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::call_site::CallSite;
use crate::error::DIResult;
use crate::instance::Instance;
use crate::observer::DiagnosticsObserver;
use crate::options::ContainerOptions;
use crate::scope::ServiceScope;

/// Produces one instance of a realized call site in the given scope
pub type Producer = Arc<dyn Fn(&ServiceScope) -> DIResult<Instance> + Send + Sync>;

/// Strategy for executing call sites
pub trait ExecutionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build a producer for `call_site`
    fn realize(&self, call_site: &Arc<CallSite>) -> DIResult<Producer>;

    /// Release engine resources; called once when the root scope is disposed
    fn dispose(&self) {}
}

/// Which engine a container uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Interpreted,
    Compiled,
    #[default]
    Dynamic,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EngineKind::Interpreted => "interpreted",
            EngineKind::Compiled => "compiled",
            EngineKind::Dynamic => "dynamic",
        };
        f.write_str(text)
    }
}

/// Engine selected by `options`; `compiler` replaces the dynamic engine's compiled strategy
pub(crate) fn create_engine(
    options: &ContainerOptions,
    compiler: Option<Arc<dyn ExecutionEngine>>,
    observer: Arc<dyn DiagnosticsObserver>,
) -> Arc<dyn ExecutionEngine> {
    match options.engine {
        EngineKind::Interpreted => Arc::new(InterpreterEngine),
        EngineKind::Compiled => compiler.unwrap_or_else(|| Arc::new(CompiledEngine)),
        EngineKind::Dynamic => {
            let compiler = compiler.unwrap_or_else(|| Arc::new(CompiledEngine));
            Arc::new(DynamicEngine::new(compiler, options.compile_after, observer))
        }
    }
}
