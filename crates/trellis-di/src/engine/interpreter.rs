//! Tree-walking interpreter

use std::sync::Arc;

use crate::call_site::{CallSite, CallSiteKind};
use crate::descriptor::Arguments;
use crate::engine::{ExecutionEngine, Producer};
use crate::error::DIResult;
use crate::instance::{Instance, ServiceList};
use crate::scope::ServiceScope;

/// Executes a call site by matching over it on every invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterEngine;

impl InterpreterEngine {
    /// Produce (or fetch from cache) the instance for `site` in `scope`
    pub fn execute(site: &CallSite, scope: &ServiceScope) -> DIResult<Instance> {
        scope.resolve_cached(site.cache(), |scope| Self::produce(site, scope))
    }

    fn produce(site: &CallSite, scope: &ServiceScope) -> DIResult<Instance> {
        match site.kind() {
            CallSiteKind::Constructor {
                constructor,
                arguments,
                disposal,
                ..
            } => {
                let values = arguments
                    .iter()
                    .map(|argument| Self::execute(argument, scope))
                    .collect::<DIResult<Vec<_>>>()?;
                let instance = constructor.activate(&Arguments::new(values))?;
                Ok(match disposal {
                    Some(disposal) => disposal.attach(instance),
                    None => instance,
                })
            }
            CallSiteKind::Factory { factory, key } => factory(scope, key.as_ref()),
            CallSiteKind::Constant { value } => Ok(value.clone()),
            CallSiteKind::Enumerable { items, .. } => {
                let values = items
                    .iter()
                    .map(|item| Self::execute(item, scope))
                    .collect::<DIResult<Vec<_>>>()?;
                Ok(Instance::new(ServiceList::new(values)))
            }
            CallSiteKind::SelfReference(builtin) => Ok(builtin.produce(scope)),
        }
    }
}

impl ExecutionEngine for InterpreterEngine {
    fn name(&self) -> &'static str {
        "interpreted"
    }

    fn realize(&self, call_site: &Arc<CallSite>) -> DIResult<Producer> {
        let site = call_site.clone();
        Ok(Arc::new(move |scope: &ServiceScope| Self::execute(&site, scope)))
    }
}
