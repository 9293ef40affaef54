//! Compiled engine: translates a call-site tree into nested closures once

use std::sync::Arc;

use crate::call_site::{CacheLocation, CallSite, CallSiteKind};
use crate::descriptor::Arguments;
use crate::engine::{ExecutionEngine, Producer};
use crate::error::{DIError, DIResult};
use crate::instance::{Instance, ServiceList};
use crate::scope::ServiceScope;

/// Compiles each call site into a closure tree; no matching happens per call
#[derive(Debug, Clone, Copy, Default)]
pub struct CompiledEngine;

impl CompiledEngine {
    fn compile(site: &CallSite) -> DIResult<Producer> {
        let body: Producer = match site.kind() {
            CallSiteKind::Constructor {
                implementation,
                constructor,
                arguments,
                disposal,
            } => {
                if arguments.len() != constructor.parameters().len() {
                    return Err(DIError::Compilation {
                        service: site.service_type().to_string(),
                        message: format!(
                            "'{implementation}' expects {} arguments, plan supplies {}",
                            constructor.parameters().len(),
                            arguments.len()
                        ),
                    });
                }
                let arguments = arguments
                    .iter()
                    .map(|argument| Self::compile(argument))
                    .collect::<DIResult<Vec<_>>>()?;
                let constructor = constructor.clone();
                let disposal = disposal.clone();
                Arc::new(move |scope: &ServiceScope| {
                    let mut values = Vec::with_capacity(arguments.len());
                    for argument in &arguments {
                        values.push(argument(scope)?);
                    }
                    let instance = constructor.activate(&Arguments::new(values))?;
                    Ok(match &disposal {
                        Some(disposal) => disposal.attach(instance),
                        None => instance,
                    })
                })
            }
            CallSiteKind::Factory { factory, key } => {
                let factory = factory.clone();
                let key = key.clone();
                Arc::new(move |scope: &ServiceScope| factory(scope, key.as_ref()))
            }
            CallSiteKind::Constant { value } => {
                let value = value.clone();
                Arc::new(move |_: &ServiceScope| Ok(value.clone()))
            }
            CallSiteKind::Enumerable { items, .. } => {
                let items = items
                    .iter()
                    .map(|item| Self::compile(item))
                    .collect::<DIResult<Vec<_>>>()?;
                Arc::new(move |scope: &ServiceScope| {
                    let values = items
                        .iter()
                        .map(|item| item(scope))
                        .collect::<DIResult<Vec<Instance>>>()?;
                    Ok(Instance::new(ServiceList::new(values)))
                })
            }
            CallSiteKind::SelfReference(builtin) => {
                let builtin = *builtin;
                Arc::new(move |scope: &ServiceScope| Ok(builtin.produce(scope)))
            }
        };

        let cache = site.cache().clone();
        Ok(match cache.location {
            CacheLocation::None => body,
            _ => Arc::new(move |scope: &ServiceScope| scope.resolve_cached(&cache, |scope| body(scope))),
        })
    }
}

impl ExecutionEngine for CompiledEngine {
    fn name(&self) -> &'static str {
        "compiled"
    }

    fn realize(&self, call_site: &Arc<CallSite>) -> DIResult<Producer> {
        Self::compile(call_site)
    }
}
