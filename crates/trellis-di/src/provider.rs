//! Registration modules
//!
//! A [`ServiceModule`] groups related registrations under a name, with a
//! priority and the names of modules it depends on. [`ServiceModuleRegistry`]
//! orders modules (dependencies first, then by priority), feeds them to a
//! [`DIContainerBuilder`], builds the container and runs each module's
//! post-build validation.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_di::{DIContainerBuilder, DIResult, ServiceModule, ServiceModuleRegistry};
//!
//! struct Clock;
//!
//! struct ClockModule;
//!
//! impl ServiceModule for ClockModule {
//!     fn name(&self) -> &'static str {
//!         "clock"
//!     }
//!
//!     fn register(&self, builder: DIContainerBuilder) -> DIResult<DIContainerBuilder> {
//!         builder.register(|_| Ok(Arc::new(Clock)))
//!     }
//! }
//!
//! let mut registry = ServiceModuleRegistry::new();
//! registry.add(ClockModule);
//! let container = registry.build(DIContainerBuilder::new()).unwrap();
//! assert!(container.is_registered::<Clock>());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::container::{DIContainer, DIContainerBuilder};
use crate::error::{DIError, DIResult};

/// A named group of registrations
#[async_trait]
pub trait ServiceModule: Send + Sync {
    /// Used for logging and dependency ordering
    fn name(&self) -> &'static str;

    /// Lower values are registered first among modules whose dependencies are met
    fn priority(&self) -> u32 {
        100
    }

    /// Modules that must be registered before this one
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    fn register(&self, builder: DIContainerBuilder) -> DIResult<DIContainerBuilder>;

    /// Called after the container is built
    #[allow(unused_variables)]
    fn validate(&self, container: &DIContainer) -> DIResult<()> {
        Ok(())
    }

    /// Async initialization, run by [`ServiceModuleRegistry::build_async`] after validation
    #[allow(unused_variables)]
    async fn initialize(&self, container: &DIContainer) -> DIResult<()> {
        Ok(())
    }
}

/// Collects modules and applies them in dependency order
#[derive(Default)]
pub struct ServiceModuleRegistry {
    modules: Vec<Arc<dyn ServiceModule>>,
}

impl ServiceModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M: ServiceModule + 'static>(&mut self, module: M) -> &mut Self {
        self.modules.push(Arc::new(module));
        self
    }

    pub fn add_shared(&mut self, module: Arc<dyn ServiceModule>) -> &mut Self {
        self.modules.push(module);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Modules in registration order: every module after its dependencies,
    /// ready modules by ascending priority, ties in insertion order
    pub fn ordered(&self) -> DIResult<Vec<Arc<dyn ServiceModule>>> {
        let positions: HashMap<&'static str, usize> = self
            .modules
            .iter()
            .enumerate()
            .map(|(position, module)| (module.name(), position))
            .collect();

        let mut pending_deps = vec![0usize; self.modules.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.modules.len()];
        for (position, module) in self.modules.iter().enumerate() {
            for dependency in module.dependencies() {
                let Some(&target) = positions.get(dependency) else {
                    return Err(DIError::DependencyResolutionFailed {
                        message: format!(
                            "module '{}' depends on unknown module '{dependency}'",
                            module.name()
                        ),
                    });
                };
                pending_deps[position] += 1;
                dependents[target].push(position);
            }
        }

        let mut ready: BTreeSet<(u32, usize)> = self
            .modules
            .iter()
            .enumerate()
            .filter(|(position, _)| pending_deps[*position] == 0)
            .map(|(position, module)| (module.priority(), position))
            .collect();

        let mut ordered = Vec::with_capacity(self.modules.len());
        while let Some(next) = ready.pop_first() {
            let (_, position) = next;
            ordered.push(self.modules[position].clone());
            for &dependent in &dependents[position] {
                pending_deps[dependent] -= 1;
                if pending_deps[dependent] == 0 {
                    ready.insert((self.modules[dependent].priority(), dependent));
                }
            }
        }

        if ordered.len() != self.modules.len() {
            let stuck: Vec<&str> = self
                .modules
                .iter()
                .enumerate()
                .filter(|(position, _)| pending_deps[*position] > 0)
                .map(|(_, module)| module.name())
                .collect();
            return Err(DIError::DependencyResolutionFailed {
                message: format!("circular module dependencies among: {}", stuck.join(", ")),
            });
        }
        Ok(ordered)
    }

    /// Feed every module to `builder` in order
    pub fn register_all(&self, mut builder: DIContainerBuilder) -> DIResult<DIContainerBuilder> {
        let ordered = self.ordered()?;
        info!("Registering {} service modules", ordered.len());

        for module in &ordered {
            debug!(
                module = module.name(),
                priority = module.priority(),
                "Registering module"
            );
            builder = module.register(builder)?;
        }
        Ok(builder)
    }

    /// Register, build, then validate each module against the built container
    pub fn build(&self, builder: DIContainerBuilder) -> DIResult<DIContainer> {
        let container = self.register_all(builder)?.build()?;
        for module in &self.modules {
            module.validate(&container)?;
        }
        info!("All service modules registered successfully");
        Ok(container)
    }

    /// [`build`](Self::build), then run each module's async initialization in order
    pub async fn build_async(&self, builder: DIContainerBuilder) -> DIResult<DIContainer> {
        let container = self.build(builder)?;
        for module in self.ordered()? {
            module.initialize(&container).await?;
        }
        Ok(container)
    }
}
