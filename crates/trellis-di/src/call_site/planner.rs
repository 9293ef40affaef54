//! Call-site planner and call-site cache
//!
//! Turns a lookup key into a [`CallSite`], recursing into constructor
//! parameters and enumerable items. Lookups are tried in order: exact match
//! (with an any-key fallback for keyed lookups), open generic template,
//! "sequence of T", and finally the built-in services. Planned call sites are
//! memoized by `(lookup key, slot)`.
//!
//! The registration index is read through an [`ArcSwap`] snapshot. Planning
//! holds the publish gate for reading, and publishing a new index takes it for
//! writing, so every cached call site was planned against the current
//! snapshot. Top-level planning of one key is serialized by a per-key lock;
//! nested keys are not locked, and racing planners converge on whichever call
//! site reached the cache first.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::call_site::chain::ResolutionChain;
use crate::call_site::{classifier, validator, CallSite, CallSiteKind, ResultCache};
use crate::descriptor::{ConstructorDescriptor, ParameterDescriptor, ParameterSource, TypeDescriptor};
use crate::error::{DIError, DIResult};
use crate::index::RegistrationIndex;
use crate::instance::Instance;
use crate::key::{LookupKey, ServiceCacheKey, ServiceKey};
use crate::observer::DiagnosticsObserver;
use crate::registration::{Implementation, Registration, ServiceLifetime};
use crate::scope::BuiltinService;
use crate::service_type::ServiceType;

pub(crate) struct CallSitePlanner {
    index: ArcSwap<RegistrationIndex>,
    call_sites: DashMap<ServiceCacheKey, Arc<CallSite>>,
    planning_locks: DashMap<LookupKey, Arc<Mutex<()>>>,
    publish: RwLock<()>,
    /// Bumped each time a new index is published
    generation: AtomicU64,
    observer: Arc<dyn DiagnosticsObserver>,
}

impl CallSitePlanner {
    pub(crate) fn new(index: RegistrationIndex, observer: Arc<dyn DiagnosticsObserver>) -> Self {
        Self {
            index: ArcSwap::from_pointee(index),
            call_sites: DashMap::new(),
            planning_locks: DashMap::new(),
            publish: RwLock::new(()),
            generation: AtomicU64::new(0),
            observer,
        }
    }

    /// Current registration snapshot
    pub(crate) fn index(&self) -> Arc<RegistrationIndex> {
        self.index.load_full()
    }

    /// Index generation; changes whenever [`update`](Self::update) publishes
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Apply `change` to a copy of the index and publish it.
    ///
    /// Planned call sites are dropped: they may no longer be the winners for
    /// their keys. Waits for in-flight planning to finish first.
    pub(crate) fn update<R>(&self, change: impl Fn(&mut RegistrationIndex) -> DIResult<R>) -> DIResult<R> {
        let _publishing = self.publish.write();
        loop {
            let current = self.index.load_full();
            let mut next = (*current).clone();
            let result = change(&mut next)?;

            let previous = self.index.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&previous, &current) {
                self.call_sites.clear();
                self.generation.fetch_add(1, Ordering::AcqRel);
                return Ok(result);
            }
        }
    }

    /// Run `publish` only if no index was published since `generation`.
    ///
    /// Results derived from a call site planned at `generation` go through
    /// here, so they are never cached against a newer index.
    pub(crate) fn publish_if_current<R>(&self, generation: u64, publish: impl FnOnce() -> R) -> Option<R> {
        let _gate = self.publish.read();
        (self.generation() == generation).then(publish)
    }

    pub(crate) fn cached_call_sites(&self) -> usize {
        self.call_sites.len()
    }

    /// Plan `key` from an empty chain. `Ok(None)` means nothing can produce it.
    pub(crate) fn plan(&self, key: &LookupKey) -> DIResult<Option<Arc<CallSite>>> {
        let cache_key = ServiceCacheKey::new(key.clone(), 0);
        if let Some(site) = self.cached(&cache_key) {
            return Ok(Some(site));
        }

        let lock = self
            .planning_locks
            .entry(key.clone())
            .or_default()
            .value()
            .clone();
        let planned = {
            let _planning = lock.lock();
            let _gate = self.publish.read();
            let index = self.index();
            let mut chain = ResolutionChain::new();
            self.plan_in_chain(&index, key, &mut chain)
        };

        // Drop the lock entry once no other planner holds it
        drop(lock);
        self.planning_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        planned
    }

    /// Plan every closed registration with its own slot, collecting all failures
    pub(crate) fn plan_all(&self, validate_scopes: bool) -> Vec<DIError> {
        let _gate = self.publish.read();
        let index = self.index();
        let mut errors = Vec::new();
        for (position, registration) in index.iter() {
            if registration.is_open_generic() {
                continue;
            }
            let Some(slot) = index.slot_of(position) else {
                continue;
            };
            let mut chain = ResolutionChain::new();
            let planned = self
                .build_for_registration(&index, registration, registration.lookup(), slot, &mut chain)
                .and_then(|site| match validate_scopes {
                    true => validator::validate_call_site(&site).map(|_| ()),
                    false => Ok(()),
                });
            if let Err(err) = planned {
                debug!(service = %registration.lookup(), error = %err, "Registration failed validation");
                errors.push(err);
            }
        }
        errors
    }

    fn cached(&self, cache_key: &ServiceCacheKey) -> Option<Arc<CallSite>> {
        self.call_sites.get(cache_key).map(|entry| entry.value().clone())
    }

    /// Insert unless another planner got there first; the stored call site wins
    fn store(&self, site: CallSite) -> Arc<CallSite> {
        let cache_key = site.cache().key.clone();
        let (site, inserted) = match self.call_sites.entry(cache_key) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(vacant) => {
                let site = Arc::new(site);
                vacant.insert(site.clone());
                (site, true)
            }
        };
        if inserted {
            self.observer.call_site_built(&site);
        }
        site
    }

    fn plan_in_chain(
        &self,
        index: &RegistrationIndex,
        key: &LookupKey,
        chain: &mut ResolutionChain,
    ) -> DIResult<Option<Arc<CallSite>>> {
        if key.service_type().is_generic_definition() {
            return Ok(None);
        }

        let cache_key = ServiceCacheKey::new(key.clone(), 0);
        if let Some(site) = self.cached(&cache_key) {
            return Ok(Some(site));
        }

        chain.check(key)?;

        if let Some(site) = self.try_exact(index, key, chain)? {
            return Ok(Some(site));
        }
        if let Some(site) = self.try_open_generic(index, key, chain)? {
            return Ok(Some(site));
        }
        if let Some(site) = self.try_enumerable(index, key, chain)? {
            return Ok(Some(site));
        }
        Ok(self.try_builtin(key))
    }

    fn find_registration<'a>(index: &'a RegistrationIndex, key: &LookupKey) -> Option<&'a Arc<Registration>> {
        index.last(key).or_else(|| {
            key.any_key_fallback()
                .and_then(|fallback| index.last(&fallback))
        })
    }

    fn try_exact(
        &self,
        index: &RegistrationIndex,
        key: &LookupKey,
        chain: &mut ResolutionChain,
    ) -> DIResult<Option<Arc<CallSite>>> {
        match Self::find_registration(index, key) {
            Some(registration) => self
                .build_for_registration(index, registration, key, 0, chain)
                .map(Some),
            None => Ok(None),
        }
    }

    fn try_open_generic(
        &self,
        index: &RegistrationIndex,
        key: &LookupKey,
        chain: &mut ResolutionChain,
    ) -> DIResult<Option<Arc<CallSite>>> {
        let Some(definition) = key.generic_definition() else {
            return Ok(None);
        };
        match Self::find_registration(index, &definition) {
            Some(registration) => self.close_generic(index, registration, key, 0, chain, true),
            None => Ok(None),
        }
    }

    fn try_builtin(&self, key: &LookupKey) -> Option<Arc<CallSite>> {
        if key.service_key().is_some() {
            return None;
        }
        let builtin = BuiltinService::from_type(key.service_type())?;
        Some(self.store(CallSite::new(
            key.service_type().clone(),
            CallSiteKind::SelfReference(builtin),
            ResultCache::none(ServiceCacheKey::new(key.clone(), 0)),
        )))
    }

    /// Call site for one registration, answering `requested` at `slot`
    fn build_for_registration(
        &self,
        index: &RegistrationIndex,
        registration: &Registration,
        requested: &LookupKey,
        slot: usize,
        chain: &mut ResolutionChain,
    ) -> DIResult<Arc<CallSite>> {
        let cache_key = ServiceCacheKey::new(requested.clone(), slot);
        if let Some(site) = self.cached(&cache_key) {
            return Ok(site);
        }

        let lifetime = registration.lifetime();
        let site = match registration.implementation() {
            Implementation::Type(descriptor) => {
                self.constructor_site(index, requested, lifetime, descriptor, cache_key, chain)?
            }
            Implementation::Factory(factory) => CallSite::new(
                requested.service_type().clone(),
                CallSiteKind::Factory {
                    factory: factory.clone(),
                    key: requested.service_key().cloned(),
                },
                classifier::for_factory(lifetime, cache_key),
            ),
            Implementation::Constant(value) => CallSite::new(
                requested.service_type().clone(),
                CallSiteKind::Constant { value: value.clone() },
                classifier::for_constant(lifetime, cache_key),
            ),
            Implementation::Generic(generic) => {
                return Err(DIError::InvalidServiceType {
                    message: format!(
                        "open generic implementation '{}' cannot answer '{requested}' directly",
                        generic.definition()
                    ),
                })
            }
        };
        Ok(self.store(site))
    }

    /// Close an open generic registration over the arguments of `requested`.
    ///
    /// With `throw` unset a constraint violation excludes the candidate instead
    /// of failing, as enumerables require.
    fn close_generic(
        &self,
        index: &RegistrationIndex,
        registration: &Registration,
        requested: &LookupKey,
        slot: usize,
        chain: &mut ResolutionChain,
        throw: bool,
    ) -> DIResult<Option<Arc<CallSite>>> {
        let Implementation::Generic(generic) = registration.implementation() else {
            return Ok(None);
        };

        let cache_key = ServiceCacheKey::new(requested.clone(), slot);
        if let Some(site) = self.cached(&cache_key) {
            return Ok(Some(site));
        }

        let arguments = requested.service_type().generic_arguments();
        if let Err(err) = generic.check_constraints(arguments, index.catalog()) {
            if throw {
                return Err(err);
            }
            debug!(service = %requested, error = %err, "Excluded open generic candidate");
            return Ok(None);
        }

        let descriptor = generic.close(arguments)?;
        let site = self.constructor_site(
            index,
            requested,
            registration.lifetime(),
            &descriptor,
            cache_key,
            chain,
        )?;
        Ok(Some(self.store(site)))
    }

    fn try_enumerable(
        &self,
        index: &RegistrationIndex,
        key: &LookupKey,
        chain: &mut ResolutionChain,
    ) -> DIResult<Option<Arc<CallSite>>> {
        let Some(item_type) = key.service_type().sequence_item().cloned() else {
            return Ok(None);
        };
        if item_type.is_generic_definition() {
            return Ok(None);
        }

        let requested_key = key.service_key();
        let item_definition = item_type.generic_definition_of();
        let mut chain = chain.enter(key.clone(), None);
        let mut slots: HashMap<LookupKey, usize> = HashMap::new();
        let mut items: Vec<(usize, Arc<CallSite>)> = Vec::new();

        // Exact registrations take the low slots, in reverse declaration
        // order, so slot 0 is the call site a single lookup resolves to.
        // Open generic candidates continue the count.
        for open_generic in [false, true] {
            for (position, registration) in index.iter().rev() {
                let lookup = registration.lookup();
                if registration.is_open_generic() != open_generic || !lookup.matches_collection_key(requested_key) {
                    continue;
                }

                // An any-key collection answers each item under the item's own key
                let item_key = match requested_key {
                    Some(ServiceKey::Any) => lookup.with_type(item_type.clone()),
                    _ => key.with_type(item_type.clone()),
                };
                let slot = slots.get(&item_key).copied().unwrap_or(0);

                let site = if !open_generic && registration.service_type() == &item_type {
                    Some(self.build_for_registration(index, registration, &item_key, slot, &mut chain)?)
                } else if open_generic && Some(registration.service_type()) == item_definition.as_ref() {
                    self.close_generic(index, registration, &item_key, slot, &mut chain, false)?
                } else {
                    None
                };

                if let Some(site) = site {
                    slots.insert(item_key, slot + 1);
                    items.push((position, site));
                }
            }
        }
        items.sort_by_key(|(position, _)| *position);
        let items: Vec<Arc<CallSite>> = items.into_iter().map(|(_, site)| site).collect();

        let cache = classifier::for_enumerable(&items, ServiceCacheKey::new(key.clone(), 0));
        let site = CallSite::new(
            key.service_type().clone(),
            CallSiteKind::Enumerable { item_type, items },
            cache,
        );
        Ok(Some(self.store(site)))
    }

    fn constructor_site(
        &self,
        index: &RegistrationIndex,
        requested: &LookupKey,
        lifetime: ServiceLifetime,
        descriptor: &TypeDescriptor,
        cache_key: ServiceCacheKey,
        chain: &mut ResolutionChain,
    ) -> DIResult<CallSite> {
        let implementation = descriptor.implementation().clone();
        let mut chain = chain.enter(requested.clone(), Some(implementation.clone()));
        let (constructor, arguments) = self.select_constructor(index, requested, descriptor, &mut chain)?;

        Ok(CallSite::new(
            requested.service_type().clone(),
            CallSiteKind::Constructor {
                implementation,
                constructor,
                arguments,
                disposal: descriptor.disposal_capability().cloned(),
            },
            classifier::for_type(lifetime, descriptor, cache_key),
        ))
    }

    /// Pick the constructor with the most parameters that can be satisfied.
    ///
    /// A second satisfiable constructor is accepted only when its parameter
    /// types are a subset of the winner's.
    fn select_constructor(
        &self,
        index: &RegistrationIndex,
        requested: &LookupKey,
        descriptor: &TypeDescriptor,
        chain: &mut ResolutionChain,
    ) -> DIResult<(Arc<ConstructorDescriptor>, Vec<Arc<CallSite>>)> {
        let implementation = descriptor.implementation();
        match descriptor.constructors() {
            [] => Err(DIError::NoConstructor {
                implementation: implementation.to_string(),
            }),
            [only] => {
                let arguments = self
                    .plan_arguments(index, requested, implementation, only, chain, true)?
                    .unwrap_or_default();
                Ok((only.clone(), arguments))
            }
            constructors => {
                let mut ordered: Vec<&Arc<ConstructorDescriptor>> = constructors.iter().collect();
                ordered.sort_by(|a, b| b.parameters().len().cmp(&a.parameters().len()));

                let mut best: Option<(&Arc<ConstructorDescriptor>, Vec<Arc<CallSite>>)> = None;
                let mut best_types: HashSet<&ServiceType> = HashSet::new();

                for constructor in ordered {
                    let Some(arguments) =
                        self.plan_arguments(index, requested, implementation, constructor, chain, false)?
                    else {
                        continue;
                    };

                    match best.as_ref().map(|(winner, _)| *winner) {
                        None => {
                            best_types = constructor
                                .parameters()
                                .iter()
                                .map(ParameterDescriptor::service_type)
                                .collect();
                            best = Some((constructor, arguments));
                        }
                        Some(winner) => {
                            let subset = constructor
                                .parameters()
                                .iter()
                                .all(|p| best_types.contains(p.service_type()));
                            if !subset {
                                return Err(DIError::AmbiguousConstructor {
                                    implementation: implementation.to_string(),
                                    first: winner.signature(implementation),
                                    second: constructor.signature(implementation),
                                });
                            }
                        }
                    }
                }

                best.map(|(constructor, arguments)| (constructor.clone(), arguments))
                    .ok_or_else(|| DIError::CannotActivate {
                        implementation: implementation.to_string(),
                    })
            }
        }
    }

    /// Plan each parameter; `Ok(None)` when one cannot be satisfied and `throw` is unset
    fn plan_arguments(
        &self,
        index: &RegistrationIndex,
        requested: &LookupKey,
        implementation: &ServiceType,
        constructor: &ConstructorDescriptor,
        chain: &mut ResolutionChain,
        throw: bool,
    ) -> DIResult<Option<Vec<Arc<CallSite>>>> {
        let mut arguments = Vec::with_capacity(constructor.parameters().len());

        for parameter in constructor.parameters() {
            let planned = match parameter.source() {
                ParameterSource::ServiceKey => {
                    let Some(service_key) = requested.service_key() else {
                        return Err(DIError::MissingServiceKey {
                            service: requested.to_string(),
                            implementation: implementation.to_string(),
                            parameter: parameter.name().to_string(),
                        });
                    };
                    Some(constant_site(parameter, Instance::new(service_key.clone())))
                }
                ParameterSource::Keyed(service_key) => {
                    let key = LookupKey::new(parameter.service_type().clone(), Some(service_key.clone()));
                    self.plan_in_chain(index, &key, chain)?
                }
                ParameterSource::Service => {
                    let by_type = LookupKey::of_type(parameter.service_type().clone());
                    match self.plan_in_chain(index, &by_type, chain)? {
                        Some(site) => Some(site),
                        None => {
                            let by_name = LookupKey::keyed(parameter.service_type().clone(), parameter.name());
                            self.plan_in_chain(index, &by_name, chain)?
                        }
                    }
                }
            };

            let planned = planned.or_else(|| {
                parameter
                    .default_value()
                    .map(|value| constant_site(parameter, value.clone()))
            });

            match planned {
                Some(site) => arguments.push(site),
                None if throw => {
                    return Err(DIError::UnresolvedDependency {
                        dependency: parameter.service_type().to_string(),
                        implementation: implementation.to_string(),
                    })
                }
                None => return Ok(None),
            }
        }

        Ok(Some(arguments))
    }
}

/// Uncached constant for a default value or an injected service key
fn constant_site(parameter: &ParameterDescriptor, value: Instance) -> Arc<CallSite> {
    let service_type = parameter.service_type().clone();
    Arc::new(CallSite::new(
        service_type.clone(),
        CallSiteKind::Constant { value },
        ResultCache::none(ServiceCacheKey::new(LookupKey::of_type(service_type), 0)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_site::CacheLocation;
    use crate::descriptor::{GenericConstraint, GenericImplementation, GenericParameter, TypeFacts, TypeKind};
    use crate::observer::TracingObserver;

    fn named(name: &str) -> ServiceType {
        ServiceType::named(name)
    }

    fn leaf(name: &str) -> TypeDescriptor {
        TypeDescriptor::new(named(name)).constructor(ConstructorDescriptor::new(|_| Ok(())))
    }

    fn planner(registrations: Vec<Registration>) -> CallSitePlanner {
        let mut index = RegistrationIndex::new();
        index.add_all(registrations).unwrap();
        CallSitePlanner::new(index, Arc::new(TracingObserver))
    }

    fn plan(planner: &CallSitePlanner, name: &str) -> DIResult<Option<Arc<CallSite>>> {
        planner.plan(&LookupKey::of_type(named(name)))
    }

    #[test]
    fn test_exact_match_uses_last_registration() {
        let planner = planner(vec![
            Registration::of_type(named("IClock"), ServiceLifetime::Singleton, leaf("SystemClock")),
            Registration::of_type(named("IClock"), ServiceLifetime::Scoped, leaf("FakeClock")),
        ]);

        let site = plan(&planner, "IClock").unwrap().unwrap();
        match site.kind() {
            CallSiteKind::Constructor { implementation, .. } => assert_eq!(implementation, &named("FakeClock")),
            other => panic!("unexpected call site {other:?}"),
        }
        assert_eq!(site.location(), CacheLocation::Scope);
        assert_eq!(site.cache().key.slot, 0);

        let again = plan(&planner, "IClock").unwrap().unwrap();
        assert!(Arc::ptr_eq(&site, &again));
    }

    #[test]
    fn test_unknown_key_is_not_an_error() {
        let planner = planner(vec![]);
        assert!(plan(&planner, "Missing").unwrap().is_none());
    }

    #[test]
    fn test_any_key_fallback_keeps_requested_key() {
        let planner = planner(vec![Registration::of_type(
            named("ICache"),
            ServiceLifetime::Singleton,
            leaf("MemoryCache"),
        )
        .with_key(ServiceKey::Any)]);

        let key = LookupKey::keyed(named("ICache"), "users");
        let site = planner.plan(&key).unwrap().unwrap();
        assert_eq!(site.cache().key.lookup, key);
        assert!(planner
            .plan(&LookupKey::of_type(named("ICache")))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parameter_name_fallback_and_default() {
        let consumer = TypeDescriptor::new(named("Consumer")).constructor(
            ConstructorDescriptor::new(|_| Ok(()))
                .param("primary", named("IStore"))
                .optional_param("retries", named("u32"), Instance::new(3u32)),
        );
        let planner = planner(vec![
            Registration::of_type(named("IStore"), ServiceLifetime::Singleton, leaf("PrimaryStore"))
                .with_key("primary"),
            Registration::of_type(named("Consumer"), ServiceLifetime::Transient, consumer),
        ]);

        let site = plan(&planner, "Consumer").unwrap().unwrap();
        let children = site.children();
        assert_eq!(children.len(), 2);
        assert_eq!(
            children[0].cache().key.lookup,
            LookupKey::keyed(named("IStore"), "primary")
        );
        assert!(matches!(children[1].kind(), CallSiteKind::Constant { .. }));
    }

    #[test]
    fn test_missing_service_key() {
        let descriptor = TypeDescriptor::new(named("Tenant"))
            .constructor(ConstructorDescriptor::new(|_| Ok(())).service_key_param("key"));
        let planner = planner(vec![Registration::of_type(
            named("Tenant"),
            ServiceLifetime::Transient,
            descriptor,
        )]);

        assert!(matches!(
            plan(&planner, "Tenant"),
            Err(DIError::MissingServiceKey { .. })
        ));
    }

    #[test]
    fn test_open_generic_constraint_violation_is_fatal() {
        let repository = GenericImplementation::new(
            "Repository",
            vec![GenericParameter::new("T").with(GenericConstraint::ReferenceType)],
            |args| {
                Ok(TypeDescriptor::new(ServiceType::generic("Repository", args.to_vec()))
                    .constructor(ConstructorDescriptor::new(|_| Ok(()))))
            },
        );
        let mut index = RegistrationIndex::new();
        index.describe(named("Money"), TypeFacts::new(TypeKind::Struct));
        index.describe(named("Order"), TypeFacts::new(TypeKind::Class));
        index
            .add(Registration::generic(
                ServiceType::generic_definition("IRepository", 1),
                ServiceLifetime::Scoped,
                repository,
            ))
            .unwrap();
        let planner = CallSitePlanner::new(index, Arc::new(TracingObserver));

        let order = LookupKey::of_type(ServiceType::generic("IRepository", vec![named("Order")]));
        assert!(planner.plan(&order).unwrap().is_some());

        let money = LookupKey::of_type(ServiceType::generic("IRepository", vec![named("Money")]));
        assert!(matches!(
            planner.plan(&money),
            Err(DIError::ConstraintViolation { .. })
        ));

        let money_list = LookupKey::of_type(ServiceType::sequence_of(ServiceType::generic(
            "IRepository",
            vec![named("Money")],
        )));
        let site = planner.plan(&money_list).unwrap().unwrap();
        assert!(site.children().is_empty());
    }

    #[test]
    fn test_results_planned_before_update_are_not_published() {
        let planner = planner(vec![Registration::of_type(
            named("IClock"),
            ServiceLifetime::Transient,
            leaf("SystemClock"),
        )]);
        let generation = planner.generation();
        plan(&planner, "IClock").unwrap();
        assert_eq!(planner.publish_if_current(generation, || "system"), Some("system"));

        planner
            .update(|index| index.add(Registration::of_type(named("IClock"), ServiceLifetime::Transient, leaf("FakeClock"))))
            .unwrap();
        assert_ne!(planner.generation(), generation);
        assert_eq!(planner.publish_if_current(generation, || "system"), None);

        let site = plan(&planner, "IClock").unwrap().unwrap();
        assert!(matches!(
            site.kind(),
            CallSiteKind::Constructor { implementation, .. } if implementation == &named("FakeClock")
        ));
        assert_eq!(planner.publish_if_current(planner.generation(), || "fake"), Some("fake"));
    }

    #[test]
    fn test_planning_locks_are_released() {
        let planner = planner(vec![Registration::of_type(
            named("IClock"),
            ServiceLifetime::Singleton,
            leaf("SystemClock"),
        )]);
        plan(&planner, "IClock").unwrap();
        for i in 0..16 {
            assert!(plan(&planner, &format!("Missing{i}")).unwrap().is_none());
        }
        assert!(planner.planning_locks.is_empty());
    }

    #[test]
    fn test_update_clears_call_sites() {
        let planner = planner(vec![Registration::of_type(
            named("IClock"),
            ServiceLifetime::Singleton,
            leaf("SystemClock"),
        )]);
        plan(&planner, "IClock").unwrap();
        assert_eq!(planner.cached_call_sites(), 1);

        planner
            .update(|index| {
                index.add(Registration::of_type(
                    named("IClock"),
                    ServiceLifetime::Singleton,
                    leaf("FakeClock"),
                ))
            })
            .unwrap();
        assert_eq!(planner.cached_call_sites(), 0);
        assert_eq!(planner.index().len(), 2);
    }

    #[test]
    fn test_plan_all_reports_every_failure() {
        let broken = |name: &str| {
            TypeDescriptor::new(named(name))
                .constructor(ConstructorDescriptor::new(|_| Ok(())).param("dep", named("Missing")))
        };
        let planner = planner(vec![
            Registration::of_type(named("A"), ServiceLifetime::Transient, broken("A")),
            Registration::of_type(named("B"), ServiceLifetime::Transient, broken("B")),
            Registration::of_type(named("C"), ServiceLifetime::Transient, leaf("C")),
        ]);

        let errors = planner.plan_all(false);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, DIError::UnresolvedDependency { .. })));
    }
}
