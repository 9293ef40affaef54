//! Registration index: ordered registrations grouped by lookup key

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{TypeCatalog, TypeFacts};
use crate::error::DIResult;
use crate::key::LookupKey;
use crate::registration::{Implementation, Registration};
use crate::scope::BuiltinService;
use crate::service_type::ServiceType;

/// Registrations in declaration order, indexed by lookup key.
///
/// The slot of a registration is its distance from the last registration for the
/// same key: the last one registered is slot 0 and wins single-result lookups.
#[derive(Debug, Clone, Default)]
pub struct RegistrationIndex {
    registrations: Vec<Arc<Registration>>,
    by_key: HashMap<LookupKey, Vec<usize>>,
    catalog: TypeCatalog,
}

impl RegistrationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a registration
    pub fn add(&mut self, registration: Registration) -> DIResult<()> {
        registration.validate()?;

        if let Implementation::Type(descriptor) = registration.implementation() {
            self.catalog
                .describe(descriptor.implementation().clone(), descriptor.facts());
        }

        debug!(
            service = %registration.lookup(),
            lifetime = %registration.lifetime(),
            implementation = %registration.implementation(),
            "Registered service"
        );

        let position = self.registrations.len();
        self.by_key
            .entry(registration.lookup().clone())
            .or_default()
            .push(position);
        self.registrations.push(Arc::new(registration));
        Ok(())
    }

    pub fn add_all(&mut self, registrations: impl IntoIterator<Item = Registration>) -> DIResult<()> {
        for registration in registrations {
            self.add(registration)?;
        }
        Ok(())
    }

    /// Record type facts for generic constraint checks
    pub fn describe(&mut self, service_type: ServiceType, facts: TypeFacts) {
        self.catalog.describe(service_type, facts);
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Every registration with its declaration position
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &Arc<Registration>)> {
        self.registrations.iter().enumerate()
    }

    /// Registrations for exactly `key`, in declaration order
    pub fn get<'a>(&'a self, key: &LookupKey) -> impl Iterator<Item = &'a Arc<Registration>> + 'a {
        self.by_key
            .get(key)
            .map(|positions| positions.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |&position| &self.registrations[position])
    }

    /// The slot 0 registration for `key`
    pub fn last(&self, key: &LookupKey) -> Option<&Arc<Registration>> {
        self.by_key
            .get(key)
            .and_then(|positions| positions.last())
            .map(|&position| &self.registrations[position])
    }

    pub fn contains(&self, key: &LookupKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Distance of the registration at `position` from the end of its key's list
    pub fn slot_of(&self, position: usize) -> Option<usize> {
        let registration = self.registrations.get(position)?;
        let positions = self.by_key.get(registration.lookup())?;
        let index = positions.iter().position(|&p| p == position)?;
        Some(positions.len() - 1 - index)
    }

    /// Whether `key` could be resolved, without planning anything
    pub fn is_known_service(&self, key: &LookupKey) -> bool {
        let service_type = key.service_type();
        if service_type.is_generic_definition() {
            return false;
        }
        if key.service_key().is_none() && BuiltinService::from_type(service_type).is_some() {
            return true;
        }
        if self.contains_with_fallback(key) {
            return true;
        }
        if let Some(definition) = key.generic_definition() {
            if self.contains_with_fallback(&definition) {
                return true;
            }
        }
        matches!(service_type.sequence_item(), Some(item) if !item.is_generic_definition())
    }

    fn contains_with_fallback(&self, key: &LookupKey) -> bool {
        self.contains(key)
            || key
                .any_key_fallback()
                .is_some_and(|fallback| self.contains(&fallback))
    }

    /// Drop every registration for `key`; returns how many were removed
    pub fn remove_all(&mut self, key: &LookupKey) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.lookup() != key);
        self.rebuild();
        before - self.registrations.len()
    }

    /// Drop the first registration for `key`
    pub fn remove_first(&mut self, key: &LookupKey) -> bool {
        let Some(&position) = self.by_key.get(key).and_then(|positions| positions.first()) else {
            return false;
        };
        self.registrations.remove(position);
        self.rebuild();
        true
    }

    fn rebuild(&mut self) {
        self.by_key.clear();
        for (position, registration) in self.registrations.iter().enumerate() {
            self.by_key
                .entry(registration.lookup().clone())
                .or_default()
                .push(position);
        }
    }
}
