//! Scope validation over planned call sites

use crate::call_site::{CacheLocation, CallSite};
use crate::error::{DIError, DIResult};
use crate::key::LookupKey;
use crate::service_type::ServiceType;

/// Walk a call site tree and return the first scope-tier service it depends on.
///
/// Fails when a root-tier call site (a singleton) transitively consumes a
/// scope-tier one. Factory bodies are opaque and are not inspected.
pub(crate) fn validate_call_site(site: &CallSite) -> DIResult<Option<ServiceType>> {
    visit(site, None)
}

fn visit(site: &CallSite, singleton: Option<&ServiceType>) -> DIResult<Option<ServiceType>> {
    match site.location() {
        CacheLocation::Root => {
            for child in site.children() {
                visit(child, Some(site.service_type()))?;
            }
            Ok(None)
        }
        CacheLocation::Scope => {
            if let Some(singleton) = singleton {
                return Err(DIError::ScopedInSingleton {
                    scoped: site.service_type().to_string(),
                    singleton: singleton.to_string(),
                });
            }
            for child in site.children() {
                visit(child, singleton)?;
            }
            Ok(Some(site.service_type().clone()))
        }
        CacheLocation::DisposeOnly | CacheLocation::None => {
            let mut scoped = None;
            for child in site.children() {
                let found = visit(child, singleton)?;
                scoped = scoped.or(found);
            }
            Ok(scoped)
        }
    }
}

/// Reject resolving something scope-bound directly from the root provider
pub(crate) fn validate_resolution(
    lookup: &LookupKey,
    scoped_dependency: Option<&ServiceType>,
    from_root: bool,
) -> DIResult<()> {
    match scoped_dependency {
        Some(scoped) if from_root => Err(DIError::ScopedFromRoot {
            service: lookup.to_string(),
            scoped: scoped.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_site::{CallSiteKind, ResultCache};
    use crate::descriptor::ConstructorDescriptor;
    use crate::key::ServiceCacheKey;
    use std::sync::Arc;

    fn site(name: &str, location: CacheLocation, arguments: Vec<Arc<CallSite>>) -> Arc<CallSite> {
        let service_type = ServiceType::named(name);
        Arc::new(CallSite::new(
            service_type.clone(),
            CallSiteKind::Constructor {
                implementation: service_type.clone(),
                constructor: Arc::new(ConstructorDescriptor::new(|_| Ok(()))),
                arguments,
                disposal: None,
            },
            ResultCache::new(
                location,
                ServiceCacheKey::new(LookupKey::of_type(service_type), 0),
            ),
        ))
    }

    #[test]
    fn test_scoped_inside_singleton_is_rejected() {
        let session = site("Session", CacheLocation::Scope, vec![]);
        let middle = site("Middle", CacheLocation::None, vec![session]);
        let cache = site("Cache", CacheLocation::Root, vec![middle]);

        let err = validate_call_site(&cache).unwrap_err();
        match err {
            DIError::ScopedInSingleton { scoped, singleton } => {
                assert_eq!(scoped, "Session");
                assert_eq!(singleton, "Cache");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_transient_over_scoped_reports_dependency() {
        let session = site("Session", CacheLocation::Scope, vec![]);
        let handler = site("Handler", CacheLocation::None, vec![session]);

        let scoped = validate_call_site(&handler).unwrap();
        assert_eq!(scoped, Some(ServiceType::named("Session")));

        let lookup = LookupKey::of_type(ServiceType::named("Handler"));
        assert!(matches!(
            validate_resolution(&lookup, scoped.as_ref(), true),
            Err(DIError::ScopedFromRoot { .. })
        ));
        assert!(validate_resolution(&lookup, scoped.as_ref(), false).is_ok());
    }

    #[test]
    fn test_singletons_only() {
        let clock = site("Clock", CacheLocation::Root, vec![]);
        let service = site("Service", CacheLocation::Root, vec![clock]);
        assert_eq!(validate_call_site(&service).unwrap(), None);
    }
}
