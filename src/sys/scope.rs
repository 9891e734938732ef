// src/sys/scope.rs
//
// Lock scope inference. The control plane lists every lock that protects a
// resource, including inherited ones, without saying where each is attached.
// We infer the scope from the naming convention `rg-*` / `sub-*`.

use crate::sys::traits::{LockLevel, LockScope, ResourceRef, ScopeKind};

pub struct ScopeResolver;

impl ScopeResolver {
    /// Pure and total: every name maps to exactly one scope kind.
    pub fn resolve(lock_name: &str) -> ScopeKind {
        if lock_name.starts_with("rg-") {
            ScopeKind::ResourceGroup
        } else if lock_name.starts_with("sub-") {
            ScopeKind::Subscription
        } else {
            ScopeKind::Resource
        }
    }

    /// Binds an inferred kind to the identifiers of the target resource.
    pub fn bind(kind: ScopeKind, resource: &ResourceRef) -> LockScope {
        match kind {
            ScopeKind::Resource => LockScope::Resource { resource_id: resource.id.clone() },
            ScopeKind::ResourceGroup => LockScope::ResourceGroup {
                subscription_id: resource.subscription_id.clone(),
                resource_group: resource.resource_group.clone(),
            },
            ScopeKind::Subscription => LockScope::Subscription {
                subscription_id: resource.subscription_id.clone(),
            },
        }
    }

    /// Only delete-protection locks take part in a session. Read-only locks
    /// are never captured and never removed.
    pub fn is_considered(level: LockLevel) -> bool {
        level == LockLevel::CanNotDelete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> ResourceRef {
        ResourceRef::from_resource_id(
            "/subscriptions/sub-1/resourceGroups/grp/providers/Microsoft.KeyVault/vaults/kv",
        )
        .unwrap()
    }

    #[test]
    fn prefixes_resolve_to_scopes() {
        assert_eq!(ScopeResolver::resolve("rg-x"), ScopeKind::ResourceGroup);
        assert_eq!(ScopeResolver::resolve("sub-x"), ScopeKind::Subscription);
        assert_eq!(ScopeResolver::resolve("anything-else"), ScopeKind::Resource);
    }

    #[test]
    fn prefix_match_is_exact() {
        assert_eq!(ScopeResolver::resolve("RG-upper"), ScopeKind::Resource);
        assert_eq!(ScopeResolver::resolve("rg"), ScopeKind::Resource);
        assert_eq!(ScopeResolver::resolve("subscription-lock"), ScopeKind::Resource);
        assert_eq!(ScopeResolver::resolve(""), ScopeKind::Resource);
        assert_eq!(ScopeResolver::resolve("my-rg-lock"), ScopeKind::Resource);
    }

    #[test]
    fn bind_uses_resource_identifiers() {
        let r = resource();
        assert_eq!(
            ScopeResolver::bind(ScopeKind::ResourceGroup, &r).scope_id(),
            r.resource_group_id()
        );
        assert_eq!(
            ScopeResolver::bind(ScopeKind::Subscription, &r).scope_id(),
            "/subscriptions/sub-1"
        );
        assert_eq!(ScopeResolver::bind(ScopeKind::Resource, &r).scope_id(), r.id);
    }

    #[test]
    fn only_cannot_delete_considered() {
        assert!(ScopeResolver::is_considered(LockLevel::CanNotDelete));
        assert!(!ScopeResolver::is_considered(LockLevel::ReadOnly));
        assert!(!ScopeResolver::is_considered(LockLevel::Other));
    }
}
