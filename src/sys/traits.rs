// src/sys/traits.rs

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;

use crate::sys::secrets::SecretValue;

// ==============================================================================
// 1. Resource Identity
// ==============================================================================

/// Fully resolved identity of the target vault. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub subscription_id: String,
}

impl ResourceRef {
    /// Parses an ARM id of the form
    /// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}`.
    /// Segment keys are matched case-insensitively, as ARM itself does.
    pub fn from_resource_id(id: &str) -> Result<Self, String> {
        let segments: Vec<&str> = id.trim().trim_matches('/').split('/').collect();

        let subscription_id = segment_after(&segments, "subscriptions")
            .ok_or_else(|| format!("Resource id has no subscription segment: '{}'", id))?;
        let resource_group = segment_after(&segments, "resourceGroups")
            .ok_or_else(|| format!("Resource id has no resource group segment: '{}'", id))?;

        if !segments.iter().any(|s| s.eq_ignore_ascii_case("providers")) {
            return Err(format!("Resource id has no provider segment: '{}'", id));
        }
        let name = segments
            .last()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("Resource id has no resource name: '{}'", id))?;

        Ok(Self {
            id: id.trim().to_string(),
            name: name.to_string(),
            resource_group: resource_group.to_string(),
            subscription_id: subscription_id.to_string(),
        })
    }

    pub fn resource_group_id(&self) -> String {
        format!("/subscriptions/{}/resourceGroups/{}", self.subscription_id, self.resource_group)
    }
}

fn segment_after<'s>(segments: &[&'s str], key: &str) -> Option<&'s str> {
    segments
        .windows(2)
        .find(|pair| pair[0].eq_ignore_ascii_case(key))
        .map(|pair| pair[1])
        .filter(|value| !value.is_empty())
}

// ==============================================================================
// 2. Delete-Protection Locks (Closed Scope Variant)
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Resource,
    ResourceGroup,
    Subscription,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScopeKind::Resource => "resource",
            ScopeKind::ResourceGroup => "resource-group",
            ScopeKind::Subscription => "subscription",
        };
        f.write_str(label)
    }
}

/// The concrete scope a lock is bound to. Each variant carries exactly what the
/// control plane needs to address it, so there is no "unknown scope" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockScope {
    Resource { resource_id: String },
    ResourceGroup { subscription_id: String, resource_group: String },
    Subscription { subscription_id: String },
}

impl LockScope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            LockScope::Resource { .. } => ScopeKind::Resource,
            LockScope::ResourceGroup { .. } => ScopeKind::ResourceGroup,
            LockScope::Subscription { .. } => ScopeKind::Subscription,
        }
    }

    pub fn scope_id(&self) -> String {
        match self {
            LockScope::Resource { resource_id } => resource_id.clone(),
            LockScope::ResourceGroup { subscription_id, resource_group } => {
                format!("/subscriptions/{}/resourceGroups/{}", subscription_id, resource_group)
            }
            LockScope::Subscription { subscription_id } => format!("/subscriptions/{}", subscription_id),
        }
    }
}

/// One delete-protection lock as captured at session start. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub name: String,
    pub scope: LockScope,
    pub notes: Option<String>,
}

impl LockRecord {
    pub fn scope_kind(&self) -> ScopeKind {
        self.scope.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LockLevel {
    CanNotDelete,
    ReadOnly,
    #[serde(other)]
    Other,
}

/// A lock exactly as the control plane reports it, before scope inference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObservedLock {
    pub name: String,
    pub level: LockLevel,
    #[serde(default)]
    pub notes: Option<String>,
}

// ==============================================================================
// 3. Network Policy & Role Assignments
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkDefaultAction {
    Allow,
    Deny,
}

impl NetworkDefaultAction {
    /// Anything other than an explicit "Deny" means no effective restriction.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("deny") {
            NetworkDefaultAction::Deny
        } else {
            NetworkDefaultAction::Allow
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    #[serde(default)]
    pub role_definition_name: String,
    #[serde(default)]
    pub scope: String,
}

/// Formats the caller's address as a single-host allow-list entry.
pub fn allow_list_entry(address: &IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => format!("{}/32", v4),
        IpAddr::V6(v6) => format!("{}/128", v6),
    }
}

// ==============================================================================
// 4. Control Plane Contract
// ==============================================================================

/// Every remote side effect the session can perform goes through this seam.
#[async_trait]
pub trait CloudControlPlane: Send + Sync {
    /// Object id of the signed-in caller. Fails when no login is active.
    async fn resolve_principal(&self) -> Result<String, String>;

    async fn active_subscription(&self) -> Result<String, String>;

    async fn resolve_resource(&self, vault_name: &str) -> Result<ResourceRef, String>;

    async fn network_default_action(&self, resource: &ResourceRef) -> Result<NetworkDefaultAction, String>;

    /// Locks attached at the resource's own scope, at every protection level.
    async fn list_locks(&self, resource: &ResourceRef) -> Result<Vec<ObservedLock>, String>;
    async fn delete_lock(&self, scope: &LockScope, name: &str) -> Result<(), String>;
    async fn create_lock(&self, scope: &LockScope, name: &str, notes: Option<&str>) -> Result<(), String>;

    async fn add_network_rule(&self, resource: &ResourceRef, entry: &str) -> Result<(), String>;
    async fn remove_network_rule(&self, resource: &ResourceRef, entry: &str) -> Result<(), String>;

    async fn list_role_assignments(
        &self,
        principal: &str,
        scope: &str,
        role: &str,
    ) -> Result<Vec<RoleAssignment>, String>;
    async fn create_role_assignment(&self, principal: &str, scope: &str, role: &str) -> Result<(), String>;
    async fn delete_role_assignment(&self, principal: &str, scope: &str, role: &str) -> Result<(), String>;

    async fn list_secrets(&self, resource: &ResourceRef) -> Result<Vec<String>, String>;
    async fn read_secret(&self, resource: &ResourceRef, name: &str) -> Result<SecretValue, String>;

    async fn caller_public_address(&self) -> Result<IpAddr, String>;
}

/// Listing and subscription switching used only by resource selection.
#[async_trait]
pub trait VaultDirectory: Send + Sync {
    async fn list_vaults(&self, subscription_id: &str) -> Result<Vec<String>, String>;
    async fn set_active_subscription(&self, subscription_id: &str) -> Result<(), String>;
}
