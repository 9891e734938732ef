// src/sys/testing.rs
//
// In-memory control plane with an ordered call log. Test-only.

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Mutex;

use crate::sys::scope::ScopeResolver;
use crate::sys::secrets::SecretValue;
use crate::sys::signals::InterruptSignal;
use crate::sys::traits::{
    CloudControlPlane, LockLevel, LockScope, NetworkDefaultAction, ObservedLock, ResourceRef,
    RoleAssignment, ScopeKind, VaultDirectory,
};

pub const VAULT_ID: &str =
    "/subscriptions/sub-0001/resourceGroups/rg-prod/providers/Microsoft.KeyVault/vaults/kv-prod";
pub const PRINCIPAL: &str = "principal-1";
pub const CALLER_ENTRY: &str = "203.0.113.7/32";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ResolvePrincipal,
    ActiveSubscription,
    ResolveResource(String),
    NetworkDefaultAction,
    ListLocks,
    DeleteLock(String, ScopeKind),
    CreateLock(String, ScopeKind),
    AddNetworkRule(String),
    RemoveNetworkRule(String),
    ListRoleAssignments,
    CreateRoleAssignment(String),
    DeleteRoleAssignment(String),
    ListSecrets,
    ReadSecret(String),
    CallerAddress,
    ListVaults(String),
    SetSubscription(String),
}

impl Call {
    /// True for every call that mutates remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::DeleteLock(..)
                | Call::CreateLock(..)
                | Call::AddNetworkRule(_)
                | Call::RemoveNetworkRule(_)
                | Call::CreateRoleAssignment(_)
                | Call::DeleteRoleAssignment(_)
                | Call::SetSubscription(_)
        )
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    locks: Vec<(ObservedLock, LockScope)>,
    deny_by_default: bool,
    network_rules: Vec<String>,
    role_assignments: Vec<(String, String, String)>,
    secrets: Vec<(String, String)>,
    vaults: Vec<String>,
    fail_principal: bool,
    fail_list_locks: bool,
    fail_delete_lock: HashSet<String>,
    fail_create_lock: HashSet<String>,
    fail_add_network_rule: bool,
    fail_remove_network_rule: bool,
    fail_create_role: bool,
    fail_list_secrets: bool,
    fail_read_secret: bool,
    fail_caller_address: bool,
    unreadable_secret_attempts: u32,
    interrupt_on_read: Option<InterruptSignal>,
}

pub struct FakeControlPlane {
    state: Mutex<State>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    fn record(&self, call: Call) {
        self.with(|s| s.calls.push(call));
    }

    pub fn resource(&self) -> ResourceRef {
        ResourceRef::from_resource_id(VAULT_ID).unwrap()
    }

    // --- Arrange -------------------------------------------------------------

    pub fn deny_by_default(&self) {
        self.with(|s| s.deny_by_default = true);
    }

    pub fn add_lock(&self, name: &str, level: LockLevel, notes: Option<&str>) {
        let scope = ScopeResolver::bind(ScopeResolver::resolve(name), &self.resource());
        self.with(|s| {
            s.locks.push((
                ObservedLock { name: name.to_string(), level, notes: notes.map(str::to_string) },
                scope,
            ))
        });
    }

    pub fn add_network_entry(&self, entry: &str) {
        self.with(|s| s.network_rules.push(entry.to_string()));
    }

    pub fn grant_existing_role(&self, principal: &str, scope: &str, role: &str) {
        self.with(|s| {
            s.role_assignments
                .push((principal.to_string(), scope.to_string(), role.to_string()))
        });
    }

    pub fn add_secret(&self, name: &str, value: &str) {
        self.with(|s| s.secrets.push((name.to_string(), value.to_string())));
    }

    pub fn add_vault(&self, name: &str) {
        self.with(|s| s.vaults.push(name.to_string()));
    }

    pub fn fail_principal(&self) {
        self.with(|s| s.fail_principal = true);
    }

    pub fn fail_list_locks(&self) {
        self.with(|s| s.fail_list_locks = true);
    }

    pub fn fail_delete_lock(&self, name: &str) {
        self.with(|s| s.fail_delete_lock.insert(name.to_string()));
    }

    pub fn fail_create_lock(&self, name: &str) {
        self.with(|s| s.fail_create_lock.insert(name.to_string()));
    }

    pub fn fail_add_network_rule(&self) {
        self.with(|s| s.fail_add_network_rule = true);
    }

    pub fn fail_remove_network_rule(&self) {
        self.with(|s| s.fail_remove_network_rule = true);
    }

    pub fn fail_create_role(&self) {
        self.with(|s| s.fail_create_role = true);
    }

    pub fn fail_list_secrets(&self) {
        self.with(|s| s.fail_list_secrets = true);
    }

    pub fn fail_read_secret(&self) {
        self.with(|s| s.fail_read_secret = true);
    }

    pub fn fail_caller_address(&self) {
        self.with(|s| s.fail_caller_address = true);
    }

    /// The first `attempts` secret reads fail as if not yet propagated.
    pub fn delay_secret_reads(&self, attempts: u32) {
        self.with(|s| s.unreadable_secret_attempts = attempts);
    }

    /// Raises `interrupt` while a secret read is in flight.
    pub fn interrupt_on_read(&self, interrupt: InterruptSignal) {
        self.with(|s| s.interrupt_on_read = Some(interrupt));
    }

    // --- Assert --------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn lock_names(&self) -> Vec<String> {
        self.with(|s| s.locks.iter().map(|(l, _)| l.name.clone()).collect())
    }

    pub fn locks(&self) -> Vec<(String, LockScope, Option<String>)> {
        self.with(|s| {
            s.locks
                .iter()
                .map(|(l, scope)| (l.name.clone(), scope.clone(), l.notes.clone()))
                .collect()
        })
    }

    pub fn network_entries(&self) -> Vec<String> {
        self.with(|s| s.network_rules.clone())
    }

    pub fn role_assignment_count(&self) -> usize {
        self.with(|s| s.role_assignments.len())
    }

    fn reachable(state: &State) -> bool {
        !state.deny_by_default || state.network_rules.iter().any(|r| r == CALLER_ENTRY)
    }
}

#[async_trait]
impl CloudControlPlane for FakeControlPlane {
    async fn resolve_principal(&self) -> Result<String, String> {
        self.record(Call::ResolvePrincipal);
        if self.with(|s| s.fail_principal) {
            return Err("Please run 'az login' to setup account.".into());
        }
        Ok(PRINCIPAL.to_string())
    }

    async fn active_subscription(&self) -> Result<String, String> {
        self.record(Call::ActiveSubscription);
        Ok(self.resource().subscription_id)
    }

    async fn resolve_resource(&self, vault_name: &str) -> Result<ResourceRef, String> {
        self.record(Call::ResolveResource(vault_name.to_string()));
        let resource = self.resource();
        if vault_name != resource.name {
            return Err(format!("The Vault '{}' not found", vault_name));
        }
        Ok(resource)
    }

    async fn network_default_action(&self, _resource: &ResourceRef) -> Result<NetworkDefaultAction, String> {
        self.record(Call::NetworkDefaultAction);
        Ok(if self.with(|s| s.deny_by_default) {
            NetworkDefaultAction::Deny
        } else {
            NetworkDefaultAction::Allow
        })
    }

    async fn list_locks(&self, _resource: &ResourceRef) -> Result<Vec<ObservedLock>, String> {
        self.record(Call::ListLocks);
        self.with(|s| {
            if s.fail_list_locks {
                return Err("AuthorizationFailed".into());
            }
            Ok(s.locks.iter().map(|(l, _)| l.clone()).collect())
        })
    }

    async fn delete_lock(&self, scope: &LockScope, name: &str) -> Result<(), String> {
        self.record(Call::DeleteLock(name.to_string(), scope.kind()));
        self.with(|s| {
            if s.fail_delete_lock.contains(name) {
                return Err("AuthorizationFailed".into());
            }
            let before = s.locks.len();
            s.locks.retain(|(l, sc)| !(l.name == name && sc == scope));
            if s.locks.len() == before {
                return Err(format!("LockNotFound: {}", name));
            }
            Ok(())
        })
    }

    async fn create_lock(&self, scope: &LockScope, name: &str, notes: Option<&str>) -> Result<(), String> {
        self.record(Call::CreateLock(name.to_string(), scope.kind()));
        self.with(|s| {
            if s.fail_create_lock.contains(name) {
                return Err("AuthorizationFailed".into());
            }
            s.locks.push((
                ObservedLock {
                    name: name.to_string(),
                    level: LockLevel::CanNotDelete,
                    notes: notes.map(str::to_string),
                },
                scope.clone(),
            ));
            Ok(())
        })
    }

    async fn add_network_rule(&self, _resource: &ResourceRef, entry: &str) -> Result<(), String> {
        self.record(Call::AddNetworkRule(entry.to_string()));
        self.with(|s| {
            if s.fail_add_network_rule {
                return Err("Operation failed".into());
            }
            if s.locks.iter().any(|(l, _)| l.level == LockLevel::CanNotDelete) {
                return Err("ScopeLocked: the scope cannot perform write operation".into());
            }
            if s.network_rules.iter().any(|r| r == entry) {
                return Err(format!("Rule {} already exists", entry));
            }
            s.network_rules.push(entry.to_string());
            Ok(())
        })
    }

    async fn remove_network_rule(&self, _resource: &ResourceRef, entry: &str) -> Result<(), String> {
        self.record(Call::RemoveNetworkRule(entry.to_string()));
        self.with(|s| {
            if s.fail_remove_network_rule {
                return Err("Operation failed".into());
            }
            s.network_rules.retain(|r| r != entry);
            Ok(())
        })
    }

    async fn list_role_assignments(
        &self,
        principal: &str,
        scope: &str,
        role: &str,
    ) -> Result<Vec<RoleAssignment>, String> {
        self.record(Call::ListRoleAssignments);
        Ok(self.with(|s| {
            s.role_assignments
                .iter()
                .filter(|(p, sc, r)| p == principal && sc == scope && r == role)
                .map(|(_, sc, r)| RoleAssignment {
                    role_definition_name: r.clone(),
                    scope: sc.clone(),
                })
                .collect()
        }))
    }

    async fn create_role_assignment(&self, principal: &str, scope: &str, role: &str) -> Result<(), String> {
        self.record(Call::CreateRoleAssignment(role.to_string()));
        self.with(|s| {
            if s.fail_create_role {
                return Err("AuthorizationFailed: does not have authorization to perform action".into());
            }
            s.role_assignments
                .push((principal.to_string(), scope.to_string(), role.to_string()));
            Ok(())
        })
    }

    async fn delete_role_assignment(&self, principal: &str, scope: &str, role: &str) -> Result<(), String> {
        self.record(Call::DeleteRoleAssignment(role.to_string()));
        self.with(|s| {
            s.role_assignments
                .retain(|(p, sc, r)| !(p == principal && sc == scope && r == role));
            Ok(())
        })
    }

    async fn list_secrets(&self, _resource: &ResourceRef) -> Result<Vec<String>, String> {
        self.record(Call::ListSecrets);
        self.with(|s| {
            if s.fail_list_secrets || !Self::reachable(s) {
                return Err("Forbidden: client address is not authorized".into());
            }
            Ok(s.secrets.iter().map(|(n, _)| n.clone()).collect())
        })
    }

    async fn read_secret(&self, _resource: &ResourceRef, name: &str) -> Result<SecretValue, String> {
        self.record(Call::ReadSecret(name.to_string()));
        self.with(|s| {
            if let Some(interrupt) = &s.interrupt_on_read {
                interrupt.raise();
            }
            if s.fail_read_secret || !Self::reachable(s) {
                return Err("Forbidden".into());
            }
            if s.unreadable_secret_attempts > 0 {
                s.unreadable_secret_attempts -= 1;
                return Err("SecretNotFound".into());
            }
            s.secrets
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| SecretValue::new(v.clone()))
                .ok_or_else(|| format!("SecretNotFound: {}", name))
        })
    }

    async fn caller_public_address(&self) -> Result<IpAddr, String> {
        self.record(Call::CallerAddress);
        if self.with(|s| s.fail_caller_address) {
            return Err("curl: could not resolve host".into());
        }
        Ok(IpAddr::from([203, 0, 113, 7]))
    }
}

#[async_trait]
impl VaultDirectory for FakeControlPlane {
    async fn list_vaults(&self, subscription_id: &str) -> Result<Vec<String>, String> {
        self.record(Call::ListVaults(subscription_id.to_string()));
        Ok(self.with(|s| s.vaults.clone()))
    }

    async fn set_active_subscription(&self, subscription_id: &str) -> Result<(), String> {
        self.record(Call::SetSubscription(subscription_id.to_string()));
        Ok(())
    }
}
