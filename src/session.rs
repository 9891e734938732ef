// src/session.rs

use std::fmt;
use tracing::error;

use crate::sys::traits::{LockRecord, ResourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Init,
    Authenticated,
    ResourceSelected,
    AccessGranting,
    Operational,
    Reverting,
    Closed,
}

impl SessionPhase {
    /// Forward edges only. Reverting is entered through `begin_revert`.
    fn next(self) -> Option<SessionPhase> {
        match self {
            SessionPhase::Init => Some(SessionPhase::Authenticated),
            SessionPhase::Authenticated => Some(SessionPhase::ResourceSelected),
            SessionPhase::ResourceSelected => Some(SessionPhase::AccessGranting),
            SessionPhase::AccessGranting => Some(SessionPhase::Operational),
            SessionPhase::Operational => Some(SessionPhase::Reverting),
            SessionPhase::Reverting => Some(SessionPhase::Closed),
            SessionPhase::Closed => None,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// All mutable state of one run. The boolean and sequence fields double as
/// consumption flags: rollback takes them, so a second rollback finds nothing.
#[derive(Debug)]
pub struct AccessSession {
    resource: Option<ResourceRef>,
    principal: Option<String>,
    caller_address: Option<String>,
    locks_removed: Vec<LockRecord>,
    network_rule_added: bool,
    role_granted_this_session: bool,
    phase: SessionPhase,
}

impl AccessSession {
    pub fn new() -> Self {
        Self {
            resource: None,
            principal: None,
            caller_address: None,
            locks_removed: Vec::new(),
            network_rule_added: false,
            role_granted_this_session: false,
            phase: SessionPhase::Init,
        }
    }

    // --- Phase transitions ---------------------------------------------------

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn advance(&mut self, next: SessionPhase) -> Result<(), String> {
        if self.phase.next() != Some(next) || next == SessionPhase::Reverting {
            return Err(format!("Illegal session transition {} -> {}", self.phase, next));
        }
        self.phase = next;
        Ok(())
    }

    pub fn authenticate(&mut self, principal: String) -> Result<(), String> {
        self.advance(SessionPhase::Authenticated)?;
        self.principal = Some(principal);
        Ok(())
    }

    pub fn select_resource(&mut self, resource: ResourceRef) -> Result<(), String> {
        self.advance(SessionPhase::ResourceSelected)?;
        self.resource = Some(resource);
        Ok(())
    }

    pub fn begin_granting(&mut self) -> Result<(), String> {
        self.advance(SessionPhase::AccessGranting)
    }

    pub fn begin_operation(&mut self) -> Result<(), String> {
        self.advance(SessionPhase::Operational)
    }

    /// Enters Reverting from any live phase. Returns false when rollback has
    /// already started or finished, which suppresses re-entry.
    pub fn begin_revert(&mut self) -> bool {
        match self.phase {
            SessionPhase::Reverting | SessionPhase::Closed => false,
            _ => {
                self.phase = SessionPhase::Reverting;
                true
            }
        }
    }

    pub fn close(&mut self) -> Result<(), String> {
        self.advance(SessionPhase::Closed)
    }

    // --- Accessors -----------------------------------------------------------

    pub fn resource(&self) -> Option<&ResourceRef> {
        self.resource.as_ref()
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn caller_address(&self) -> Option<&str> {
        self.caller_address.as_deref()
    }

    pub fn locks_removed(&self) -> &[LockRecord] {
        &self.locks_removed
    }

    pub fn network_rule_added(&self) -> bool {
        self.network_rule_added
    }

    pub fn role_granted_this_session(&self) -> bool {
        self.role_granted_this_session
    }

    // --- Side-effect bookkeeping ---------------------------------------------

    pub fn set_caller_address(&mut self, entry: String) {
        self.caller_address = Some(entry);
    }

    /// Requires the caller address to be known first.
    pub fn mark_network_rule_added(&mut self) -> Result<(), String> {
        if self.caller_address.is_none() {
            return Err("Network rule recorded without a caller address".into());
        }
        self.network_rule_added = true;
        Ok(())
    }

    pub fn record_locks_removed(&mut self, records: Vec<LockRecord>) {
        self.locks_removed.extend(records);
    }

    pub fn mark_role_granted(&mut self) {
        self.role_granted_this_session = true;
    }

    /// Consumes the network rule flag, yielding the entry to remove.
    pub fn take_network_rule(&mut self) -> Option<String> {
        if !std::mem::take(&mut self.network_rule_added) {
            return None;
        }
        self.caller_address.clone()
    }

    pub fn take_role_grant(&mut self) -> bool {
        std::mem::take(&mut self.role_granted_this_session)
    }

    pub fn take_removed_locks(&mut self) -> Vec<LockRecord> {
        std::mem::take(&mut self.locks_removed)
    }

    /// Human-readable list of side effects that still need reverting.
    pub fn outstanding(&self) -> Vec<String> {
        let mut pending = Vec::new();
        let resource = self.resource.as_ref().map(|r| r.id.as_str()).unwrap_or("<unresolved>");

        if self.network_rule_added {
            pending.push(format!(
                "network rule {} on {}",
                self.caller_address.as_deref().unwrap_or("<unknown>"),
                resource
            ));
        }
        if self.role_granted_this_session {
            pending.push(format!(
                "role assignment for {} on {}",
                self.principal.as_deref().unwrap_or("<unknown>"),
                resource
            ));
        }
        for lock in &self.locks_removed {
            pending.push(format!("delete lock '{}' at {}", lock.name, lock.scope.scope_id()));
        }
        pending
    }
}

impl Default for AccessSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AccessSession {
    fn drop(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        for item in self.outstanding() {
            error!("❌ Session ended without rollback. Manual cleanup required: {}", item);
        }
    }
}
