// src/sys/firewall.rs
//
// 🛡️ Single-Responsibility: the caller's entry in the vault's network allow-list.

use std::time::Duration;
use tracing::{info, warn};

use crate::session::AccessSession;
use crate::sys::locks::LockGuard;
use crate::sys::poller::{PollOutcome, PropagationPoller};
use crate::sys::traits::{allow_list_entry, CloudControlPlane, NetworkDefaultAction, ResourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkGrant {
    Granted,
    /// Delete locks were present and none could be removed.
    Blocked,
}

pub struct NetworkAccessGuard<'a> {
    plane: &'a dyn CloudControlPlane,
    locks: LockGuard<'a>,
    poller: &'a PropagationPoller,
    lock_settle: Duration,
}

impl<'a> NetworkAccessGuard<'a> {
    pub fn new(plane: &'a dyn CloudControlPlane, poller: &'a PropagationPoller, lock_settle: Duration) -> Self {
        Self {
            plane,
            locks: LockGuard::new(plane),
            poller,
            lock_settle,
        }
    }

    pub fn locks(&self) -> &LockGuard<'a> {
        &self.locks
    }

    /// Opens the vault firewall for the caller's public address. Every change
    /// made is recorded on `session` before the next remote call, so rollback
    /// sees it even if a later step fails. Errs if the network policy cannot be
    /// read, or if the vault denies by default and the address is unknown.
    pub async fn grant(&self, session: &mut AccessSession, resource: &ResourceRef) -> Result<NetworkGrant, String> {
        let action = self
            .plane
            .network_default_action(resource)
            .await
            .map_err(|e| format!("Failed to read network policy of {}: {}", resource.name, e))?;

        if action != NetworkDefaultAction::Deny {
            info!("🌐 {} has no network restriction (default action Allow)", resource.name);
            return Ok(NetworkGrant::Granted);
        }

        // Only a restricted vault needs to know who is calling.
        let caller = self
            .plane
            .caller_public_address()
            .await
            .map_err(|e| format!("cannot determine public address: {}", e))?;
        let entry = allow_list_entry(&caller);
        session.set_caller_address(entry.clone());

        let captured = match self.locks.capture(resource).await {
            Ok(records) => records,
            Err(e) => {
                warn!("⚠️ {}. Proceeding as if no delete locks are present.", e);
                Vec::new()
            }
        };

        if !captured.is_empty() {
            let removed = self.locks.remove(&captured).await;
            if removed.is_empty() {
                warn!("⚠️ {} delete lock(s) block the network change and none could be removed", captured.len());
                return Ok(NetworkGrant::Blocked);
            }
            session.record_locks_removed(removed);
            tokio::time::sleep(self.lock_settle).await;
        }

        if let Err(e) = self.plane.add_network_rule(resource, &entry).await {
            warn!(
                "⚠️ Could not add {} to the allow-list of {} ({}). Continuing; access may already be sufficient.",
                entry, resource.name, e
            );
            return Ok(NetworkGrant::Granted);
        }
        session.mark_network_rule_added()?;
        info!("🛡️ Firewall: allowed {} on {}", entry, resource.name);

        let plane = self.plane;
        let outcome = self
            .poller
            .poll("network rule propagation", move || async move {
                plane.list_secrets(resource).await.map(|_| true)
            })
            .await;

        match outcome {
            PollOutcome::Succeeded(()) => info!("✅ Network access to {} is live", resource.name),
            PollOutcome::TimedOut { attempts } => warn!(
                "⚠️ Network rule not visible after {} attempts. Continuing anyway.",
                attempts
            ),
            PollOutcome::Interrupted { .. } => {}
        }

        Ok(NetworkGrant::Granted)
    }

    /// Removes the allow-list entry, only if this session added it.
    /// Returns whether a removal was attempted and succeeded.
    pub async fn revoke(&self, session: &mut AccessSession) -> bool {
        let Some(entry) = session.take_network_rule() else {
            return false;
        };
        let Some(resource) = session.resource() else {
            return false;
        };

        match self.plane.remove_network_rule(resource, &entry).await {
            Ok(()) => {
                info!("✅ Firewall: removed {} from {}", entry, resource.name);
                true
            }
            Err(e) => {
                warn!("⚠️ Failed to remove {} from {}: {}. Remove it manually.", entry, resource.name, e);
                false
            }
        }
    }
}

// ==============================================================================
// 🛡️ Unit Tests
// ==============================================================================
