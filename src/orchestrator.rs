// src/orchestrator.rs

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cache::ResourceCache;
use crate::config::AccessConfig;
use crate::error::AccessError;
use crate::select::Prompter;
use crate::session::AccessSession;
use crate::sys::cleanup::RollbackCoordinator;
use crate::sys::firewall::{NetworkAccessGuard, NetworkGrant};
use crate::sys::poller::{PollOutcome, PropagationPoller};
use crate::sys::rbac::{RoleGrant, RoleGuard};
use crate::sys::secrets::SecretValue;
use crate::sys::signals::InterruptSignal;
use crate::sys::traits::{CloudControlPlane, ResourceRef, VaultDirectory};

/// What the caller asked for. Anything left `None` is chosen interactively.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub vault: Option<String>,
    pub secret: Option<String>,
    pub subscription: Option<String>,
    pub refresh_cache: bool,
}

#[derive(Debug)]
pub enum SessionOutcome {
    SecretRead { name: String, value: SecretValue },
    /// Graceful: the vault holds no secrets.
    NoSecrets,
}

pub struct SessionOrchestrator {
    plane: Arc<dyn CloudControlPlane>,
    directory: Arc<dyn VaultDirectory>,
    prompter: Box<dyn Prompter>,
    cache: ResourceCache,
    config: AccessConfig,
    interrupt: InterruptSignal,
}

impl SessionOrchestrator {
    pub fn new(
        plane: Arc<dyn CloudControlPlane>,
        directory: Arc<dyn VaultDirectory>,
        prompter: Box<dyn Prompter>,
        config: AccessConfig,
        interrupt: InterruptSignal,
    ) -> Self {
        Self {
            cache: ResourceCache::new(config.cache_dir.clone(), config.cache_ttl),
            plane,
            directory,
            prompter,
            config,
            interrupt,
        }
    }

    /// Runs one full session. Rollback runs exactly once before this returns,
    /// whatever happened in between.
    pub async fn run(&self, request: &SessionRequest) -> Result<SessionOutcome, AccessError> {
        let plane = self.plane.as_ref();
        let poller = PropagationPoller::new(self.config.poll).with_interrupt(self.interrupt.clone());
        let network = NetworkAccessGuard::new(plane, &poller, self.config.lock_settle);
        let roles = RoleGuard::new(plane, self.config.role_name.as_str());
        let mut session = AccessSession::new();

        let result = self.drive(&mut session, request, &poller, &network, &roles).await;

        if let Err(e) = &result {
            error!("❌ {}. Reverting changes before exit.", e);
        }
        RollbackCoordinator::new(&network, &roles).revert(&mut session).await;

        result
    }

    async fn drive(
        &self,
        session: &mut AccessSession,
        request: &SessionRequest,
        poller: &PropagationPoller,
        network: &NetworkAccessGuard<'_>,
        roles: &RoleGuard<'_>,
    ) -> Result<SessionOutcome, AccessError> {
        // Init → Authenticated
        let principal = self
            .plane
            .resolve_principal()
            .await
            .map_err(AccessError::Authentication)?;
        session.authenticate(principal.clone()).map_err(AccessError::Operation)?;
        info!("👤 Authenticated as {}", principal);
        self.checkpoint()?;

        // Authenticated → ResourceSelected
        let resource = self.select_resource(request).await?;
        session.select_resource(resource.clone()).map_err(AccessError::Operation)?;
        info!("🔐 Target vault {} ({})", resource.name, resource.resource_group);
        self.checkpoint()?;

        // ResourceSelected → AccessGranting
        session.begin_granting().map_err(AccessError::Operation)?;
        if roles.grant(&principal, &resource.id).await == RoleGrant::CreatedNew {
            session.mark_role_granted();
        }
        self.pause(self.config.role_settle).await;
        self.checkpoint()?;

        match network.grant(session, &resource).await {
            Ok(NetworkGrant::Granted) => {}
            Ok(NetworkGrant::Blocked) => {
                return Err(AccessError::Blocked(format!(
                    "delete locks on {} could not be removed",
                    resource.name
                )));
            }
            Err(e) => return Err(AccessError::Blocked(e)),
        }
        self.checkpoint()?;

        // AccessGranting → Operational
        session.begin_operation().map_err(AccessError::Operation)?;
        self.read_protected(request, poller, &resource).await
    }

    async fn select_resource(&self, request: &SessionRequest) -> Result<ResourceRef, AccessError> {
        if let Some(subscription) = &request.subscription {
            self.directory
                .set_active_subscription(subscription)
                .await
                .map_err(AccessError::ResourceResolution)?;
            if let Err(e) = self.cache.remember_subscription(subscription) {
                warn!("⚠️ Could not remember subscription choice: {}", e);
            }
        } else if let Some(remembered) = self.cache.last_subscription() {
            if let Err(e) = self.directory.set_active_subscription(&remembered).await {
                warn!("⚠️ Could not switch to remembered subscription {}: {}", remembered, e);
            }
        }

        let vault_name = match &request.vault {
            Some(name) => name.clone(),
            None => self.pick_vault(request.refresh_cache).await?,
        };

        self.plane
            .resolve_resource(&vault_name)
            .await
            .map_err(AccessError::ResourceResolution)
    }

    async fn pick_vault(&self, refresh: bool) -> Result<String, AccessError> {
        let subscription = self
            .plane
            .active_subscription()
            .await
            .map_err(AccessError::ResourceResolution)?;

        let now = Utc::now();
        let cached = if refresh { None } else { self.cache.load(&subscription, now) };
        let vaults = match cached {
            Some(vaults) => vaults,
            None => {
                let fetched = self
                    .directory
                    .list_vaults(&subscription)
                    .await
                    .map_err(AccessError::ResourceResolution)?;
                if let Err(e) = self.cache.store(&subscription, &fetched, now) {
                    warn!("⚠️ Could not cache vault listing: {}", e);
                }
                fetched
            }
        };

        if vaults.is_empty() {
            return Err(AccessError::ResourceResolution(format!(
                "no Key Vaults found in subscription {}",
                subscription
            )));
        }

        let index = self.prompt("Key Vaults", &vaults, "vault").await?;
        Ok(vaults[index].clone())
    }

    /// The protected read: list (polled for read-after-write consistency),
    /// choose, then read (polled for availability).
    async fn read_protected(
        &self,
        request: &SessionRequest,
        poller: &PropagationPoller,
        resource: &ResourceRef,
    ) -> Result<SessionOutcome, AccessError> {
        let plane = self.plane.as_ref();

        let names = match poller
            .poll_for("secret listing", move || plane.list_secrets(resource))
            .await
        {
            PollOutcome::Succeeded(names) => names,
            PollOutcome::TimedOut { attempts } => {
                return Err(AccessError::Operation(format!(
                    "could not list secrets in {} after {} attempts",
                    resource.name, attempts
                )));
            }
            PollOutcome::Interrupted { .. } => return Err(AccessError::Interrupted),
        };
        self.checkpoint()?;

        let name = match &request.secret {
            Some(name) if names.contains(name) => name.clone(),
            Some(name) => {
                warn!("⚠️ Secret '{}' is not listed in {}", name, resource.name);
                return Err(AccessError::Operation(format!(
                    "secret '{}' does not exist in {}",
                    name, resource.name
                )));
            }
            None if names.is_empty() => {
                warn!("⚠️ No secrets found in {}", resource.name);
                return Ok(SessionOutcome::NoSecrets);
            }
            None => {
                let index = self.prompt("Secrets", &names, "secret").await?;
                names[index].clone()
            }
        };

        let secret_name = name.as_str();
        let value = match poller
            .poll_for("secret availability", move || plane.read_secret(resource, secret_name))
            .await
        {
            PollOutcome::Succeeded(value) => value,
            PollOutcome::TimedOut { attempts } => {
                return Err(AccessError::Operation(format!(
                    "secret '{}' not readable after {} attempts",
                    name, attempts
                )));
            }
            PollOutcome::Interrupted { .. } => return Err(AccessError::Interrupted),
        };
        self.checkpoint()?;

        info!("✅ Read secret '{}' from {}", name, resource.name);
        Ok(SessionOutcome::SecretRead { name, value })
    }

    /// Asks the user to pick one of `items`. An interrupt abandons the prompt
    /// so rollback is not held up waiting for input.
    async fn prompt(&self, title: &str, items: &[String], what: &str) -> Result<usize, AccessError> {
        tokio::select! {
            biased;
            _ = self.interrupt.raised() => Err(AccessError::Interrupted),
            answer = self.prompter.choose(title, items) => answer
                .map_err(AccessError::Selection)
                .and_then(|choice| {
                    choice.ok_or_else(|| AccessError::Selection(format!("{} selection declined", what)))
                }),
        }
    }

    fn checkpoint(&self) -> Result<(), AccessError> {
        if self.interrupt.is_raised() {
            return Err(AccessError::Interrupted);
        }
        Ok(())
    }

    /// Fixed settling delay, cut short only by an interrupt.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.interrupt.raised() => {}
        }
    }
}
