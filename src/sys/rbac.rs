// src/sys/rbac.rs

use tracing::{info, warn};

use crate::sys::traits::{CloudControlPlane, RoleAssignment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGrant {
    AlreadyPresent,
    CreatedNew,
    /// Non-fatal: the caller may hold sufficient access at a broader scope.
    CreateFailed,
}

/// Idempotent grant of one named role to the caller at one scope.
pub struct RoleGuard<'a> {
    plane: &'a dyn CloudControlPlane,
    role: String,
}

impl<'a> RoleGuard<'a> {
    pub fn new(plane: &'a dyn CloudControlPlane, role: impl Into<String>) -> Self {
        Self { plane, role: role.into() }
    }

    /// Produces exactly one outcome per call. A failed lookup is treated as
    /// "not present" and creation is attempted.
    pub async fn grant(&self, principal: &str, scope: &str) -> RoleGrant {
        match self.plane.list_role_assignments(principal, scope, &self.role).await {
            Ok(existing) if existing.iter().any(|a| self.covers(a, scope)) => {
                info!("👤 '{}' already assigned at {}; leaving it untouched", self.role, scope);
                return RoleGrant::AlreadyPresent;
            }
            Ok(_) => {}
            Err(e) => warn!("⚠️ Could not list role assignments ({}). Attempting to create.", e),
        }

        match self.plane.create_role_assignment(principal, scope, &self.role).await {
            Ok(()) => {
                info!("✅ Granted '{}' at {}", self.role, scope);
                RoleGrant::CreatedNew
            }
            Err(e) => {
                warn!(
                    "⚠️ Failed to grant '{}' ({}). Continuing; existing access may be sufficient.",
                    self.role, e
                );
                RoleGrant::CreateFailed
            }
        }
    }

    fn covers(&self, assignment: &RoleAssignment, scope: &str) -> bool {
        assignment.role_definition_name.eq_ignore_ascii_case(&self.role)
            && assignment.scope.eq_ignore_ascii_case(scope)
    }

    /// Deletes the assignment. Callers invoke this only for `CreatedNew` grants.
    pub async fn revoke(&self, principal: &str, scope: &str) -> bool {
        match self.plane.delete_role_assignment(principal, scope, &self.role).await {
            Ok(()) => {
                info!("✅ Revoked '{}' at {}", self.role, scope);
                true
            }
            Err(e) => {
                warn!("⚠️ Failed to revoke '{}' at {}: {}. Remove it manually.", self.role, scope, e);
                false
            }
        }
    }
}
