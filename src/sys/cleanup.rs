// src/sys/cleanup.rs
//
// Rollback coordinator. Runs once per session, in the fixed order
// network rule → role assignment → delete locks. Locks go last so a restored
// lock can never block the other cleanups.

use tracing::{info, warn};

use crate::session::AccessSession;
use crate::sys::firewall::NetworkAccessGuard;
use crate::sys::rbac::RoleGuard;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    /// False when rollback had already run for this session.
    pub ran: bool,
    pub network_revoked: bool,
    pub role_revoked: bool,
    pub locks_restored: usize,
    pub locks_failed: usize,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.locks_failed == 0
    }
}

pub struct RollbackCoordinator<'g, 'a> {
    network: &'g NetworkAccessGuard<'a>,
    roles: &'g RoleGuard<'a>,
}

impl<'g, 'a> RollbackCoordinator<'g, 'a> {
    pub fn new(network: &'g NetworkAccessGuard<'a>, roles: &'g RoleGuard<'a>) -> Self {
        Self { network, roles }
    }

    /// Best-effort: every recorded side effect is attempted exactly once and a
    /// failure in one never stops the rest. A second call is a no-op.
    pub async fn revert(&self, session: &mut AccessSession) -> RollbackReport {
        let mut report = RollbackReport::default();
        if !session.begin_revert() {
            return report;
        }
        report.ran = true;
        info!("🧹 Reverting temporary access...");

        report.network_revoked = self.network.revoke(session).await;

        if session.take_role_grant() {
            if let (Some(principal), Some(resource)) = (session.principal(), session.resource()) {
                report.role_revoked = self.roles.revoke(principal, &resource.id).await;
            }
        }

        let locks = session.take_removed_locks();
        if !locks.is_empty() {
            report.locks_restored = self.network.locks().restore(&locks).await;
            report.locks_failed = locks.len() - report.locks_restored;
        }

        if let Err(e) = session.close() {
            warn!("⚠️ {}", e);
        }

        if report.is_clean() {
            info!("✅ Rollback complete");
        } else {
            warn!("⚠️ Rollback finished with {} lock(s) not restored", report.locks_failed);
        }
        report
    }
}
