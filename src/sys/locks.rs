// src/sys/locks.rs

use tracing::{error, info, warn};

use crate::sys::scope::ScopeResolver;
use crate::sys::traits::{CloudControlPlane, LockRecord, ResourceRef};

/// Snapshots, removes and restores delete-protection locks on one resource.
pub struct LockGuard<'a> {
    plane: &'a dyn CloudControlPlane,
}

impl<'a> LockGuard<'a> {
    pub fn new(plane: &'a dyn CloudControlPlane) -> Self {
        Self { plane }
    }

    /// Side-effect free. Returns the ordered delete-protection locks that
    /// protect `resource`, each bound to its inferred scope.
    pub async fn capture(&self, resource: &ResourceRef) -> Result<Vec<LockRecord>, String> {
        let observed = self
            .plane
            .list_locks(resource)
            .await
            .map_err(|e| format!("Failed to list locks on {}: {}", resource.name, e))?;

        let records: Vec<LockRecord> = observed
            .into_iter()
            .filter(|lock| ScopeResolver::is_considered(lock.level))
            .map(|lock| {
                let kind = ScopeResolver::resolve(&lock.name);
                LockRecord {
                    scope: ScopeResolver::bind(kind, resource),
                    name: lock.name,
                    notes: lock.notes,
                }
            })
            .collect();

        for record in &records {
            info!("🔒 Found delete lock '{}' at {} scope", record.name, record.scope_kind());
        }

        Ok(records)
    }

    /// Deletes each lock at its scope. A per-record failure is logged and
    /// skipped. Returns the records actually removed, in capture order.
    pub async fn remove(&self, records: &[LockRecord]) -> Vec<LockRecord> {
        let mut removed = Vec::with_capacity(records.len());

        for record in records {
            match self.plane.delete_lock(&record.scope, &record.name).await {
                Ok(()) => {
                    info!("🔓 Removed lock '{}' ({} scope)", record.name, record.scope_kind());
                    removed.push(record.clone());
                }
                Err(e) => {
                    warn!("⚠️ Could not remove lock '{}' ({} scope): {}", record.name, record.scope_kind(), e);
                }
            }
        }

        removed
    }

    /// Recreates every record at its captured scope with its notes, in
    /// order. Each record is attempted exactly once; failures do not abort.
    /// Returns how many were restored.
    pub async fn restore(&self, records: &[LockRecord]) -> usize {
        let mut restored = 0;

        for record in records {
            match self
                .plane
                .create_lock(&record.scope, &record.name, record.notes.as_deref())
                .await
            {
                Ok(()) => {
                    info!("✅ Restored lock '{}' ({} scope)", record.name, record.scope_kind());
                    restored += 1;
                }
                Err(e) => {
                    error!(
                        "❌ Failed to restore lock '{}' at {}: {}. Recreate it manually.",
                        record.name,
                        record.scope.scope_id(),
                        e
                    );
                }
            }
        }

        restored
    }
}
