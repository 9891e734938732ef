// 🛡️ Zero-Trust Architecture: every remote side effect sits behind `traits`.

pub mod traits;     // Control plane contracts & shared types
pub mod azure;      // az CLI implementation
pub mod secrets;    // Memory hygiene (SecretValue)
pub mod signals;    // SIGINT/SIGTERM → interrupt flag
pub mod poller;     // Propagation polling
pub mod scope;      // Lock scope inference
pub mod locks;      // Delete-lock capture/remove/restore
pub mod firewall;   // Network allow-list
pub mod rbac;       // Role assignment
pub mod cleanup;    // Rollback coordinator

#[cfg(test)]
pub mod testing;
