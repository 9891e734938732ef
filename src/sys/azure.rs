// src/sys/azure.rs
//
// 🛡️ Concrete control plane: every remote call is one `az` invocation with
// discrete arguments (no shell), JSON or TSV output, and scrubbed stderr.

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::debug;

use crate::sys::secrets::SecretValue;
use crate::sys::traits::{
    CloudControlPlane, LockScope, NetworkDefaultAction, ObservedLock, ResourceRef, RoleAssignment,
    VaultDirectory,
};

const ADDRESS_ENDPOINT: &str = "https://api.ipify.org";

/// Redacts bearer tokens (JWTs) that `az --debug`-style errors can echo back.
fn scrub_tokens(input: &str) -> String {
    static JWT: OnceLock<Regex> = OnceLock::new();
    let re = JWT.get_or_init(|| {
        Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]*").expect("static regex")
    });
    re.replace_all(input, "[REDACTED]").to_string()
}

/// Zero-Trust argument guard: names are passed as discrete argv entries, but
/// a leading '-' would still be parsed as a flag by `az`.
fn validate_name(kind: &str, value: &str, max_len: usize) -> Result<(), String> {
    if value.is_empty() || value.len() > max_len {
        return Err(format!("Invalid {} name length: '{}'", kind, value));
    }
    if value.starts_with('-') || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("SECURITY VIOLATION: Invalid {} name '{}'", kind, value));
    }
    Ok(())
}

fn lock_scope_args(scope: &LockScope) -> Vec<String> {
    match scope {
        LockScope::Resource { resource_id } => vec!["--resource".into(), resource_id.clone()],
        LockScope::ResourceGroup { subscription_id, resource_group } => vec![
            "--resource-group".into(),
            resource_group.clone(),
            "--subscription".into(),
            subscription_id.clone(),
        ],
        LockScope::Subscription { subscription_id } => {
            vec!["--subscription".into(), subscription_id.clone()]
        }
    }
}

#[derive(Deserialize)]
struct AccountUser {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

pub struct AzCliControlPlane {
    az_binary: String,
}

impl AzCliControlPlane {
    pub fn new() -> Self {
        Self { az_binary: "az".to_string() }
    }

    /// Runs `az` and returns raw stdout. Ownership of the buffer passes to the
    /// caller so secret output is never copied here.
    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, String> {
        let summary = args.iter().take(3).copied().collect::<Vec<_>>().join(" ");
        debug!(command = %summary, "az");

        let output = Command::new(&self.az_binary)
            .args(args)
            .env("AZURE_CORE_ONLY_SHOW_ERRORS", "1")
            .env("AZURE_CORE_NO_COLOR", "1")
            .env("AZURE_CORE_COLLECT_TELEMETRY", "0")
            .output()
            .await
            .map_err(|e| format!("az CLI spawn failed: {}. Is the Azure CLI installed?", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "az {} exited with code {}: {}",
                summary,
                output.status.code().unwrap_or(-1),
                scrub_tokens(stderr.trim())
            ));
        }

        Ok(output.stdout)
    }

    async fn run_text(&self, args: &[&str]) -> Result<String, String> {
        let stdout = self.run(args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, String> {
        let stdout = self.run(args).await?;
        serde_json::from_slice(&stdout)
            .map_err(|e| format!("Unexpected az output for '{}': {}", args.first().unwrap_or(&""), e))
    }

    async fn run_discard(&self, args: &[&str]) -> Result<(), String> {
        self.run(args).await.map(|_| ())
    }
}

impl Default for AzCliControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudControlPlane for AzCliControlPlane {
    async fn resolve_principal(&self) -> Result<String, String> {
        if let Ok(id) = self
            .run_text(&["ad", "signed-in-user", "show", "--query", "id", "-o", "tsv"])
            .await
        {
            if !id.is_empty() {
                return Ok(id);
            }
        }

        // Service principal logins have no signed-in user object.
        let user: AccountUser = self
            .run_json(&["account", "show", "--query", "user", "-o", "json"])
            .await
            .map_err(|e| format!("{}. Run 'az login' first.", e))?;

        if user.kind != "servicePrincipal" || user.name.is_empty() {
            return Err(format!("Cannot resolve object id for '{}'. Run 'az login' first.", user.name));
        }
        let id = self
            .run_text(&["ad", "sp", "show", "--id", &user.name, "--query", "id", "-o", "tsv"])
            .await?;
        if id.is_empty() {
            return Err(format!("Service principal '{}' has no object id", user.name));
        }
        Ok(id)
    }

    async fn active_subscription(&self) -> Result<String, String> {
        let id = self.run_text(&["account", "show", "--query", "id", "-o", "tsv"]).await?;
        if id.is_empty() {
            return Err("No active subscription. Run 'az login' first.".into());
        }
        Ok(id)
    }

    async fn resolve_resource(&self, vault_name: &str) -> Result<ResourceRef, String> {
        validate_name("vault", vault_name, 24)?;
        let id = self
            .run_text(&["keyvault", "show", "--name", vault_name, "--query", "id", "-o", "tsv"])
            .await?;
        ResourceRef::from_resource_id(&id)
    }

    async fn network_default_action(&self, resource: &ResourceRef) -> Result<NetworkDefaultAction, String> {
        let raw = self
            .run_text(&[
                "keyvault", "show",
                "--name", &resource.name,
                "--resource-group", &resource.resource_group,
                "--subscription", &resource.subscription_id,
                "--query", "properties.networkAcls.defaultAction",
                "-o", "tsv",
            ])
            .await?;
        Ok(NetworkDefaultAction::parse(&raw))
    }

    async fn list_locks(&self, resource: &ResourceRef) -> Result<Vec<ObservedLock>, String> {
        self.run_json(&["lock", "list", "--resource", &resource.id, "-o", "json"]).await
    }

    async fn delete_lock(&self, scope: &LockScope, name: &str) -> Result<(), String> {
        let scope_args = lock_scope_args(scope);
        let mut args = vec!["lock", "delete", "--name", name];
        args.extend(scope_args.iter().map(String::as_str));
        self.run_discard(&args).await
    }

    async fn create_lock(&self, scope: &LockScope, name: &str, notes: Option<&str>) -> Result<(), String> {
        let scope_args = lock_scope_args(scope);
        let mut args = vec!["lock", "create", "--name", name, "--lock-type", "CanNotDelete"];
        args.extend(scope_args.iter().map(String::as_str));
        if let Some(notes) = notes {
            args.extend(["--notes", notes]);
        }
        args.extend(["-o", "none"]);
        self.run_discard(&args).await
    }

    async fn add_network_rule(&self, resource: &ResourceRef, entry: &str) -> Result<(), String> {
        self.run_discard(&[
            "keyvault", "network-rule", "add",
            "--name", &resource.name,
            "--resource-group", &resource.resource_group,
            "--subscription", &resource.subscription_id,
            "--ip-address", entry,
            "-o", "none",
        ])
        .await
    }

    async fn remove_network_rule(&self, resource: &ResourceRef, entry: &str) -> Result<(), String> {
        self.run_discard(&[
            "keyvault", "network-rule", "remove",
            "--name", &resource.name,
            "--resource-group", &resource.resource_group,
            "--subscription", &resource.subscription_id,
            "--ip-address", entry,
            "-o", "none",
        ])
        .await
    }

    async fn list_role_assignments(
        &self,
        principal: &str,
        scope: &str,
        role: &str,
    ) -> Result<Vec<RoleAssignment>, String> {
        self.run_json(&[
            "role", "assignment", "list",
            "--assignee", principal,
            "--scope", scope,
            "--role", role,
            "-o", "json",
        ])
        .await
    }

    async fn create_role_assignment(&self, principal: &str, scope: &str, role: &str) -> Result<(), String> {
        self.run_discard(&[
            "role", "assignment", "create",
            "--assignee", principal,
            "--role", role,
            "--scope", scope,
            "-o", "none",
        ])
        .await
    }

    async fn delete_role_assignment(&self, principal: &str, scope: &str, role: &str) -> Result<(), String> {
        self.run_discard(&[
            "role", "assignment", "delete",
            "--assignee", principal,
            "--role", role,
            "--scope", scope,
        ])
        .await
    }

    async fn list_secrets(&self, resource: &ResourceRef) -> Result<Vec<String>, String> {
        self.run_json(&[
            "keyvault", "secret", "list",
            "--vault-name", &resource.name,
            "--query", "[].name",
            "-o", "json",
        ])
        .await
    }

    async fn read_secret(&self, resource: &ResourceRef, name: &str) -> Result<SecretValue, String> {
        validate_name("secret", name, 127)?;
        let stdout = self
            .run(&[
                "keyvault", "secret", "show",
                "--vault-name", &resource.name,
                "--name", name,
                "--query", "value",
                "-o", "tsv",
            ])
            .await?;
        SecretValue::from_cli_output(stdout)
    }

    async fn caller_public_address(&self) -> Result<IpAddr, String> {
        let output = Command::new("curl")
            .args(["-fsS", "--max-time", "10", ADDRESS_ENDPOINT])
            .output()
            .await
            .map_err(|e| format!("curl spawn failed: {}", e))?;

        if !output.status.success() {
            return Err(format!(
                "Public address lookup failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        raw.trim()
            .parse::<IpAddr>()
            .map_err(|_| format!("Public address lookup returned a non-IP value: '{}'", raw.trim()))
    }
}

#[async_trait]
impl VaultDirectory for AzCliControlPlane {
    async fn list_vaults(&self, subscription_id: &str) -> Result<Vec<String>, String> {
        self.run_json(&[
            "keyvault", "list",
            "--subscription", subscription_id,
            "--query", "[].name",
            "-o", "json",
        ])
        .await
    }

    async fn set_active_subscription(&self, subscription_id: &str) -> Result<(), String> {
        self.run_discard(&["account", "set", "--subscription", subscription_id]).await
    }
}
