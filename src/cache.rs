// src/cache.rs
//
// Local state for the vault picker: a per-subscription listing cache with a
// TTL, and the last explicitly selected subscription.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const SUBSCRIPTION_FILE: &str = "subscription";

#[derive(Debug, Serialize, Deserialize)]
struct CachedListing {
    subscription_id: String,
    fetched_at: DateTime<Utc>,
    vaults: Vec<String>,
}

/// 🛡️ Subscription ids become file names, so only GUID-ish text is accepted.
fn validate_subscription_id(id: &str) -> Result<(), String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]{1,64}$").expect("static regex"));
    if pattern.is_match(id) {
        Ok(())
    } else {
        Err(format!("Invalid subscription id: '{}'", id))
    }
}

pub struct ResourceCache {
    dir: PathBuf,
    ttl: chrono::Duration,
}

impl ResourceCache {
    pub fn new(dir: PathBuf, ttl: chrono::Duration) -> Self {
        Self { dir, ttl }
    }

    fn listing_path(&self, subscription_id: &str) -> Result<PathBuf, String> {
        validate_subscription_id(subscription_id)?;
        Ok(self.dir.join(format!("vaults-{}.json", subscription_id)))
    }

    /// Cached vault names, or None when missing, unreadable or older than the TTL.
    pub fn load(&self, subscription_id: &str, now: DateTime<Utc>) -> Option<Vec<String>> {
        let path = self.listing_path(subscription_id).ok()?;
        let raw = fs::read_to_string(&path).ok()?;

        let listing: CachedListing = match serde_json::from_str(&raw) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("⚠️ Ignoring corrupt vault cache {}: {}", path.display(), e);
                return None;
            }
        };

        if listing.subscription_id != subscription_id {
            return None;
        }
        if now - listing.fetched_at > self.ttl {
            debug!("vault cache for {} expired (fetched {})", subscription_id, listing.fetched_at);
            return None;
        }
        Some(listing.vaults)
    }

    pub fn store(&self, subscription_id: &str, vaults: &[String], now: DateTime<Utc>) -> Result<(), String> {
        let path = self.listing_path(subscription_id)?;
        let listing = CachedListing {
            subscription_id: subscription_id.to_string(),
            fetched_at: now,
            vaults: vaults.to_vec(),
        };
        let body = serde_json::to_vec_pretty(&listing).map_err(|e| format!("Failed to encode vault cache: {}", e))?;
        write_atomic(&self.dir, &path, &body)
    }

    pub fn last_subscription(&self) -> Option<String> {
        let raw = fs::read_to_string(self.dir.join(SUBSCRIPTION_FILE)).ok()?;
        let id = raw.trim();
        validate_subscription_id(id).ok()?;
        Some(id.to_string())
    }

    pub fn remember_subscription(&self, subscription_id: &str) -> Result<(), String> {
        validate_subscription_id(subscription_id)?;
        let path = self.dir.join(SUBSCRIPTION_FILE);
        write_atomic(&self.dir, &path, format!("{}\n", subscription_id).as_bytes())
    }
}

/// Write-to-temp then rename, so a reader never observes a half-written file.
fn write_atomic(dir: &Path, target: &Path, body: &[u8]) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| format!("Failed to create cache directory {}: {}", dir.display(), e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| format!("Failed to create temp file: {}", e))?;
    temp.write_all(body).map_err(|e| format!("Failed to write temp file: {}", e))?;
    temp.persist(target)
        .map_err(|e| format!("Failed to persist {}: {}", target.display(), e.error))?;
    Ok(())
}
