// src/trust/store.rs
//! Trust store: whitelist, blacklist and per-client trust cache
//!
//! The whitelist is persisted to a JSON array after every mutation. The
//! blacklist and trust cache live in memory only and reset on restart.

use crate::trust::pattern::TrustPattern;
use crate::utils::errors::{EngineError, Result};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Shared trust state for all flows
pub struct TrustStore {
    /// Normalized pattern string -> compiled pattern (sorted for export)
    whitelist: RwLock<BTreeMap<String, TrustPattern>>,

    /// Blocked hosts
    blacklist: DashSet<String>,

    /// Client id -> host that made the client trusted
    trusted_clients: DashMap<String, String>,

    /// Where whitelist changes are written; `None` keeps it in memory
    persist_path: Option<PathBuf>,
}

impl TrustStore {
    /// Create an in-memory store with nothing persisted
    pub fn new() -> Self {
        Self {
            whitelist: RwLock::new(BTreeMap::new()),
            blacklist: DashSet::new(),
            trusted_clients: DashMap::new(),
            persist_path: None,
        }
    }

    /// Create an in-memory store pre-populated with patterns
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store = Self::new();
        {
            let mut whitelist = store.whitelist.write();
            for raw in patterns {
                let pattern = TrustPattern::parse(raw.as_ref());
                whitelist.insert(pattern.to_string(), pattern);
            }
        }
        store
    }

    /// Load the whitelist from `path` and persist future changes there.
    /// A missing file starts an empty whitelist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let patterns: Vec<String> = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                EngineError::StorageFailed(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&raw)?
        } else {
            warn!("{} not found, running without whitelist", path.display());
            Vec::new()
        };

        let mut store = Self::with_patterns(&patterns);
        info!("Loaded {} whitelist patterns from {}", store.whitelist_len(), path.display());
        store.persist_path = Some(path);

        Ok(store)
    }

    /// Check a host against every whitelist pattern
    pub fn is_whitelisted(&self, host: &str) -> bool {
        let whitelist = self.whitelist.read();
        let host_lower = host.trim().trim_end_matches('.').to_ascii_lowercase();

        if whitelist.contains_key(&host_lower) {
            return true;
        }

        whitelist
            .values()
            .filter(|p| p.is_wildcard())
            .any(|p| p.matches(&host_lower))
    }

    /// Add a pattern. Returns `false` if it was already present.
    pub fn add_whitelist(&self, raw: &str) -> Result<bool> {
        let pattern = TrustPattern::parse(raw);
        let key = pattern.to_string();
        if key.is_empty() {
            return Err(EngineError::InvalidUrl("empty whitelist pattern".to_string()));
        }

        let mut whitelist = self.whitelist.write();
        if whitelist.contains_key(&key) {
            return Ok(false);
        }

        whitelist.insert(key.clone(), pattern);
        if let Err(e) = self.persist(&whitelist) {
            whitelist.remove(&key);
            return Err(e);
        }

        info!("Added {} to whitelist", key);
        Ok(true)
    }

    /// Remove a pattern. Returns `false` if it was not present.
    pub fn remove_whitelist(&self, raw: &str) -> Result<bool> {
        let key = TrustPattern::parse(raw).to_string();

        let mut whitelist = self.whitelist.write();
        let Some(previous) = whitelist.remove(&key) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&whitelist) {
            whitelist.insert(key, previous);
            return Err(e);
        }

        info!("Removed {} from whitelist", key);
        Ok(true)
    }

    /// Add many patterns with a single write. Returns how many were new.
    pub fn bulk_add<I, S>(&self, patterns: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut whitelist = self.whitelist.write();
        let mut added = Vec::new();

        for raw in patterns {
            let pattern = TrustPattern::parse(raw.as_ref());
            let key = pattern.to_string();
            if key.is_empty() || whitelist.contains_key(&key) {
                continue;
            }
            whitelist.insert(key.clone(), pattern);
            added.push(key);
        }

        if let Err(e) = self.persist(&whitelist) {
            for key in &added {
                whitelist.remove(key);
            }
            return Err(e);
        }

        info!("Bulk added {} whitelist patterns", added.len());
        Ok(added.len())
    }

    /// Remove many patterns with a single write. Returns how many existed.
    pub fn bulk_remove<I, S>(&self, patterns: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut whitelist = self.whitelist.write();
        let mut removed = Vec::new();

        for raw in patterns {
            let key = TrustPattern::parse(raw.as_ref()).to_string();
            if let Some(pattern) = whitelist.remove(&key) {
                removed.push((key, pattern));
            }
        }

        if removed.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist(&whitelist) {
            for (key, pattern) in removed {
                whitelist.insert(key, pattern);
            }
            return Err(e);
        }

        info!("Bulk removed {} whitelist patterns", removed.len());
        Ok(removed.len())
    }

    /// All patterns, sorted
    pub fn export(&self) -> Vec<String> {
        self.whitelist.read().keys().cloned().collect()
    }

    /// Sorted patterns containing `term` (case-insensitive)
    pub fn search(&self, term: &str) -> Vec<String> {
        let term = term.to_ascii_lowercase();
        self.whitelist
            .read()
            .keys()
            .filter(|p| p.contains(&term))
            .cloned()
            .collect()
    }

    pub fn whitelist_len(&self) -> usize {
        self.whitelist.read().len()
    }

    pub fn is_blacklisted(&self, host: &str) -> bool {
        self.blacklist.contains(&host.to_ascii_lowercase())
    }

    /// Returns `false` if the host was already blacklisted
    pub fn add_blacklist(&self, host: &str) -> bool {
        let inserted = self.blacklist.insert(host.to_ascii_lowercase());
        if inserted {
            warn!("Added {} to blacklist", host);
        }
        inserted
    }

    pub fn remove_blacklist(&self, host: &str) -> bool {
        self.blacklist.remove(&host.to_ascii_lowercase()).is_some()
    }

    /// Sorted copy of the blacklist
    pub fn blacklist_snapshot(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.blacklist.iter().map(|h| h.key().clone()).collect();
        hosts.sort();
        hosts
    }

    /// Trust every later request from `client_id`
    pub fn mark_trusted(&self, client_id: &str, host: &str) {
        debug!("Marking client {} trusted via {}", client_id, host);
        self.trusted_clients
            .insert(client_id.to_string(), host.to_string());
    }

    pub fn is_client_trusted(&self, client_id: &str) -> bool {
        self.trusted_clients.contains_key(client_id)
    }

    /// Host that made `client_id` trusted, if any
    pub fn trusted_host(&self, client_id: &str) -> Option<String> {
        self.trusted_clients.get(client_id).map(|h| h.value().clone())
    }

    /// Drop trust for a client whose connection closed
    pub fn forget_client(&self, client_id: &str) {
        self.trusted_clients.remove(client_id);
    }

    /// Write the whitelist as a sorted JSON array (temp file + rename)
    fn persist(&self, whitelist: &BTreeMap<String, TrustPattern>) -> Result<()> {
        let Some(path) = self.persist_path.as_deref() else {
            return Ok(());
        };

        let patterns: Vec<&String> = whitelist.keys().collect();
        let json = serde_json::to_string_pretty(&patterns)?;

        write_atomically(path, json.as_bytes()).map_err(|e| {
            error!("Failed to save whitelist to {}: {}", path.display(), e);
            EngineError::StorageFailed(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!("Saved {} whitelist patterns to {}", patterns.len(), path.display());
        Ok(())
    }
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

/// Turn management input (host, pattern or full URL) into a whitelist entry.
/// Full URLs are reduced to their host and a leading `www.` is removed.
pub fn normalize_entry(input: &str) -> Option<String> {
    let input = input.trim();

    let host = if input.starts_with("http://") || input.starts_with("https://") {
        url::Url::parse(input).ok()?.host_str()?.to_string()
    } else {
        input.to_string()
    };

    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
