// src/bypass/manager.rs
//! Issues and redeems bypass tokens
//!
//! Tokens live in memory only. A token present in the map has not been
//! redeemed; redemption removes it, so of two concurrent redeemers exactly
//! one succeeds.

use crate::bypass::token::BypassToken;
use crate::trust::TrustStore;
use crate::utils::errors::{EngineError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bypass token registry
pub struct BypassTokenManager {
    /// Token string -> token
    tokens: DashMap<String, BypassToken>,

    /// Trust store updated on successful redemption
    trust: Arc<TrustStore>,
}

impl BypassTokenManager {
    pub fn new(trust: Arc<TrustStore>) -> Self {
        Self {
            tokens: DashMap::new(),
            trust,
        }
    }

    /// Issue (or re-issue) the token for `host` in the window containing `now`
    pub fn issue(&self, host: &str, now: i64) -> BypassToken {
        let token = BypassToken::new(host, now);
        let value = token.value();

        if self.tokens.insert(value.clone(), token.clone()).is_none() {
            info!("Created bypass token for {}: {}", host, value);
        } else {
            debug!("Re-issued bypass token {}", value);
        }

        token
    }

    /// Redeem a presented token.
    ///
    /// Exact match first. Otherwise a stored token is accepted when both it and
    /// the presented token start with `<request_host>_`, which tolerates links
    /// mangled by the browser. On success the token is consumed and
    /// `client_id` becomes trusted for the token's host.
    pub fn redeem(&self, presented: &str, request_host: &str, client_id: &str) -> Result<String> {
        let claimed = self
            .tokens
            .remove(presented)
            .or_else(|| self.remove_by_host_prefix(presented, request_host));

        match claimed {
            Some((value, token)) => {
                info!("Bypass granted for {} (token {})", token.host, value);
                self.trust.mark_trusted(client_id, &token.host);
                Ok(token.host)
            }
            None => {
                warn!("Invalid bypass token: {:?}", presented);
                Err(EngineError::InvalidToken(presented.to_string()))
            }
        }
    }

    fn remove_by_host_prefix(&self, presented: &str, request_host: &str) -> Option<(String, BypassToken)> {
        if request_host.is_empty() {
            return None;
        }

        let prefix = format!("{}_", request_host);
        if !presented.starts_with(&prefix) {
            return None;
        }

        let candidate = self
            .tokens
            .iter()
            .find(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())?;

        // Another flow may have consumed it since the scan
        self.tokens.remove(&candidate)
    }

    /// Currently redeemable tokens, sorted
    pub fn active_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.tokens.iter().map(|e| e.key().clone()).collect();
        tokens.sort();
        tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
