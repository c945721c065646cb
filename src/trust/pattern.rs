// src/trust/pattern.rs
//! Whitelist pattern matching
//!
//! A pattern is either an exact host (`example.com`) or a wildcard
//! (`*.example.com`). Wildcards match the bare suffix and any host ending in
//! `.<suffix>`; the dot boundary is required, so `*.example.com` does not
//! match `evilexample.com`.

use std::fmt;

/// Compiled whitelist pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrustPattern {
    /// Exact host equality
    Exact(String),

    /// `*.<suffix>`
    Wildcard { suffix: String },
}

impl TrustPattern {
    /// Parse a raw pattern. Input is trimmed and lower-cased.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();

        match normalized.strip_prefix("*.") {
            Some(suffix) if !suffix.is_empty() => TrustPattern::Wildcard {
                suffix: suffix.to_string(),
            },
            _ => TrustPattern::Exact(normalized),
        }
    }

    /// Check whether `host` is covered by this pattern
    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.');

        match self {
            TrustPattern::Exact(exact) => host.eq_ignore_ascii_case(exact),
            TrustPattern::Wildcard { suffix } => {
                let host = host.to_ascii_lowercase();
                if host == *suffix {
                    return true;
                }
                host.len() > suffix.len()
                    && host.ends_with(suffix.as_str())
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
            }
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, TrustPattern::Wildcard { .. })
    }
}

impl fmt::Display for TrustPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustPattern::Exact(host) => write!(f, "{}", host),
            TrustPattern::Wildcard { suffix } => write!(f, "*.{}", suffix),
        }
    }
}
