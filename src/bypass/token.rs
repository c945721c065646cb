// src/bypass/token.rs
//! Bypass token value
//!
//! A token is `<host>_<window>` where `window = floor(now / 10) * 10`, so every
//! block of the same host within one 10-second window yields the same string.

use std::fmt;

/// Width of the issuance window in seconds
pub const TOKEN_WINDOW_SECS: i64 = 10;

/// Start of the window containing `now`
pub fn quantize(now: i64) -> i64 {
    now.div_euclid(TOKEN_WINDOW_SECS) * TOKEN_WINDOW_SECS
}

/// Host-bound, single-use bypass credential
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BypassToken {
    /// Host the token re-admits
    pub host: String,

    /// Quantized issue time (Unix seconds)
    pub issued_window: i64,
}

impl BypassToken {
    pub fn new(host: impl Into<String>, now: i64) -> Self {
        Self {
            host: host.into(),
            issued_window: quantize(now),
        }
    }

    /// String form embedded in block pages
    pub fn value(&self) -> String {
        format!("{}_{}", self.host, self.issued_window)
    }
}

impl fmt::Display for BypassToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.host, self.issued_window)
    }
}
