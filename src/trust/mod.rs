// src/trust/mod.rs
//! Trust lists
//!
//! - **Pattern**: exact and `*.suffix` host matching with a dot boundary
//! - **Store**: persisted whitelist, volatile blacklist, per-client trust cache
//!
//! # Lookup order
//!
//! ```text
//! host ──► exact whitelist key? ──► yes: trusted
//!              │ no
//!              ▼
//!          wildcard patterns ──► first match: trusted
//! ```

pub mod pattern;
pub mod store;

pub use pattern::TrustPattern;
pub use store::{normalize_entry, TrustStore};
