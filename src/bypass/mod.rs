// src/bypass/mod.rs
//! Block override tokens
//!
//! - **Token**: `<host>_<window>` value with 10-second quantization
//! - **Manager**: idempotent issuance, single-use redemption
//!
//! # Protocol
//!
//! ```text
//! 403 block page ──► link /bypass?token=evil.test_1700000000
//!                          │
//!                          ▼
//!                   redeem(token) ──► ok:  client trusted, 302 to http://evil.test
//!                                 └─► err: 400 listing valid tokens
//! ```
//!
//! Tokens are a usability mechanism, not a security boundary: anyone who can
//! guess a host and a window can build one.

pub mod manager;
pub mod token;

pub use manager::BypassTokenManager;
pub use token::{quantize, BypassToken, TOKEN_WINDOW_SECS};
