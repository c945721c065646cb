// src/management/mod.rs
//! Management API
//!
//! | Route                         | Purpose                                |
//! |-------------------------------|----------------------------------------|
//! | `GET /health`                 | liveness and counters                  |
//! | `GET /whitelist`              | paginated listing, `search` filter     |
//! | `POST /whitelist`             | add `{"domain"}`                       |
//! | `DELETE /whitelist/<pattern>` | remove one pattern                     |
//! | `POST /whitelist/bulk-add`    | add `{"domains": [..]}`                |
//! | `POST /whitelist/bulk-delete` | remove `{"domains": [..]}`             |
//! | `GET /whitelist/export`       | sorted, newline separated              |
//! | `POST /scan`                  | verdict for `{"url", "html"?}`         |

pub mod handlers;
pub mod server;

pub use handlers::{handle, ApiError, ManagementState, PageFetcher, DEFAULT_PER_PAGE};
pub use server::ManagementServer;
