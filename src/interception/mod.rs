// src/interception/mod.rs
//! Interception layer
//!
//! - **Flow**: request/response values exchanged with the transport
//! - **Pipeline**: request and response phase decisions
//! - **Block Page**: HTML for blocks and failed bypass attempts
//! - **HTTP Adapter**: hyper request/response conversion
//!
//! # Architecture
//!
//! ```text
//! Transport (external)
//!     │
//!     ├─ request  → handle_request  → Forward(ctx) | Respond(302/400/403)
//!     └─ response → handle_response → Allow(reason) | Block(403)
//!                        │
//!                        └─ spawn_blocking: classifier → heuristics
//! ```

pub mod block_page;
pub mod flow;
pub mod http_adapter;
pub mod pipeline;

pub use flow::{
    AllowReason, BlockCause, ContentVerdict, FlowContext, FlowRequest, FlowResponse, InterceptResponse,
    RequestOutcome, ResponseOutcome,
};
pub use http_adapter::{flow_request_from_hyper, flow_response_from_hyper, into_hyper_response};
pub use pipeline::{ContentAnalyzer, InterceptionPipeline};
