// src/interception/flow.rs
//! Per-flow values exchanged with the transport
//!
//! A flow is one intercepted request and, unless the request phase answered
//! it, the response that later comes back for it. `FlowContext` is the only
//! state carried between the two phases.

use bytes::Bytes;
use serde::Serialize;

/// Request as seen by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRequest {
    /// Full URL including query
    pub url: String,

    pub path: String,
    pub host: String,

    /// `http` or `https`
    pub scheme: String,

    /// Raw `Accept` header
    pub accept: Option<String>,

    /// Identifies the client connection for the trust cache
    pub client_id: String,
}

impl FlowRequest {
    /// Plain `GET` as a browser would issue it
    pub fn get(url: &str, client_id: &str) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();

        Some(Self {
            url: url.to_string(),
            path: parsed.path().to_string(),
            host,
            scheme: parsed.scheme().to_string(),
            accept: Some("text/html,application/xhtml+xml,*/*;q=0.8".to_string()),
            client_id: client_id.to_string(),
        })
    }

    pub fn with_accept(mut self, accept: Option<&str>) -> Self {
        self.accept = accept.map(str::to_string);
        self
    }

    /// Accept header admits HTML (explicitly or via `*/*`)
    pub fn accepts_html(&self) -> bool {
        self.accept
            .as_deref()
            .is_some_and(|a| a.contains("text/html") || a.contains("*/*"))
    }
}

/// Upstream response handed back for analysis
#[derive(Debug, Clone, PartialEq)]
pub struct FlowResponse {
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FlowResponse {
    pub fn html(body: impl Into<Bytes>) -> Self {
        Self {
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
        }
    }

    /// Media type without parameters, lower-cased (`"unknown"` when absent)
    pub fn media_type(&self) -> String {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/html"))
    }
}

/// State carried from the request phase to the response phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowContext {
    pub skip_analysis: bool,
}

impl FlowContext {
    pub fn skipped() -> Self {
        Self { skip_analysis: true }
    }
}

/// Why a page was blocked
#[derive(Debug, Clone, PartialEq)]
pub enum BlockCause {
    Blacklist,
    Classifier { confidence: f64 },
    Heuristic { patterns: Vec<String> },
}

impl BlockCause {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            BlockCause::Blacklist => "blacklist",
            BlockCause::Classifier { .. } => "classifier",
            BlockCause::Heuristic { .. } => "heuristic",
        }
    }
}

/// Response the engine substitutes for the upstream one
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptResponse {
    pub status: u16,

    /// Redirect target for 302s
    pub location: Option<String>,

    pub body: String,

    /// Set on block pages
    pub cause: Option<BlockCause>,

    /// Bypass token embedded in a block page
    pub token: Option<String>,
}

impl InterceptResponse {
    pub fn redirect(location: String) -> Self {
        Self {
            status: 302,
            location: Some(location),
            body: String::new(),
            cause: None,
            token: None,
        }
    }

    pub fn bad_request(body: String) -> Self {
        Self {
            status: 400,
            location: None,
            body,
            cause: None,
            token: None,
        }
    }

    pub fn blocked(cause: BlockCause, token: String, body: String) -> Self {
        Self {
            status: 403,
            location: None,
            body,
            cause: Some(cause),
            token: Some(token),
        }
    }

    pub fn is_block(&self) -> bool {
        self.status == 403
    }
}

/// Request phase decision
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// Let the request reach upstream; keep the context for the response
    Forward(FlowContext),

    /// Answer the request directly
    Respond(InterceptResponse),
}

/// Why a response was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    SkipAnalysis,
    Trusted,
    NotHtml,
    TooLarge,
    Clean,

    /// Analysis failed unexpectedly
    FailedOpen,
}

/// Response phase decision
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Allow(AllowReason),
    Block(InterceptResponse),
}

impl ResponseOutcome {
    pub fn is_block(&self) -> bool {
        matches!(self, ResponseOutcome::Block(_))
    }
}

/// Verdict on a page's content, free of side effects
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ContentVerdict {
    /// Host is whitelisted
    Trusted,

    Classifier {
        confidence: f64,
    },

    Heuristic {
        confidence: f64,
        patterns: Vec<String>,
    },

    Clean {
        confidence: f64,
        patterns: Vec<String>,
    },
}

impl ContentVerdict {
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            ContentVerdict::Classifier { .. } | ContentVerdict::Heuristic { .. }
        )
    }
}
