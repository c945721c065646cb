// src/management/handlers.rs
//! Management API routes
//!
//! JSON over HTTP/1.1. Whitelist changes go through the same `TrustStore`
//! the pipeline reads, and `/scan` uses the pipeline's own verdict function.

use crate::interception::{flow_response_from_hyper, FlowResponse, InterceptionPipeline};
use crate::trust::normalize_entry;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default page size for `GET /whitelist`
pub const DEFAULT_PER_PAGE: usize = 50;

const MAX_PER_PAGE: usize = 1000;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Request failure mapped to an HTTP status
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Page fetch for `/scan` failed
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status();
        if status.is_server_error() {
            error!("Management request failed: {}", self);
        } else {
            debug!("Management request rejected: {}", self);
        }
        json_response(status, &json!({ "error": self.to_string() }))
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidUrl(msg) => ApiError::BadRequest(msg),
            EngineError::Serialization(e) => ApiError::BadRequest(format!("Invalid JSON: {}", e)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

type ApiResult = std::result::Result<Response<Full<Bytes>>, ApiError>;

/// Fetches pages over http or https for `/scan`
pub struct PageFetcher {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            timeout,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<FlowResponse> {
        let uri: hyper::Uri = url
            .parse()
            .map_err(|e| EngineError::InvalidUrl(format!("{}: {}", url, e)))?;

        let request = Request::get(uri)
            .header(USER_AGENT, FETCH_USER_AGENT)
            .header(ACCEPT, "text/html,*/*;q=0.8")
            .body(Empty::new())
            .map_err(|e| EngineError::ManagementFailed(format!("Request build error: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| EngineError::ManagementFailed(format!("Timed out fetching {}", url)))?
            .map_err(|e| EngineError::ManagementFailed(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::ManagementFailed(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        flow_response_from_hyper(response).await
    }
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self::new(FETCH_TIMEOUT)
    }
}

/// State shared by every management connection
pub struct ManagementState {
    pipeline: Arc<InterceptionPipeline>,
    fetcher: PageFetcher,
}

impl ManagementState {
    pub fn new(pipeline: Arc<InterceptionPipeline>) -> Self {
        Self::with_fetcher(pipeline, PageFetcher::default())
    }

    pub fn with_fetcher(pipeline: Arc<InterceptionPipeline>, fetcher: PageFetcher) -> Self {
        Self { pipeline, fetcher }
    }

    pub fn pipeline(&self) -> &Arc<InterceptionPipeline> {
        &self.pipeline
    }
}

#[derive(Debug, Deserialize)]
struct DomainRequest {
    #[serde(default)]
    domain: String,
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    #[serde(default)]
    domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScanRequest {
    url: String,

    /// Page content; fetched when absent
    #[serde(default)]
    html: Option<String>,
}

#[derive(Debug, Serialize)]
struct WhitelistPage {
    domains: Vec<String>,
    total: usize,
    page: usize,
    per_page: usize,
    total_pages: usize,
}

/// Dispatch one management request
pub async fn handle<B>(state: &ManagementState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return ApiError::BadRequest(format!("Failed to read body: {}", e)).into_response(),
    };

    debug!("Management request: {} {}", method, path);

    let result = match (&method, path.as_str()) {
        (&Method::GET, "/health") => health(state),
        (&Method::GET, "/whitelist") => list_whitelist(state, &query),
        (&Method::POST, "/whitelist") => add_domain(state, &body),
        (&Method::GET, "/whitelist/export") => export_whitelist(state),
        (&Method::POST, "/whitelist/bulk-add") => bulk_add(state, &body),
        (&Method::POST, "/whitelist/bulk-delete") => bulk_delete(state, &body),
        (&Method::DELETE, p) if p.starts_with("/whitelist/") => remove_domain(state, &p["/whitelist/".len()..]),
        (&Method::POST, "/scan") => scan(state, &body).await,
        _ => Err(ApiError::NotFound(format!("No route for {} {}", method, path))),
    };

    result.unwrap_or_else(ApiError::into_response)
}

fn health(state: &ManagementState) -> ApiResult {
    let pipeline = &state.pipeline;
    let stats = pipeline.analyzer().scanner().stats();

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "version": crate::VERSION,
            "whitelist": pipeline.trust().whitelist_len(),
            "blacklist": pipeline.trust().blacklist_snapshot().len(),
            "active_tokens": pipeline.tokens().len(),
            "scorer_loaded": pipeline.analyzer().classifier().has_scorer(),
            "scans": stats.scans,
            "cache_hits": stats.cache_hits,
        }),
    ))
}

fn list_whitelist(state: &ManagementState, query: &str) -> ApiResult {
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();

    let search = params.get("search").map(|s| s.trim()).unwrap_or_default();
    let page = params
        .get("page")
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1);
    let per_page = params
        .get("per_page")
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|p| (1..=MAX_PER_PAGE).contains(p))
        .unwrap_or(DEFAULT_PER_PAGE);

    let trust = state.pipeline.trust();
    let entries = if search.is_empty() {
        trust.export()
    } else {
        trust.search(search)
    };

    let total = entries.len();
    let domains = entries
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    Ok(json_response(
        StatusCode::OK,
        &WhitelistPage {
            domains,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        },
    ))
}

fn add_domain(state: &ManagementState, body: &Bytes) -> ApiResult {
    let request: DomainRequest = serde_json::from_slice(body).map_err(EngineError::from)?;
    let domain = normalize_entry(&request.domain)
        .ok_or_else(|| ApiError::BadRequest("Domain cannot be empty".to_string()))?;

    let added = state.pipeline.trust().add_whitelist(&domain)?;
    if added {
        info!("Whitelist entry added via management API: {}", domain);
    }

    Ok(json_response(StatusCode::OK, &json!({ "domain": domain, "added": added })))
}

fn remove_domain(state: &ManagementState, raw: &str) -> ApiResult {
    let domain = normalize_entry(raw).ok_or_else(|| ApiError::BadRequest("Domain cannot be empty".to_string()))?;

    if state.pipeline.trust().remove_whitelist(&domain)? {
        Ok(json_response(StatusCode::OK, &json!({ "domain": domain, "removed": true })))
    } else {
        Err(ApiError::NotFound(format!("{} is not whitelisted", domain)))
    }
}

fn parse_bulk(body: &Bytes) -> std::result::Result<Vec<String>, ApiError> {
    let request: BulkRequest = serde_json::from_slice(body).map_err(EngineError::from)?;
    let domains: Vec<String> = request.domains.iter().filter_map(|d| normalize_entry(d)).collect();

    if domains.is_empty() {
        return Err(ApiError::BadRequest("No domains provided".to_string()));
    }
    Ok(domains)
}

fn bulk_add(state: &ManagementState, body: &Bytes) -> ApiResult {
    let domains = parse_bulk(body)?;
    let added = state.pipeline.trust().bulk_add(&domains)?;

    Ok(json_response(
        StatusCode::OK,
        &json!({ "added": added, "submitted": domains.len() }),
    ))
}

fn bulk_delete(state: &ManagementState, body: &Bytes) -> ApiResult {
    let domains = parse_bulk(body)?;
    let removed = state.pipeline.trust().bulk_remove(&domains)?;

    if removed == 0 {
        return Err(ApiError::NotFound("None of the domains were whitelisted".to_string()));
    }
    Ok(json_response(StatusCode::OK, &json!({ "removed": removed })))
}

fn export_whitelist(state: &ManagementState) -> ApiResult {
    let mut body = state.pipeline.trust().export().join("\n");
    if !body.is_empty() {
        body.push('\n');
    }

    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    Ok(response)
}

async fn scan(state: &ManagementState, body: &Bytes) -> ApiResult {
    let request: ScanRequest = serde_json::from_slice(body).map_err(EngineError::from)?;
    let start = Instant::now();

    let url = normalize_scan_url(&request.url)?;
    let parsed = url::Url::parse(&url).map_err(|e| ApiError::BadRequest(format!("Invalid URL {}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid URL {}: missing host", url)))?
        .to_ascii_lowercase();

    let trust = state.pipeline.trust();
    let bare = host.strip_prefix("www.").unwrap_or(&host);
    if trust.is_whitelisted(&host) || trust.is_whitelisted(bare) {
        return Ok(scan_response(&url, json!({ "verdict": "trusted" }), start));
    }

    let html = match request.html {
        Some(html) => html,
        None => {
            let page = state
                .fetcher
                .fetch(&url)
                .await
                .map_err(|e| ApiError::BadGateway(e.to_string()))?;

            if !page.is_html() {
                let content_type = page.content_type.unwrap_or_else(|| "unknown".to_string());
                return Ok(scan_response(
                    &url,
                    json!({ "verdict": "not_html", "content_type": content_type }),
                    start,
                ));
            }
            String::from_utf8_lossy(&page.body).into_owned()
        }
    };

    let pipeline = Arc::clone(&state.pipeline);
    let target = url.clone();
    let verdict = tokio::task::spawn_blocking(move || pipeline.evaluate_content(&target, &html))
        .await
        .map_err(|e| ApiError::Internal(format!("Scan failed: {}", e)))?;

    if verdict.is_block() {
        warn!("Management scan flagged {}: {:?}", url, verdict);
    }

    let value = serde_json::to_value(&verdict).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(scan_response(&url, value, start))
}

/// Scheme-less input is read as http
fn normalize_scan_url(raw: &str) -> std::result::Result<String, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::BadRequest("URL cannot be empty".to_string()));
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(raw.to_string())
    } else {
        Ok(format!("http://{}", raw))
    }
}

fn scan_response(url: &str, mut value: serde_json::Value, start: Instant) -> Response<Full<Bytes>> {
    if let Some(fields) = value.as_object_mut() {
        fields.insert("url".to_string(), json!(url));
        fields.insert("elapsed_ms".to_string(), json!(start.elapsed().as_secs_f64() * 1000.0));
    }
    json_response(StatusCode::OK, &value)
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, br#"{"error":"serialization failed"}"#.to_vec())
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bypass::BypassTokenManager;
    use crate::classifier::{ClassificationAdapter, FeatureExtractor, PhishingScorer};
    use crate::heuristics::HeuristicScanner;
    use crate::interception::ContentAnalyzer;
    use crate::trust::TrustStore;
    use crate::utils::clock::ManualClock;
    use crate::utils::config::PolicyConfig;

    struct FixedScorer(f64);

    impl PhishingScorer for FixedScorer {
        fn score(&self, _features: &[f64]) -> Result<f64> {
            Ok(self.0)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn state_with(trust: TrustStore, score: f64) -> ManagementState {
        let trust = Arc::new(trust);
        let classifier = Arc::new(ClassificationAdapter::new(
            FeatureExtractor::default(),
            Some(Arc::new(FixedScorer(score))),
            0.85,
        ));
        let scanner = Arc::new(HeuristicScanner::new(Arc::clone(&trust)));
        let analyzer = ContentAnalyzer::new(Arc::clone(&trust), classifier, scanner, 2);
        let tokens = Arc::new(BypassTokenManager::new(Arc::clone(&trust)));
        let pipeline = InterceptionPipeline::new(
            trust,
            tokens,
            analyzer,
            PolicyConfig::default(),
            Arc::new(ManualClock::new(0)),
        );
        ManagementState::with_fetcher(Arc::new(pipeline), PageFetcher::new(Duration::from_secs(2)))
    }

    fn state() -> ManagementState {
        state_with(TrustStore::new(), 0.0)
    }

    async fn call(state: &ManagementState, method: Method, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();

        let resp = handle(state, req).await;
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_add_list_and_delete() {
        let s = state();

        let (status, body) = call(&s, Method::POST, "/whitelist", r#"{"domain":"https://www.Example.com/login"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["domain"], "example.com");
        assert_eq!(body["added"], true);

        let (_, body) = call(&s, Method::POST, "/whitelist", r#"{"domain":"example.com"}"#).await;
        assert_eq!(body["added"], false);

        let (status, body) = call(&s, Method::GET, "/whitelist", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["per_page"], 50);

        let (status, _) = call(&s, Method::DELETE, "/whitelist/example.com", "").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&s, Method::DELETE, "/whitelist/example.com", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_domain_rejected() {
        let (status, body) = call(&state(), Method::POST, "/whitelist", r#"{"domain":"  "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("empty"));

        let (status, _) = call(&state(), Method::POST, "/whitelist", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pagination_and_search() {
        let domains: Vec<String> = (0..120).map(|i| format!("site{:03}.test", i)).collect();
        let s = state_with(TrustStore::with_patterns(&domains), 0.0);

        let (_, body) = call(&s, Method::GET, "/whitelist?page=3", "").await;
        assert_eq!(body["total"], 120);
        assert_eq!(body["total_pages"], 3);
        assert_eq!(body["domains"].as_array().unwrap().len(), 20);
        assert_eq!(body["domains"][0], "site100.test");

        let (_, body) = call(&s, Method::GET, "/whitelist?search=SITE11&per_page=5", "").await;
        assert_eq!(body["total"], 10);
        assert_eq!(body["domains"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_bulk_operations() {
        let s = state();

        let (status, body) = call(
            &s,
            Method::POST,
            "/whitelist/bulk-add",
            r#"{"domains":["a.test","http://b.test/x","a.test",""]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["added"], 2);

        let (status, _) = call(&s, Method::POST, "/whitelist/bulk-add", r#"{"domains":[]}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&s, Method::POST, "/whitelist/bulk-delete", r#"{"domains":["a.test","zzz.test"]}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);

        let (status, _) = call(&s, Method::POST, "/whitelist/bulk-delete", r#"{"domains":["zzz.test"]}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_is_plain_text() {
        let s = state_with(TrustStore::with_patterns(["b.test", "*.a.test"]), 0.0);
        let req = Request::get("/whitelist/export").body(Empty::<Bytes>::new()).unwrap();

        let resp = handle(&s, req).await;
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"*.a.test\nb.test\n"));
    }

    #[tokio::test]
    async fn test_scan_verdicts() {
        let s = state_with(TrustStore::with_patterns(["good.test"]), 0.0);

        let (_, body) = call(&s, Method::POST, "/scan", r#"{"url":"www.good.test","html":"login"}"#).await;
        assert_eq!(body["verdict"], "trusted");

        let (_, body) = call(&s, Method::POST, "/scan", r#"{"url":"phish.test","html":"login password verify"}"#).await;
        assert_eq!(body["verdict"], "heuristic");
        assert_eq!(body["url"], "http://phish.test");
        assert_eq!(body["patterns"].as_array().unwrap().len(), 3);

        let (_, body) = call(&s, Method::POST, "/scan", r#"{"url":"plain.test","html":"hello"}"#).await;
        assert_eq!(body["verdict"], "clean");

        // scans never blacklist
        assert!(s.pipeline().trust().blacklist_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_scan_classifier_verdict() {
        let s = state_with(TrustStore::new(), 0.95);
        let (_, body) = call(&s, Method::POST, "/scan", r#"{"url":"https://phish.test/","html":""}"#).await;
        assert_eq!(body["verdict"], "classifier");
        assert_eq!(body["confidence"], 0.95);
    }

    #[tokio::test]
    async fn test_scan_invalid_url() {
        let (status, _) = call(&state(), Method::POST, "/scan", r#"{"url":"http://exa mple.test"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&state(), Method::POST, "/scan", r#"{"url":""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scan_fetch_failure() {
        // nothing listens on port 1
        let (status, body) = call(&state(), Method::POST, "/scan", r#"{"url":"http://127.0.0.1:1/"}"#).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_fetch_https_reaches_the_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // accept one connection and close it mid-handshake
        let accepted = tokio::spawn(async move { listener.accept().await.is_ok() });

        let fetcher = PageFetcher::new(Duration::from_secs(2));
        let result = fetcher.fetch(&format!("https://127.0.0.1:{}/", port)).await;

        assert!(matches!(result, Err(EngineError::ManagementFailed(_))));
        assert!(accepted.await.unwrap(), "https fetch never opened a connection");
    }

    #[tokio::test]
    async fn test_scan_https_fetch_failure() {
        let (status, body) = call(&state(), Method::POST, "/scan", r#"{"url":"https://127.0.0.1:1/"}"#).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("127.0.0.1:1"));
    }

    #[tokio::test]
    async fn test_health_and_unknown_route() {
        let (status, body) = call(&state(), Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["scorer_loaded"], true);

        let (status, _) = call(&state(), Method::GET, "/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
