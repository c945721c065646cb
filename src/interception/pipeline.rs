// src/interception/pipeline.rs
//! Interception pipeline
//!
//! Per-flow state machine. The request phase may answer a flow outright
//! (bypass redemption, blacklist block); otherwise it hands a `FlowContext`
//! to the response phase, which decides between allowing the response and
//! replacing it with a block page.
//!
//! ```text
//! request:  bypass path ─► client trusted ─► whitelisted ─► blacklisted
//!                                                            ─► static resource ─► accepts html
//! response: skip ─► trusted ─► text/html ─► size ─► classifier ─► heuristics ─► allow
//! ```
//!
//! Content analysis runs on the blocking pool. Any failure there (including a
//! panic) allows the response through.

use crate::bypass::BypassTokenManager;
use crate::classifier::{BrandList, ClassificationAdapter, FeatureExtractor, LogisticScorer, PhishingScorer};
use crate::heuristics::scanner::host_of;
use crate::heuristics::{HeuristicScanner, ScanCache, DEFAULT_CACHE_CAPACITY};
use crate::interception::block_page;
use crate::interception::flow::{
    AllowReason, BlockCause, ContentVerdict, FlowContext, FlowRequest, FlowResponse, InterceptResponse,
    RequestOutcome, ResponseOutcome,
};
use crate::observability::names;
use crate::trust::TrustStore;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::config::{EngineConfig, PolicyConfig};
use crate::utils::errors::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Side-effect-free content verdict shared by the pipeline and management scans
#[derive(Clone)]
pub struct ContentAnalyzer {
    trust: Arc<TrustStore>,
    classifier: Arc<ClassificationAdapter>,
    scanner: Arc<HeuristicScanner>,

    /// Block when the heuristic pattern count exceeds this
    heuristic_block_threshold: usize,
}

impl ContentAnalyzer {
    pub fn new(
        trust: Arc<TrustStore>,
        classifier: Arc<ClassificationAdapter>,
        scanner: Arc<HeuristicScanner>,
        heuristic_block_threshold: usize,
    ) -> Self {
        Self {
            trust,
            classifier,
            scanner,
            heuristic_block_threshold,
        }
    }

    pub fn classifier(&self) -> &Arc<ClassificationAdapter> {
        &self.classifier
    }

    pub fn scanner(&self) -> &Arc<HeuristicScanner> {
        &self.scanner
    }

    /// Classifier first; heuristics only when the classifier is not confident
    pub fn evaluate(&self, url: &str, html: &str) -> ContentVerdict {
        if let Some(host) = host_of(url) {
            let bare = host.strip_prefix("www.").unwrap_or(&host);
            if self.trust.is_whitelisted(&host) || self.trust.is_whitelisted(bare) {
                return ContentVerdict::Trusted;
            }
        }

        // model features are computed on the URL without trailing slashes
        let classification = self.classifier.predict(url.trim_end_matches('/'), html);
        if classification.is_phishing_by_threshold {
            return ContentVerdict::Classifier {
                confidence: classification.confidence,
            };
        }

        let analysis = self.scanner.analyze(url, html);
        if analysis.trusted {
            return ContentVerdict::Trusted;
        }

        if analysis.pattern_count() > self.heuristic_block_threshold {
            ContentVerdict::Heuristic {
                confidence: classification.confidence,
                patterns: analysis.detected_patterns.clone(),
            }
        } else {
            ContentVerdict::Clean {
                confidence: classification.confidence,
                patterns: analysis.detected_patterns.clone(),
            }
        }
    }
}

/// Interception policy engine
pub struct InterceptionPipeline {
    trust: Arc<TrustStore>,
    tokens: Arc<BypassTokenManager>,
    analyzer: ContentAnalyzer,
    policy: PolicyConfig,
    clock: Arc<dyn Clock>,
}

impl InterceptionPipeline {
    pub fn new(
        trust: Arc<TrustStore>,
        tokens: Arc<BypassTokenManager>,
        analyzer: ContentAnalyzer,
        policy: PolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            trust,
            tokens,
            analyzer,
            policy,
            clock,
        }
    }

    /// Build every component from configuration.
    ///
    /// A missing or unreadable model leaves the classifier without a scorer;
    /// the engine still runs on heuristics alone.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.policy.validate()?;

        let trust = Arc::new(TrustStore::load(config.storage.whitelist_path.clone())?);
        let brands = BrandList::load(&config.storage.brands_path)?;

        let scorer: Option<Arc<dyn PhishingScorer>> = match LogisticScorer::load(&config.storage.model_path) {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                error!("Phishing model unavailable: {}", e);
                None
            }
        };
        let classifier = Arc::new(ClassificationAdapter::new(
            FeatureExtractor::new(brands),
            scorer,
            config.policy.ml_confidence_threshold,
        ));

        let ttl = (config.policy.cache_duration > 0).then(|| Duration::from_secs(config.policy.cache_duration));
        let scanner = Arc::new(HeuristicScanner::with_cache(
            Arc::clone(&trust),
            ScanCache::new(DEFAULT_CACHE_CAPACITY, ttl),
        ));

        let analyzer = ContentAnalyzer::new(
            Arc::clone(&trust),
            classifier,
            scanner,
            config.policy.heuristic_block_threshold,
        );
        let tokens = Arc::new(BypassTokenManager::new(Arc::clone(&trust)));

        Ok(Self::new(trust, tokens, analyzer, config.policy.clone(), Arc::new(SystemClock)))
    }

    pub fn trust(&self) -> &Arc<TrustStore> {
        &self.trust
    }

    pub fn tokens(&self) -> &Arc<BypassTokenManager> {
        &self.tokens
    }

    pub fn analyzer(&self) -> &ContentAnalyzer {
        &self.analyzer
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Same verdict the response phase would reach, without side effects
    pub fn evaluate_content(&self, url: &str, html: &str) -> ContentVerdict {
        self.analyzer.evaluate(url, html)
    }

    /// Request phase
    pub fn handle_request(&self, req: &FlowRequest) -> RequestOutcome {
        let is_bypass = self.is_bypass_path(&req.path);
        metrics::counter!(
            names::REQUESTS_TOTAL,
            "path_type" => if is_bypass { "bypass" } else { "standard" }
        )
        .increment(1);

        if is_bypass {
            return RequestOutcome::Respond(self.redeem_bypass(req));
        }

        if self.trust.is_client_trusted(&req.client_id) {
            debug!("Client {} already trusted, skipping {}", req.client_id, req.host);
            return RequestOutcome::Forward(FlowContext::skipped());
        }

        if self.trust.is_whitelisted(&req.host) {
            info!("Skipping analysis for whitelisted domain: {}", req.host);
            self.trust.mark_trusted(&req.client_id, &req.host);
            return RequestOutcome::Forward(FlowContext::skipped());
        }

        if self.trust.is_blacklisted(&req.host) {
            let token = self.tokens.issue(&req.host, self.clock.now()).value();
            warn!(domain = %req.host, "Blocked blacklisted domain");
            metrics::counter!(names::BLOCKS_TOTAL, "cause" => BlockCause::Blacklist.label()).increment(1);

            let body = block_page::blacklist_page(&req.host, &self.policy.bypass_path, &token);
            return RequestOutcome::Respond(InterceptResponse::blocked(BlockCause::Blacklist, token, body));
        }

        if self.is_static_resource(req) {
            debug!("Skipping static resource {}", req.url);
            return RequestOutcome::Forward(FlowContext::skipped());
        }

        if !req.accepts_html() {
            debug!("Skipping non-HTML request {}", req.url);
            return RequestOutcome::Forward(FlowContext::skipped());
        }

        RequestOutcome::Forward(FlowContext::default())
    }

    /// Response phase
    pub async fn handle_response(&self, req: &FlowRequest, ctx: FlowContext, resp: &FlowResponse) -> ResponseOutcome {
        if ctx.skip_analysis {
            return ResponseOutcome::Allow(AllowReason::SkipAnalysis);
        }

        if self.trust.is_client_trusted(&req.client_id) || self.trust.is_whitelisted(&req.host) {
            debug!("{} became trusted before its response arrived", req.host);
            return ResponseOutcome::Allow(AllowReason::Trusted);
        }

        if !resp.is_html() {
            metrics::counter!(names::SKIPPED_CONTENT_TOTAL, "content_type" => resp.media_type()).increment(1);
            return ResponseOutcome::Allow(AllowReason::NotHtml);
        }

        if resp.body.len() > self.policy.max_body_bytes {
            debug!("Response from {} too large to analyze ({} bytes)", req.host, resp.body.len());
            return ResponseOutcome::Allow(AllowReason::TooLarge);
        }

        let start = Instant::now();
        let analyzer = self.analyzer.clone();
        let url = req.url.clone();
        let html = String::from_utf8_lossy(&resp.body).into_owned();

        let verdict = match tokio::task::spawn_blocking(move || analyzer.evaluate(&url, &html)).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(url = %req.url, "Content analysis failed, allowing response: {}", e);
                metrics::counter!(names::FAIL_OPEN_TOTAL).increment(1);
                return ResponseOutcome::Allow(AllowReason::FailedOpen);
            }
        };

        let elapsed = start.elapsed();
        self.record_latency(&req.url, elapsed);

        match verdict {
            ContentVerdict::Trusted => ResponseOutcome::Allow(AllowReason::Trusted),
            ContentVerdict::Classifier { confidence } => {
                let token = self.blacklist_and_issue(&req.host);
                warn!(
                    domain = %req.host,
                    confidence,
                    "ML model detected phishing site: {}",
                    req.url
                );
                metrics::counter!(names::BLOCKS_TOTAL, "cause" => "classifier").increment(1);

                let body = block_page::classifier_page(&req.url, confidence, elapsed, &self.policy.bypass_path, &token);
                ResponseOutcome::Block(InterceptResponse::blocked(
                    BlockCause::Classifier { confidence },
                    token,
                    body,
                ))
            }
            ContentVerdict::Heuristic { patterns, .. } => {
                let token = self.blacklist_and_issue(&req.host);
                warn!(
                    domain = %req.host,
                    patterns = patterns.len(),
                    "Pattern analysis detected phishing site: {}",
                    req.url
                );
                metrics::counter!(names::BLOCKS_TOTAL, "cause" => "heuristic").increment(1);

                let body = block_page::heuristic_page(&req.url, &patterns, &self.policy.bypass_path, &token);
                ResponseOutcome::Block(InterceptResponse::blocked(BlockCause::Heuristic { patterns }, token, body))
            }
            ContentVerdict::Clean { .. } => ResponseOutcome::Allow(AllowReason::Clean),
        }
    }

    /// Drop per-client trust when the client's connection closes
    pub fn client_disconnected(&self, client_id: &str) {
        self.trust.forget_client(client_id);
    }

    fn redeem_bypass(&self, req: &FlowRequest) -> InterceptResponse {
        let presented = extract_token(&req.url).unwrap_or_default();
        debug!("Received bypass request: {}", req.url);

        match self.tokens.redeem(presented, &req.host, &req.client_id) {
            Ok(host) => {
                let scheme = if req.scheme == "https" { "https" } else { "http" };
                info!(client = %req.client_id, domain = %host, "bypass_granted");
                metrics::counter!(names::BYPASS_GRANTED_TOTAL).increment(1);
                InterceptResponse::redirect(format!("{}://{}", scheme, host))
            }
            Err(e) => {
                warn!("Invalid bypass token request. URL: {} ({})", req.url, e);
                metrics::counter!(names::BYPASS_REJECTED_TOTAL).increment(1);
                InterceptResponse::bad_request(block_page::invalid_token_page(&self.tokens.active_tokens()))
            }
        }
    }

    /// The reserved bypass path itself, with or without a trailing slash
    fn is_bypass_path(&self, path: &str) -> bool {
        let reserved = self.policy.bypass_path.trim_end_matches('/');
        path == reserved || path.strip_suffix('/') == Some(reserved)
    }

    fn is_static_resource(&self, req: &FlowRequest) -> bool {
        let path = req.path.to_ascii_lowercase();
        let host = req.host.to_ascii_lowercase();

        self.policy.exclude_extensions.iter().any(|ext| path.ends_with(ext.as_str()))
            || self.policy.exclude_domains.iter().any(|d| host.contains(d.as_str()))
    }

    /// Blacklist `host` unless whitelisted, then issue its bypass token
    fn blacklist_and_issue(&self, host: &str) -> String {
        if !self.trust.is_whitelisted(host) {
            self.trust.add_blacklist(host);
        }
        self.tokens.issue(host, self.clock.now()).value()
    }

    fn record_latency(&self, url: &str, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let slow = elapsed > Duration::from_millis(self.policy.scan_timeout_ms);

        metrics::histogram!(names::ANALYSIS_TIME_MS, "slow" => if slow { "true" } else { "false" }).record(ms);
        if slow {
            warn!("Slow analysis for {}: {:.2}ms", url, ms);
        } else {
            debug!("Analysis for {} took {:.2}ms", url, ms);
        }
    }
}

/// `token` query parameter taken from the raw URL
fn extract_token(url: &str) -> Option<&str> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);

    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
}
