//! End-to-end pipeline scenarios

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use phishwall_engine::bypass::BypassTokenManager;
use phishwall_engine::classifier::{
    ClassificationAdapter, FeatureExtractor, PhishingScorer, FEATURE_NAMES, SCORING_FEATURE_COUNT,
};
use phishwall_engine::heuristics::{HeuristicScanner, ScanCache};
use phishwall_engine::interception::{
    AllowReason, BlockCause, ContentAnalyzer, ContentVerdict, FlowContext, FlowRequest, FlowResponse,
    InterceptionPipeline, RequestOutcome, ResponseOutcome,
};
use phishwall_engine::management::{handle, ManagementState};
use phishwall_engine::trust::TrustStore;
use phishwall_engine::utils::clock::ManualClock;
use phishwall_engine::utils::config::PolicyConfig;
use std::sync::Arc;
use std::time::Duration;

const T: i64 = 1_700_000_007;

struct FixedScorer(f64);

impl PhishingScorer for FixedScorer {
    fn score(&self, _features: &[f64]) -> phishwall_engine::Result<f64> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

struct Harness {
    pipeline: Arc<InterceptionPipeline>,
    trust: Arc<TrustStore>,
    scanner: Arc<HeuristicScanner>,
    clock: Arc<ManualClock>,
}

fn harness_with(trust: TrustStore, score: f64) -> Harness {
    let trust = Arc::new(trust);
    let classifier = Arc::new(ClassificationAdapter::new(
        FeatureExtractor::default(),
        Some(Arc::new(FixedScorer(score))),
        0.85,
    ));
    let scanner = Arc::new(HeuristicScanner::new(Arc::clone(&trust)));
    let analyzer = ContentAnalyzer::new(Arc::clone(&trust), classifier, Arc::clone(&scanner), 2);
    let tokens = Arc::new(BypassTokenManager::new(Arc::clone(&trust)));
    let clock = Arc::new(ManualClock::new(T));

    let pipeline = Arc::new(InterceptionPipeline::new(
        Arc::clone(&trust),
        tokens,
        analyzer,
        PolicyConfig::default(),
        clock.clone(),
    ));

    Harness {
        pipeline,
        trust,
        scanner,
        clock,
    }
}

fn harness(score: f64) -> Harness {
    harness_with(TrustStore::new(), score)
}

fn get(url: &str, client: &str) -> FlowRequest {
    FlowRequest::get(url, client).expect("valid test url")
}

/// Run both phases for one flow
async fn run_flow(h: &Harness, url: &str, client: &str, html: &str) -> (Option<RequestOutcome>, Option<ResponseOutcome>) {
    let req = get(url, client);
    match h.pipeline.handle_request(&req) {
        RequestOutcome::Forward(ctx) => {
            let outcome = h.pipeline.handle_response(&req, ctx, &FlowResponse::html(html.to_string())).await;
            (None, Some(outcome))
        }
        respond => (Some(respond), None),
    }
}

#[tokio::test]
async fn whitelisted_exact_host_passes_and_trusts_client() {
    let h = harness_with(TrustStore::with_patterns(["example.com"]), 0.99);

    let req = get("http://example.com/", "client-1");
    assert_eq!(
        h.pipeline.handle_request(&req),
        RequestOutcome::Forward(FlowContext { skip_analysis: true })
    );

    assert!(h.trust.is_client_trusted("client-1"));
    assert!(h.trust.blacklist_snapshot().is_empty());
    assert!(h.pipeline.tokens().is_empty());
}

#[tokio::test]
async fn blacklisted_host_block_then_single_use_bypass() {
    let h = harness(0.0);
    h.trust.add_blacklist("evil.test");

    let token = match h.pipeline.handle_request(&get("http://evil.test/", "client-1")) {
        RequestOutcome::Respond(resp) => {
            assert_eq!(resp.status, 403);
            assert!(resp.body.contains("/bypass?token=evil.test_1700000000"));
            resp.token.expect("block carries a token")
        }
        other => panic!("expected block, got {:?}", other),
    };
    assert_eq!(token, "evil.test_1700000000");

    let bypass = get(&format!("http://evil.test/bypass?token={}", token), "client-1");
    match h.pipeline.handle_request(&bypass) {
        RequestOutcome::Respond(resp) => {
            assert_eq!(resp.status, 302);
            assert_eq!(resp.location.as_deref(), Some("http://evil.test"));
        }
        other => panic!("expected redirect, got {:?}", other),
    }

    let again = get(&format!("http://evil.test/bypass?token={}", token), "client-2");
    match h.pipeline.handle_request(&again) {
        RequestOutcome::Respond(resp) => assert_eq!(resp.status, 400),
        other => panic!("expected 400, got {:?}", other),
    }
}

#[tokio::test]
async fn token_is_stable_within_window() {
    let h = harness(0.0);
    h.trust.add_blacklist("evil.test");

    let first = h.pipeline.handle_request(&get("http://evil.test/", "c"));
    h.clock.advance(2);
    let second = h.pipeline.handle_request(&get("http://evil.test/", "c"));
    assert_eq!(first, second);
    assert_eq!(h.pipeline.tokens().len(), 1);

    h.clock.advance(10);
    h.pipeline.handle_request(&get("http://evil.test/", "c"));
    assert_eq!(h.pipeline.tokens().len(), 2);
}

#[tokio::test]
async fn confident_classifier_blocks_and_blacklists() {
    let h = harness(0.90);

    let (_, response) = run_flow(&h, "http://phish.test/", "client-1", "<html>hello</html>").await;
    match response.expect("response phase reached") {
        ResponseOutcome::Block(resp) => {
            assert_eq!(resp.status, 403);
            assert_eq!(resp.cause, Some(BlockCause::Classifier { confidence: 0.90 }));
            assert!(resp.body.contains("/bypass?token=phish.test_1700000000"));
        }
        other => panic!("expected block, got {:?}", other),
    }

    assert!(h.trust.is_blacklisted("phish.test"));
    assert_eq!(h.pipeline.tokens().active_tokens(), vec!["phish.test_1700000000"]);

    // the next request is stopped in the request phase
    let (request, _) = run_flow(&h, "http://phish.test/other", "client-2", "").await;
    assert!(matches!(request, Some(RequestOutcome::Respond(ref r)) if r.status == 403));
}

#[tokio::test]
async fn classifier_at_threshold_blocks_clean_content() {
    let h = harness(0.85);
    let (_, response) = run_flow(&h, "http://edge.test/", "c", "nothing suspicious here").await;
    assert!(response.expect("response phase reached").is_block());
}

#[tokio::test]
async fn three_heuristic_patterns_block() {
    let h = harness(0.0);
    let html = "<p>Please login with your password to verify</p>";

    let (_, response) = run_flow(&h, "http://three.test/", "c", html).await;
    match response.expect("response phase reached") {
        ResponseOutcome::Block(resp) => match resp.cause {
            Some(BlockCause::Heuristic { patterns }) => assert_eq!(patterns.len(), 3),
            other => panic!("expected heuristic cause, got {:?}", other),
        },
        other => panic!("expected block, got {:?}", other),
    }
    assert!(h.trust.is_blacklisted("three.test"));
}

#[tokio::test]
async fn two_heuristic_patterns_pass() {
    let h = harness(0.0);
    let (_, response) = run_flow(&h, "http://two.test/", "c", "<p>login and password</p>").await;

    assert_eq!(response, Some(ResponseOutcome::Allow(AllowReason::Clean)));
    assert!(!h.trust.is_blacklisted("two.test"));
    assert!(h.pipeline.tokens().is_empty());
}

#[tokio::test]
async fn repeated_scan_uses_cache() {
    let h = harness(0.0);

    let first = h.scanner.analyze("http://cached.test/", "login password");
    let second = h.scanner.analyze("http://cached.test/", "login password");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.scanner.stats().scans, 1);
    assert_eq!(h.scanner.stats().cache_hits, 1);
}

#[tokio::test]
async fn expired_cache_entries_are_rescanned() {
    let scanner = HeuristicScanner::with_cache(
        Arc::new(TrustStore::new()),
        ScanCache::new(100, Some(Duration::from_millis(1))),
    );

    scanner.analyze("http://ttl.test/", "login");
    std::thread::sleep(Duration::from_millis(5));
    scanner.analyze("http://ttl.test/", "login");

    assert_eq!(scanner.stats().scans, 2);
    assert_eq!(scanner.stats().cache_hits, 0);
}

#[tokio::test]
async fn whitelisted_hosts_are_never_blocked() {
    let h = harness_with(TrustStore::with_patterns(["*.bank.test"]), 1.0);
    let html = "login password verify eval(x) <script>a</script>";

    for (i, url) in ["http://bank.test/", "http://login.bank.test/", "https://www.bank.test/x"]
        .iter()
        .enumerate()
    {
        let client = format!("client-{}", i);
        let (request, response) = run_flow(&h, url, &client, html).await;
        assert!(request.is_none(), "{} answered in request phase", url);
        assert!(!response.expect("response phase reached").is_block(), "{} was blocked", url);

        // even without the skip marker the response phase refuses to block
        let req = get(url, "fresh-client");
        let outcome = h
            .pipeline
            .handle_response(&req, FlowContext::default(), &FlowResponse::html(html.to_string()))
            .await;
        assert!(!outcome.is_block());
        h.trust.forget_client("fresh-client");
    }

    assert!(h.trust.blacklist_snapshot().is_empty());
}

#[tokio::test]
async fn concurrent_blocks_of_one_host_agree() {
    let h = harness(0.95);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pipeline = Arc::clone(&h.pipeline);
            tokio::spawn(async move {
                let req = FlowRequest::get("http://race.test/", &format!("client-{}", i)).expect("valid url");
                pipeline
                    .handle_response(&req, FlowContext::default(), &FlowResponse::html("x"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.expect("task completed").is_block());
    }

    assert_eq!(h.trust.blacklist_snapshot(), vec!["race.test"]);
    assert_eq!(h.pipeline.tokens().len(), 1);
}

#[tokio::test]
async fn management_scan_matches_pipeline_verdict() {
    let h = harness(0.0);
    let state = ManagementState::new(Arc::clone(&h.pipeline));
    let html = "<p>Please login with your password to verify</p>";

    let body = serde_json::json!({ "url": "http://agree.test/", "html": html }).to_string();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/scan")
        .body(Full::new(Bytes::from(body)))
        .expect("valid request");
    let resp = handle(&state, req).await;
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    let scan: serde_json::Value = serde_json::from_slice(&bytes).expect("json");

    let direct = h.pipeline.evaluate_content("http://agree.test/", html);
    assert!(matches!(direct, ContentVerdict::Heuristic { .. }));
    assert_eq!(scan["verdict"], "heuristic");

    let (_, response) = run_flow(&h, "http://agree.test/", "c", html).await;
    assert!(response.expect("response phase reached").is_block());
}

#[tokio::test]
async fn management_whitelist_persists_and_reaches_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("whitelist.json");

    let h = harness_with(TrustStore::load(path.clone()).expect("load"), 0.99);
    let state = ManagementState::new(Arc::clone(&h.pipeline));

    let req = Request::builder()
        .method(Method::POST)
        .uri("/whitelist")
        .body(Full::new(Bytes::from(r#"{"domain":"https://www.partner.test/home"}"#)))
        .expect("valid request");
    assert_eq!(handle(&state, req).await.status(), 200);

    let (_, response) = run_flow(&h, "http://partner.test/", "c", "login password verify").await;
    assert_eq!(response, Some(ResponseOutcome::Allow(AllowReason::SkipAnalysis)));

    let reloaded = TrustStore::load(path).expect("reload");
    assert_eq!(reloaded.export(), vec!["partner.test"]);
}

#[test]
fn feature_vector_drops_tld_before_scoring() {
    let features = FeatureExtractor::default()
        .extract("https://login.example.xyz/path")
        .expect("valid url");

    assert_eq!(FEATURE_NAMES.len(), 29);
    assert_eq!(FEATURE_NAMES[17], "tld");
    assert_eq!(features.tld, "xyz");
    assert_eq!(features.scoring_vector().len(), SCORING_FEATURE_COUNT);
    assert_eq!(SCORING_FEATURE_COUNT, 28);
}
