// src/heuristics/scanner.rs
//! Keyword and script-pattern page scanner
//!
//! Runs after the classifier declines to block. Each matched keyword and each
//! dangerous script construct adds one entry to `detected_patterns`; iframes
//! and inline scripts only count once they exceed a small allowance.

use crate::heuristics::cache::{ScanCache, DEFAULT_CACHE_CAPACITY};
use crate::observability::names;
use crate::trust::TrustStore;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Keywords matched case-insensitively against page content
pub const PHISHING_KEYWORDS: &[&str] = &[
    "login", "password", "signin", "account", "bank", "credit", "wallet",
    "verify", "secure", "authenticate", "paypal", "billing", "suspended",
    "security", "update", "confirm", "limited", "locked", "expired",
    "amazon", "microsoft", "google", "facebook", "apple", "netflix",
    "ebay", "instagram", "twitter", "linkedin", "dropbox", "adobe",
];

/// Script constructs: dynamic evaluation, document writes, navigation assignment
const SCRIPT_PATTERN_SOURCES: &[&str] = &[
    r"eval\s*\(",
    r"document\.write\s*\(",
    r#"(?:document|window)\.location\s*=\s*['"][^'"]*['"]"#,
];

/// Iframes tolerated before the page is flagged
pub const MAX_IFRAMES: usize = 3;

/// Inline script blocks tolerated before the page is flagged
pub const MAX_SCRIPT_BLOCKS: usize = 5;

static SCRIPT_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    SCRIPT_PATTERN_SOURCES
        .iter()
        .map(|src| (*src, Regex::new(src).expect("script pattern must compile")))
        .collect()
});

static IFRAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<iframe[^>]*src=['"]([^'"]+)['"]"#).expect("iframe pattern must compile")
});

static SCRIPT_BLOCK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<script>[\s\S]*?</script>").expect("script block pattern must compile")
});

/// Outcome of a heuristic scan
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub url: String,

    /// Human-readable findings, in detection order
    pub detected_patterns: Vec<String>,

    pub is_malicious: bool,

    /// Host was whitelisted; nothing was scanned
    pub trusted: bool,

    pub elapsed: Duration,
}

impl AnalysisResult {
    fn trusted(url: &str, elapsed: Duration) -> Self {
        Self {
            url: url.to_string(),
            detected_patterns: Vec::new(),
            is_malicious: false,
            trusted: true,
            elapsed,
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.detected_patterns.len()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Scanner counters
#[derive(Debug, Clone, Default)]
pub struct ScannerStats {
    /// Full scans executed
    pub scans: u64,
    pub cache_hits: u64,
    pub trusted_skips: u64,
}

/// Heuristic page scanner with a FIFO result cache
pub struct HeuristicScanner {
    trust: Arc<TrustStore>,
    cache: ScanCache,
    scans: AtomicU64,
    cache_hits: AtomicU64,
    trusted_skips: AtomicU64,
}

impl HeuristicScanner {
    pub fn new(trust: Arc<TrustStore>) -> Self {
        Self::with_cache(trust, ScanCache::new(DEFAULT_CACHE_CAPACITY, None))
    }

    pub fn with_cache(trust: Arc<TrustStore>, cache: ScanCache) -> Self {
        Self {
            trust,
            cache,
            scans: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            trusted_skips: AtomicU64::new(0),
        }
    }

    /// Analyze `html` served from `url`
    pub fn analyze(&self, url: &str, html: &str) -> Arc<AnalysisResult> {
        let start = Instant::now();

        if let Some(host) = host_of(url) {
            let bare = host.strip_prefix("www.").unwrap_or(&host);
            if self.trust.is_whitelisted(&host) || self.trust.is_whitelisted(bare) {
                info!("Domain {} is trusted, skipping heuristic scan", host);
                self.trusted_skips.fetch_add(1, Ordering::Relaxed);
                return Arc::new(AnalysisResult::trusted(url, start.elapsed()));
            }
        }

        if let Some(cached) = self.cache.get(url) {
            debug!("[Cache Hit] Using cached result for {}", url);
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(names::SCAN_CACHE_HITS_TOTAL).increment(1);
            return cached;
        }

        self.scans.fetch_add(1, Ordering::Relaxed);
        let detected_patterns = scan_content(url, html);

        let result = Arc::new(AnalysisResult {
            url: url.to_string(),
            is_malicious: !detected_patterns.is_empty(),
            detected_patterns,
            trusted: false,
            elapsed: start.elapsed(),
        });

        self.cache.insert(url, Arc::clone(&result));

        debug!(
            "Heuristic analysis completed in {:?} for {} ({} patterns)",
            result.elapsed,
            url,
            result.pattern_count()
        );

        result
    }

    pub fn stats(&self) -> ScannerStats {
        ScannerStats {
            scans: self.scans.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            trusted_skips: self.trusted_skips.load(Ordering::Relaxed),
        }
    }

    pub fn cache(&self) -> &ScanCache {
        &self.cache
    }
}

/// Run every detector over `html`
fn scan_content(url: &str, html: &str) -> Vec<String> {
    let html_lower = html.to_lowercase();
    let mut detected = Vec::new();

    for keyword in PHISHING_KEYWORDS {
        if html_lower.contains(keyword) {
            let finding = format!("Suspicious keyword '{}' found", keyword);
            warn!("[Phishing Detection] {} in {}", finding, url);
            detected.push(finding);
        }
    }

    for (source, pattern) in SCRIPT_PATTERNS.iter() {
        if pattern.is_match(html) {
            let finding = format!("Dangerous JavaScript pattern detected: {}", source);
            warn!("[Suspicious JS] {} in {}", finding, url);
            detected.push(finding);
        }
    }

    let iframes = IFRAME_PATTERN.find_iter(html).count();
    if iframes > MAX_IFRAMES {
        let finding = format!("Found {} iframe(s) that could be malicious", iframes);
        warn!("[Iframe Injection] {} in {}", finding, url);
        detected.push(finding);
    }

    let scripts = SCRIPT_BLOCK_PATTERN.find_iter(html).count();
    if scripts > MAX_SCRIPT_BLOCKS {
        let finding = format!("Found {} script tags that could be XSS attempts", scripts);
        warn!("[XSS Risk] {} in {}", finding, url);
        detected.push(finding);
    }

    detected
}

/// Lower-cased host of `url`; scheme-less input is read as http
pub(crate) fn host_of(url: &str) -> Option<String> {
    let parsed = if url.contains("://") {
        url::Url::parse(url).ok()?
    } else {
        url::Url::parse(&format!("http://{}", url)).ok()?
    };

    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> HeuristicScanner {
        HeuristicScanner::new(Arc::new(TrustStore::with_patterns(["*.trusted.com"])))
    }

    #[test]
    fn test_clean_page() {
        let result = scanner().analyze("http://plain.test/", "<html><body>Hello world</body></html>");
        assert!(!result.is_malicious);
        assert_eq!(result.pattern_count(), 0);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let html = "<h1>LOGIN</h1><p>Enter your Password</p><p>verify now</p>";
        let result = scanner().analyze("http://phish.test/", html);

        assert!(result.is_malicious);
        assert_eq!(
            result.detected_patterns,
            vec![
                "Suspicious keyword 'login' found",
                "Suspicious keyword 'password' found",
                "Suspicious keyword 'verify' found",
            ]
        );
    }

    #[test]
    fn test_script_patterns() {
        let html = r#"<div>eval (x); document.write("a"); window.location = "http://x.test";</div>"#;
        let result = scanner().analyze("http://js.test/", html);
        assert_eq!(result.pattern_count(), 3);
        assert!(result.detected_patterns[0].contains("eval"));
    }

    #[test]
    fn test_iframe_allowance() {
        let frame = r#"<iframe src="http://ads.test/x"></iframe>"#;
        let s = scanner();

        let three = s.analyze("http://frames3.test/", &frame.repeat(3));
        assert_eq!(three.pattern_count(), 0);

        let four = s.analyze("http://frames4.test/", &frame.repeat(4));
        assert_eq!(four.detected_patterns, vec!["Found 4 iframe(s) that could be malicious"]);
    }

    #[test]
    fn test_script_block_allowance() {
        let block = "<script>var a = 1;</script>";
        let s = scanner();

        assert_eq!(s.analyze("http://s5.test/", &block.repeat(5)).pattern_count(), 0);

        let six = s.analyze("http://s6.test/", &block.repeat(6));
        assert_eq!(six.detected_patterns, vec!["Found 6 script tags that could be XSS attempts"]);
    }

    #[test]
    fn test_trusted_domain_short_circuit() {
        let s = scanner();
        let result = s.analyze("https://www.trusted.com/login", "login password verify eval(");

        assert!(result.trusted);
        assert!(!result.is_malicious);
        assert!(result.detected_patterns.is_empty());
        assert_eq!(s.stats().scans, 0);
        assert_eq!(s.stats().trusted_skips, 1);
        assert!(s.cache().is_empty());
    }

    #[test]
    fn test_cache_hit_skips_rescan() {
        let s = scanner();
        let first = s.analyze("http://phish.test/a", "login");
        let second = s.analyze("http://phish.test/a", "completely different content");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(s.stats().scans, 1);
        assert_eq!(s.stats().cache_hits, 1);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://WWW.Example.com/path").as_deref(), Some("www.example.com"));
        assert_eq!(host_of("example.org/login").as_deref(), Some("example.org"));
        assert_eq!(host_of("http://"), None);
    }
}
