// src/classifier/features.rs
//! URL feature extraction
//!
//! Produces the fixed-order feature vector the scoring model was trained on.
//! `tld` is carried for diagnostics and dropped before scoring.

use crate::utils::errors::{EngineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Feature names in model order, `tld` included
pub const FEATURE_NAMES: [&str; 29] = [
    "url_length",
    "has_ip",
    "has_https",
    "num_dots",
    "has_at_symbol",
    "has_hyphen",
    "has_suspicious_words",
    "domain_length",
    "path_length",
    "subdomain_count",
    "has_port",
    "has_fragment",
    "has_query",
    "num_params",
    "digit_ratio",
    "special_char_ratio",
    "domain_entropy",
    "tld",
    "num_redirects",
    "url_shortener",
    "suspicious_tld",
    "num_subdomains",
    "path_depth",
    "has_double_slash_redirect",
    "has_unicode",
    "is_encoded",
    "is_long_url",
    "brand_mismatch",
    "has_char_substitution",
];

/// Length of the vector handed to the scorer
pub const SCORING_FEATURE_COUNT: usize = FEATURE_NAMES.len() - 1;

/// URLs longer than this set `is_long_url`
pub const LONG_URL_THRESHOLD: usize = 75;

const SUSPICIOUS_WORDS: &[&str] = &[
    "login", "secure", "account", "verify", "bank", "update", "confirm",
    "paypal", "password", "credit", "billing", "suspend", "unusual",
    "alert", "limited", "security", "identity", "amazon", "apple",
    "microsoft", "netflix", "support", "service", "signin",
];

const URL_SHORTENERS: &[&str] = &["bit.ly", "tinyurl", "goo.gl", "t.co", "tr.im", "is.gd"];

const SUSPICIOUS_TLDS: &[&str] = &[
    "xyz", "top", "club", "online", "tk", "ga", "ml", "cf", "gq", "buzz",
    "info", "icu", "wang", "live", "cn", "host", "ru",
];

/// Characters used to impersonate letters (0→o, 1→l, 3→e, $→s, @→a, 5→s)
const SUBSTITUTION_CHARS: &[char] = &['0', '1', '3', '$', '@', '5'];

const DEFAULT_BRANDS: &[&str] = &[
    "paypal", "apple", "google", "microsoft", "amazon", "netflix", "facebook",
    "instagram", "ebay", "linkedin", "dropbox", "adobe", "twitter", "chase",
    "wellsfargo", "bankofamerica",
];

static IPV4_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}\.){3}\d{1,3}").expect("ipv4 pattern must compile"));

/// Extracted URL features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub url_length: f64,
    pub has_ip: f64,
    pub has_https: f64,
    pub num_dots: f64,
    pub has_at_symbol: f64,
    pub has_hyphen: f64,
    pub has_suspicious_words: f64,
    pub domain_length: f64,
    pub path_length: f64,
    pub subdomain_count: f64,
    pub has_port: f64,
    pub has_fragment: f64,
    pub has_query: f64,
    pub num_params: f64,
    pub digit_ratio: f64,
    pub special_char_ratio: f64,
    pub domain_entropy: f64,

    /// Top-level domain; not scored
    pub tld: String,

    pub num_redirects: f64,
    pub url_shortener: f64,
    pub suspicious_tld: f64,
    pub num_subdomains: f64,
    pub path_depth: f64,
    pub has_double_slash_redirect: f64,
    pub has_unicode: f64,
    pub is_encoded: f64,
    pub is_long_url: f64,
    pub brand_mismatch: f64,
    pub has_char_substitution: f64,
}

impl FeatureVector {
    /// Numeric features in model order, `tld` excluded
    pub fn scoring_vector(&self) -> Vec<f64> {
        vec![
            self.url_length,
            self.has_ip,
            self.has_https,
            self.num_dots,
            self.has_at_symbol,
            self.has_hyphen,
            self.has_suspicious_words,
            self.domain_length,
            self.path_length,
            self.subdomain_count,
            self.has_port,
            self.has_fragment,
            self.has_query,
            self.num_params,
            self.digit_ratio,
            self.special_char_ratio,
            self.domain_entropy,
            self.num_redirects,
            self.url_shortener,
            self.suspicious_tld,
            self.num_subdomains,
            self.path_depth,
            self.has_double_slash_redirect,
            self.has_unicode,
            self.is_encoded,
            self.is_long_url,
            self.brand_mismatch,
            self.has_char_substitution,
        ]
    }
}

/// Raw URL pieces, split the way the model's training pipeline split them
struct UrlParts<'a> {
    netloc: &'a str,
    path: &'a str,
    query: &'a str,
    fragment: &'a str,
}

impl<'a> UrlParts<'a> {
    fn split(url: &'a str) -> Option<Self> {
        let (_, rest) = url.split_once("://")?;

        let netloc_end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
        let (netloc, tail) = rest.split_at(netloc_end);
        let (before_fragment, fragment) = tail.split_once('#').unwrap_or((tail, ""));
        let (path, query) = before_fragment.split_once('?').unwrap_or((before_fragment, ""));

        Some(Self {
            netloc,
            path,
            query,
            fragment,
        })
    }
}

/// Popular brand names used for the brand-mismatch feature
#[derive(Debug, Clone)]
pub struct BrandList {
    brands: Vec<String>,
}

impl BrandList {
    pub fn new<I, S>(brands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            brands: brands
                .into_iter()
                .map(|b| b.as_ref().trim().to_lowercase())
                .filter(|b| !b.is_empty())
                .collect(),
        }
    }

    /// Load one brand per line. Falls back to the built-in list when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Brands file not found at {}, using built-in list", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::StorageFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let list = Self::new(raw.lines());
        debug!("Loaded {} brands from {}", list.len(), path.display());
        Ok(list)
    }

    /// A brand appears in `domain` but the domain is not that brand's own
    pub fn mismatch(&self, domain: &str) -> bool {
        self.brands.iter().any(|brand| {
            domain.contains(brand.as_str())
                && !domain.ends_with(&format!("{}.com", brand))
                && !domain.ends_with(&format!(".{}", brand))
        })
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }
}

impl Default for BrandList {
    fn default() -> Self {
        Self::new(DEFAULT_BRANDS)
    }
}

/// Builds feature vectors from URLs
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    brands: BrandList,
}

impl FeatureExtractor {
    pub fn new(brands: BrandList) -> Self {
        Self { brands }
    }

    /// Extract features; scheme-less input is read as `http://`
    pub fn extract(&self, url: &str) -> Result<FeatureVector> {
        let target = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };

        let parsed = url::Url::parse(&target)
            .map_err(|e| EngineError::FeatureExtraction(format!("{}: {}", url, e)))?;
        let parts = UrlParts::split(&target)
            .ok_or_else(|| EngineError::FeatureExtraction(format!("{}: missing authority", url)))?;

        let netloc = parts.netloc.to_lowercase();
        let path = parts.path.to_lowercase();
        let full_url = target.to_lowercase();

        let domain_parts: Vec<&str> = host_part(&netloc).split('.').collect();
        let domain_label = if domain_parts.len() >= 2 {
            domain_parts[domain_parts.len() - 2]
        } else {
            host_part(&netloc)
        };
        let last_label = domain_parts.last().copied().unwrap_or("");

        let url_length = url.chars().count();
        let full_len = full_url.chars().count();
        let digit_count = full_url.chars().filter(|c| c.is_ascii_digit()).count();
        let special_count = full_url
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();

        Ok(FeatureVector {
            url_length: url_length as f64,
            has_ip: flag(IPV4_PATTERN.is_match(&netloc)),
            has_https: flag(parsed.scheme() == "https"),
            num_dots: full_url.matches('.').count() as f64,
            has_at_symbol: flag(full_url.contains('@')),
            has_hyphen: flag(netloc.contains('-')),
            has_suspicious_words: flag(SUSPICIOUS_WORDS.iter().any(|w| full_url.contains(w))),
            domain_length: netloc.chars().count() as f64,
            path_length: path.chars().count() as f64,
            subdomain_count: domain_parts.len().saturating_sub(2) as f64,
            has_port: flag(has_explicit_port(&netloc)),
            has_fragment: flag(!parts.fragment.is_empty()),
            has_query: flag(!parts.query.is_empty()),
            num_params: if parts.query.is_empty() {
                0.0
            } else {
                parts.query.split('&').count() as f64
            },
            digit_ratio: ratio(digit_count, full_len),
            special_char_ratio: ratio(special_count, full_len),
            domain_entropy: shannon_entropy(&netloc),
            tld: if domain_parts.len() > 1 {
                last_label.to_string()
            } else {
                String::new()
            },
            num_redirects: full_url.matches("http").count() as f64 - 1.0,
            url_shortener: flag(URL_SHORTENERS.iter().any(|s| netloc.contains(s))),
            suspicious_tld: flag(SUSPICIOUS_TLDS.contains(&last_label)),
            num_subdomains: netloc.matches('.').count() as f64,
            path_depth: path.matches('/').count() as f64,
            has_double_slash_redirect: flag(path.contains("//")),
            has_unicode: flag(!full_url.is_ascii()),
            is_encoded: flag(full_url.contains('%')),
            is_long_url: flag(url_length > LONG_URL_THRESHOLD),
            brand_mismatch: flag(self.brands.mismatch(&netloc)),
            has_char_substitution: flag(domain_label.contains(SUBSTITUTION_CHARS)),
        })
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// `netloc` without userinfo
fn host_and_port(netloc: &str) -> &str {
    netloc.rsplit_once('@').map(|(_, h)| h).unwrap_or(netloc)
}

/// `netloc` without userinfo or port
fn host_part(netloc: &str) -> &str {
    let host_port = host_and_port(netloc);
    match host_port.rfind(']') {
        Some(idx) => &host_port[..=idx],
        None => host_port.split(':').next().unwrap_or(host_port),
    }
}

/// Explicit `:port` after the host (IPv6 brackets respected)
fn has_explicit_port(netloc: &str) -> bool {
    let host_port = host_and_port(netloc);
    let after_host = match host_port.rfind(']') {
        Some(idx) => &host_port[idx + 1..],
        None => host_port,
    };

    after_host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty())
}

/// Shannon entropy (bits) over the characters of `s`
pub fn shannon_entropy(s: &str) -> f64 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }

    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }

    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}
