// src/interception/block_page.rs
//! HTML bodies for block and bypass-error responses
//!
//! Every block page links to `<bypass_path>?token=<token>`.

use std::fmt::Write;
use std::time::Duration;

const STYLE: &str = "body{font-family:sans-serif;margin:40px;background:#f8f8f8}\
.box{background:#fff;border-left:6px solid #c0392b;padding:24px;max-width:720px}\
h1{color:#c0392b}.btn{display:inline-block;padding:10px 16px;background:#c0392b;\
color:#fff;text-decoration:none;border-radius:4px}pre,.url{background:#eee;padding:8px;word-break:break-all}";

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, inner: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>{STYLE}</style></head><body><div class=\"box\"><h1>{title}</h1>{inner}</div></body></html>"
    )
}

fn bypass_link(bypass_path: &str, token: &str) -> String {
    format!(
        "<p>If you believe this is a mistake, you can:</p>\
         <a class=\"btn\" href=\"{}?token={}\">Proceed Anyway (Not Recommended)</a>\
         <p><small>Proceeding to blocked sites may put your data and device at risk.</small></p>",
        escape(bypass_path),
        escape(token)
    )
}

/// Host is on the runtime blacklist
pub fn blacklist_page(host: &str, bypass_path: &str, token: &str) -> String {
    let inner = format!(
        "<p><strong>Warning:</strong> This site has been flagged as potentially malicious.</p>\
         <p>Detection Method: Domain Blacklist</p>\
         <p>Domain: {}</p>{}",
        escape(host),
        bypass_link(bypass_path, token)
    );
    page("Access Blocked", &inner)
}

/// Classifier confidence reached the threshold
pub fn classifier_page(url: &str, confidence: f64, elapsed: Duration, bypass_path: &str, token: &str) -> String {
    let inner = format!(
        "<p>This site has been detected as a phishing attempt with {:.2}% confidence.</p>\
         <p>Detection Method: Machine Learning Model</p>\
         <div class=\"url\">{}</div>\
         <p>Detection Time: {:.2} ms</p>\
         <p>This site has been added to the blacklist.</p>{}",
        confidence * 100.0,
        escape(url.trim_end_matches('/')),
        elapsed.as_secs_f64() * 1000.0,
        bypass_link(bypass_path, token)
    );
    page("Phishing Site Blocked", &inner)
}

/// Heuristic scanner found too many suspicious patterns
pub fn heuristic_page(url: &str, patterns: &[String], bypass_path: &str, token: &str) -> String {
    let mut list = String::new();
    for pattern in patterns {
        let _ = write!(list, "<li>{}</li>", escape(pattern));
    }

    let inner = format!(
        "<p>This site has been detected as a phishing attempt based on multiple suspicious patterns.</p>\
         <p>Detection Method: Pattern Analysis</p>\
         <div class=\"url\">{}</div>\
         <ul>{}</ul>{}",
        escape(url.trim_end_matches('/')),
        list,
        bypass_link(bypass_path, token)
    );
    page("Phishing Site Blocked", &inner)
}

/// Bypass token did not match; lists the currently valid tokens
pub fn invalid_token_page(valid_tokens: &[String]) -> String {
    let listed = if valid_tokens.is_empty() {
        "None".to_string()
    } else {
        escape(&valid_tokens.join(", "))
    };

    let inner = format!(
        "<p>The bypass token you provided is invalid or has expired.</p>\
         <p><strong>Available tokens:</strong></p><pre>{}</pre>\
         <p><a href=\"javascript:history.back()\">Go back</a></p>",
        listed
    );
    page("Invalid Bypass Request", &inner)
}
