//! Contact link extraction from resume text.

use std::sync::OnceLock;

use regex::Regex;

fn linkedin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:https?://)?(?:[a-z]{2,3}\.)?linkedin\.com/(?:in|pub)/[a-z0-9_%\-]+/?")
            .expect("valid linkedin regex")
    })
}

fn github_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:https?://)?(?:www\.)?github\.com/[a-z0-9][a-z0-9\-]{0,38}(?:/[a-z0-9_.\-]+)?/?")
            .expect("valid github regex")
    })
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9\-]+(?:\.[a-z0-9\-]+)*\.[a-z]{2,}\b")
            .expect("valid email regex")
    })
}

/// Canonical form: https scheme, lowercase host without `www.`, no trailing slash.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .or_else(|| trimmed.strip_prefix("HTTPS://"))
        .or_else(|| trimmed.strip_prefix("HTTP://"))
        .unwrap_or(trimmed);
    let (host, path) = without_scheme
        .split_once('/')
        .unwrap_or((without_scheme, ""));
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if path.is_empty() {
        format!("https://{host}")
    } else {
        format!("https://{host}/{path}")
    }
}

fn unique_matches(re: &Regex, text: &str, normalize: impl Fn(&str) -> String) -> Vec<String> {
    let mut seen = Vec::new();
    for m in re.find_iter(text) {
        let value = normalize(m.as_str());
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

pub fn linkedin_urls(text: &str) -> Vec<String> {
    unique_matches(linkedin_re(), text, normalize_url)
}

pub fn github_urls(text: &str) -> Vec<String> {
    unique_matches(github_re(), text, normalize_url)
}

pub fn emails(text: &str) -> Vec<String> {
    unique_matches(email_re(), text, |s| s.to_lowercase())
}
