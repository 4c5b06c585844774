//! Resume Extractor: raw attachment bytes to normalized text plus contact links.
//!
//! Unknown kinds and documents the parser chokes on fall back to plain-text
//! decoding. Only bytes that are not text in any reasonable sense fail.

pub mod document;
pub mod docx;
pub mod links;
pub mod skills;

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

pub use document::DocumentKind;
pub use skills::skills_found;

/// Below this share of printable characters the bytes are treated as binary.
const MIN_PRINTABLE_RATIO: f64 = 0.85;
/// Shortest printable run kept when salvaging text out of a binary container.
const MIN_SALVAGE_RUN: usize = 4;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document is not decodable as text ({kind:?}, {len} bytes)")]
    Undecodable { kind: DocumentKind, len: usize },

    #[error("extraction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedResume {
    pub text: String,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub embedded_emails: Vec<String>,
    pub kind: DocumentKind,
}

impl ExtractedResume {
    /// A candidate with no attachment still flows through scoring.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            linkedin_url: None,
            github_url: None,
            embedded_emails: Vec::new(),
            kind: DocumentKind::Unknown,
        }
    }

    /// Structured document persisted on the application row.
    pub fn to_resume_data(&self, skills: &[String]) -> Value {
        json!({
            "skills": skills,
            "links": {
                "linkedin": self.linkedin_url,
                "github": self.github_url,
            },
            "emails": self.embedded_emails,
            "kind": self.kind,
            "raw_text": self.text,
        })
    }
}

/// Runs extraction on the blocking pool; PDF parsing is CPU-bound.
pub async fn extract_resume(
    bytes: Vec<u8>,
    kind: DocumentKind,
) -> Result<ExtractedResume, ExtractError> {
    tokio::task::spawn_blocking(move || extract(&bytes, kind))
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))?
}

pub fn extract(bytes: &[u8], kind: DocumentKind) -> Result<ExtractedResume, ExtractError> {
    let text = match kind {
        DocumentKind::Pdf => match pdf_text(bytes) {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                warn!(len = bytes.len(), "PDF extraction failed, falling back to plain text");
                decode_text(bytes)
                    .or_else(|| salvage_text(bytes))
                    .ok_or(ExtractError::Undecodable { kind, len: bytes.len() })?
            }
        },
        // .docx is a deflated zip; salvaging printable runs from it yields noise.
        DocumentKind::Word if bytes.starts_with(document::ZIP_MAGIC) => docx::docx_text(bytes)
            .ok_or(ExtractError::Undecodable { kind, len: bytes.len() })?,
        DocumentKind::Word => decode_text(bytes)
            .or_else(|| salvage_text(bytes))
            .ok_or(ExtractError::Undecodable { kind, len: bytes.len() })?,
        DocumentKind::Html => decode_text(bytes)
            .map(|html| html_to_text(&html))
            .ok_or(ExtractError::Undecodable { kind, len: bytes.len() })?,
        DocumentKind::PlainText | DocumentKind::Unknown => decode_text(bytes)
            .ok_or(ExtractError::Undecodable { kind, len: bytes.len() })?,
    };

    let text = normalize_whitespace(&text);
    Ok(ExtractedResume {
        linkedin_url: links::linkedin_urls(&text).into_iter().next(),
        github_url: links::github_urls(&text).into_iter().next(),
        embedded_emails: links::emails(&text),
        kind,
        text,
    })
}

fn pdf_text(bytes: &[u8]) -> Option<String> {
    // pdf-extract panics on some malformed inputs.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            warn!("pdf-extract error: {e}");
            None
        }
        Err(_) => {
            warn!("pdf-extract panicked");
            None
        }
    }
}

/// UTF-8 (with or without BOM), then UTF-16 with BOM, then Latin-1 if it reads as text.
fn decode_text(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return Some(String::new());
    }
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(s) = std::str::from_utf8(bytes) {
        return looks_like_text(s).then(|| s.to_string());
    }
    if let Some(s) = decode_utf16(bytes) {
        return looks_like_text(&s).then_some(s);
    }
    let latin1: String = bytes.iter().map(|&b| b as char).collect();
    looks_like_text(&latin1).then_some(latin1)
}

fn decode_utf16(bytes: &[u8]) -> Option<String> {
    let (body, little_endian) = if let Some(rest) = bytes.strip_prefix(b"\xFF\xFE") {
        (rest, true)
    } else if let Some(rest) = bytes.strip_prefix(b"\xFE\xFF") {
        (rest, false)
    } else {
        return None;
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}

fn looks_like_text(s: &str) -> bool {
    let total = s.chars().count();
    if total == 0 {
        return true;
    }
    let printable = s
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .count();
    printable as f64 / total as f64 >= MIN_PRINTABLE_RATIO
}

/// Keeps printable ASCII runs from a binary container (legacy .doc stores text inline).
fn salvage_text(bytes: &[u8]) -> Option<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            current.push(b as char);
        } else {
            if current.trim().len() >= MIN_SALVAGE_RUN {
                runs.push(current.trim().to_string());
            }
            current.clear();
        }
    }
    if current.trim().len() >= MIN_SALVAGE_RUN {
        runs.push(current.trim().to_string());
    }
    let words: usize = runs.iter().map(|r| r.split_whitespace().count()).sum();
    (words >= 3).then(|| runs.join("\n"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"))
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid script regex")
    })
}

fn html_to_text(html: &str) -> String {
    let without_scripts = script_re().replace_all(html, " ");
    let text = without_scripts
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n")
        .replace("</li>", "\n")
        .replace("</div>", "\n");
    tag_re()
        .replace_all(&text, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Trims lines, collapses inner whitespace runs and drops repeated blank lines.
fn normalize_whitespace(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank = false;
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !blank && !out.is_empty() {
                out.push(String::new());
            }
            blank = true;
        } else {
            out.push(line);
            blank = false;
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
