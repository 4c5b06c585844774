//! Parsing of a raw inbound message into sender, subject and first attachment.

use std::sync::OnceLock;

use mailparse::{parse_mail, DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use regex::Regex;
use thiserror::Error;

use crate::ingestion::mailbox::RawMessage;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message is not valid MIME: {0}")]
    Mime(#[from] mailparse::MailParseError),

    #[error("message has no usable sender address")]
    NoSender,
}

#[derive(Debug, Clone)]
pub struct AttachmentPart {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub uid: u32,
    pub sender_email: String,
    pub sender_name: String,
    pub subject: String,
    pub attachment: Option<AttachmentPart>,
}

pub fn parse_message(raw: &RawMessage) -> Result<InboundMessage, MessageError> {
    let parsed = parse_mail(&raw.bytes)?;

    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    let (sender_email, display_name) = sender(&from).ok_or(MessageError::NoSender)?;
    let sender_name = display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| local_part(&sender_email).to_string());

    Ok(InboundMessage {
        uid: raw.uid,
        sender_email,
        sender_name,
        subject: parsed.headers.get_first_value("Subject").unwrap_or_default(),
        attachment: first_attachment(&parsed)?,
    })
}

fn sender(from: &str) -> Option<(String, Option<String>)> {
    let list = mailparse::addrparse(from).ok()?;
    let single = list.iter().find_map(|addr| match addr {
        MailAddr::Single(info) => Some(info.clone()),
        MailAddr::Group(group) => group.addrs.first().cloned(),
    })?;
    let email = single.addr.trim().to_lowercase();
    if !email.contains('@') {
        return None;
    }
    Some((email, single.display_name.map(|n| n.trim().to_string())))
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Depth-first; the first part with an attachment disposition or a file name wins.
fn first_attachment(part: &ParsedMail<'_>) -> Result<Option<AttachmentPart>, MessageError> {
    if part.subparts.is_empty() {
        let disposition = part.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .cloned();
        let is_attachment = disposition.disposition == DispositionType::Attachment;
        return match filename {
            Some(filename) => Ok(Some(AttachmentPart {
                filename,
                content_type: part.ctype.mimetype.clone(),
                bytes: part.get_body_raw()?,
            })),
            None if is_attachment => Ok(Some(AttachmentPart {
                filename: "attachment".to_string(),
                content_type: part.ctype.mimetype.clone(),
                bytes: part.get_body_raw()?,
            })),
            None => Ok(None),
        };
    }
    for sub in &part.subparts {
        if let Some(found) = first_attachment(sub)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[\s*(?:job(?:\s*id)?(?:\s*[:#-]\s*|\s+))?([a-z0-9][a-z0-9_-]{0,63})\s*\]")
            .expect("valid subject token regex")
    })
}

/// Bracketed job tokens in subject order: `[J1]`, `[Job: J1]`, `[Job ID: <uuid>]`.
pub fn subject_tokens(subject: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for caps in token_re().captures_iter(subject) {
        let token = caps[1].to_string();
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(&token)) {
            tokens.push(token);
        }
    }
    tokens
}
