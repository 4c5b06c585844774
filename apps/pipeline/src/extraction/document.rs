//! Document kind detection for resume attachments.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Word,
    Html,
    PlainText,
    Unknown,
}

const PDF_MAGIC: &[u8] = b"%PDF";
pub(crate) const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0";

impl DocumentKind {
    /// Infers the kind from the declared content type, then the file name, then magic bytes.
    /// Magic bytes win when they disagree with a declared PDF.
    pub fn infer(content_type: Option<&str>, filename: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.starts_with(PDF_MAGIC) {
            return DocumentKind::Pdf;
        }

        let declared = content_type
            .map(Self::from_content_type)
            .filter(|k| *k != DocumentKind::Unknown)
            .or_else(|| filename.map(Self::from_filename))
            .unwrap_or(DocumentKind::Unknown);

        match declared {
            DocumentKind::Pdf => DocumentKind::Unknown,
            DocumentKind::Unknown if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => {
                DocumentKind::Word
            }
            other => other,
        }
    }

    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" => DocumentKind::Pdf,
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                DocumentKind::Word
            }
            "text/html" => DocumentKind::Html,
            "text/plain" | "text/markdown" => DocumentKind::PlainText,
            _ => DocumentKind::Unknown,
        }
    }

    pub fn from_filename(filename: &str) -> Self {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => DocumentKind::Pdf,
            "doc" | "docx" => DocumentKind::Word,
            "htm" | "html" => DocumentKind::Html,
            "txt" | "md" | "text" => DocumentKind::PlainText,
            _ => DocumentKind::Unknown,
        }
    }
}
