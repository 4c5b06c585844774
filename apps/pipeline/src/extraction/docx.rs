//! Text of an Office Open XML (.docx) document.
//!
//! Only `word/document.xml` is read. Paragraphs become lines and `<w:tab/>`
//! becomes a space; headers, footers and comments are ignored.

use std::io::{Cursor, Read};
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

const DOCUMENT_PART: &str = "word/document.xml";
/// Decompressed size cap for the document part.
const MAX_DOCUMENT_XML: u64 = 16 * 1024 * 1024;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab\s*/>|<w:br\s*/>|</w:p>")
            .expect("valid docx token regex")
    })
}

/// Returns `None` when the archive or its document part cannot be read.
pub fn docx_text(bytes: &[u8]) -> Option<String> {
    let mut archive = match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => {
            warn!("Not a readable zip archive: {e}");
            return None;
        }
    };
    let part = match archive.by_name(DOCUMENT_PART) {
        Ok(part) => part,
        Err(e) => {
            warn!("{DOCUMENT_PART} missing from archive: {e}");
            return None;
        }
    };
    let mut xml = String::new();
    if let Err(e) = part.take(MAX_DOCUMENT_XML).read_to_string(&mut xml) {
        warn!("{DOCUMENT_PART} is not readable UTF-8: {e}");
        return None;
    }
    Some(document_xml_text(&xml))
}

fn document_xml_text(xml: &str) -> String {
    let mut out = String::new();
    for caps in token_re().captures_iter(xml) {
        match caps.get(1) {
            Some(run) => out.push_str(&unescape_xml(run.as_str())),
            None => match &caps[0] {
                "</w:p>" => out.push('\n'),
                token if token.starts_with("<w:tab") => out.push(' '),
                _ => out.push('\n'),
            },
        }
    }
    out
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    /// A minimal deflated .docx whose body is one paragraph per entry.
    pub(crate) fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{body}</w:body></w:document>"
        );
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer
            .write_all(b"<?xml version=\"1.0\"?><Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"/>")
            .unwrap();
        writer.start_file(DOCUMENT_PART, options).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_runs_and_paragraphs_are_joined() {
        let xml = "<w:p><w:r><w:t>Rust</w:t></w:r><w:r><w:tab/><w:t xml:space=\"preserve\">&amp; Go</w:t></w:r></w:p><w:p><w:r><w:t>Postgres</w:t></w:r></w:p>";
        assert_eq!(document_xml_text(xml), "Rust & Go\nPostgres\n");
    }

    #[test]
    fn test_deflated_docx_is_read() {
        let bytes = build_docx(&["Jane Doe", "Rust and PostgreSQL"]);
        assert_eq!(docx_text(&bytes).as_deref(), Some("Jane Doe\nRust and PostgreSQL\n"));
    }

    #[test]
    fn test_zip_without_document_part_is_none() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("notes.txt", FileOptions::default()).unwrap();
        writer.write_all(b"hello").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert!(docx_text(&bytes).is_none());
    }
}
