//! Multi-section A4 report rendered with printpdf's built-in Helvetica.

use chrono::{DateTime, Utc};
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use thiserror::Error;

use crate::models::{Application, Decision};
use crate::reports::analysis::ReportAnalysis;
use crate::reports::stats::{ranked, ReportStats};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const TOP: f32 = PAGE_HEIGHT - MARGIN;
const BOTTOM: f32 = MARGIN;
/// Line advance in mm per point of font size.
const LINE_FACTOR: f32 = 0.48;
/// Average Helvetica glyph width in mm per point of font size.
const GLYPH_FACTOR: f32 = 0.19;

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 10.0;
const SMALL_SIZE: f32 = 8.5;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("PDF task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct CandidateLine {
    pub name: String,
    pub email: String,
    pub score: Option<f64>,
    pub reasoning: Option<String>,
}

impl From<&Application> for CandidateLine {
    fn from(app: &Application) -> Self {
        Self {
            name: app.candidate_name.clone(),
            email: app.candidate_email.clone(),
            score: app.ai_score,
            reasoning: app.reasoning.clone(),
        }
    }
}

/// Everything the renderer needs, owned so it can move to the blocking pool.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub job_title: String,
    pub company_name: String,
    pub generated_at: DateTime<Utc>,
    pub stats: ReportStats,
    pub analysis: ReportAnalysis,
    pub shortlisted: Vec<CandidateLine>,
    pub flagged: Vec<CandidateLine>,
    pub rejected: Vec<CandidateLine>,
}

impl ReportDocument {
    pub fn new(
        job_title: &str,
        company_name: &str,
        generated_at: DateTime<Utc>,
        stats: ReportStats,
        analysis: ReportAnalysis,
        applications: &[Application],
    ) -> Self {
        let lines = |decision: Decision| -> Vec<CandidateLine> {
            ranked(applications, decision)
                .into_iter()
                .map(CandidateLine::from)
                .collect()
        };
        Self {
            job_title: job_title.to_string(),
            company_name: company_name.to_string(),
            generated_at,
            stats,
            analysis,
            shortlisted: lines(Decision::Shortlist),
            flagged: lines(Decision::Flag),
            rejected: lines(Decision::Reject),
        }
    }
}

pub async fn render_pdf(doc: ReportDocument) -> Result<Vec<u8>, PdfError> {
    tokio::task::spawn_blocking(move || render(&doc))
        .await
        .map_err(|e| PdfError::Task(e.to_string()))?
}

pub fn render(doc: &ReportDocument) -> Result<Vec<u8>, PdfError> {
    let title = format!("Hiring report: {}", doc.job_title);
    let mut w = PdfWriter::new(&title)?;

    w.line(&title, TITLE_SIZE, true, 0.0);
    w.line(
        &format!(
            "{} | generated {}",
            doc.company_name,
            doc.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        SMALL_SIZE,
        false,
        0.0,
    );

    w.heading("Executive summary");
    w.paragraph(&doc.analysis.executive_summary, BODY_SIZE, 0.0);

    w.heading("Statistics");
    let s = &doc.stats;
    for row in [
        format!("Total applicants: {}", s.total_applicants),
        format!("Shortlisted: {}", s.shortlisted),
        format!("Flagged for review: {}", s.flagged),
        format!("Rejected: {}", s.rejected),
        format!("Not scored: {}", s.unscored),
        format!(
            "Average score: {}",
            s.average_score
                .map(|a| format!("{a:.1}"))
                .unwrap_or_else(|| "n/a".to_string())
        ),
    ] {
        w.line(&row, BODY_SIZE, false, 4.0);
    }

    w.heading("Top candidates");
    if doc.analysis.top_candidates.is_empty() {
        w.line("No shortlisted candidates.", BODY_SIZE, false, 4.0);
    }
    for (i, c) in doc.analysis.top_candidates.iter().enumerate() {
        let mut head = format!("{}. {}", i + 1, c.name);
        if let Some(email) = &c.email {
            head.push_str(&format!(" <{email}>"));
        }
        if let Some(score) = c.score {
            head.push_str(&format!(" - score {score:.0}"));
        }
        w.line(&head, BODY_SIZE, true, 4.0);
        w.paragraph(&c.rationale, SMALL_SIZE, 10.0);
    }

    if !doc.analysis.role_fit_analysis.trim().is_empty() {
        w.heading("Role fit");
        w.paragraph(&doc.analysis.role_fit_analysis, BODY_SIZE, 0.0);
    }

    w.candidate_section("Shortlisted", &doc.shortlisted, true);
    w.candidate_section("Flagged for review", &doc.flagged, true);
    w.candidate_section("Rejected", &doc.rejected, false);

    if !doc.analysis.pool_gaps.is_empty() {
        w.heading("Gaps in the pool");
        for gap in &doc.analysis.pool_gaps {
            w.paragraph(&format!("- {gap}"), BODY_SIZE, 4.0);
        }
    }

    w.heading("Recommendations");
    if doc.analysis.recommendations.is_empty() {
        w.line("None.", BODY_SIZE, false, 4.0);
    }
    for rec in &doc.analysis.recommendations {
        w.paragraph(&format!("- {rec}"), BODY_SIZE, 4.0);
    }

    w.finish()
}

struct PdfWriter {
    pdf: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, PdfError> {
        let (pdf, page, layer) =
            PdfDocument::new(ascii(title), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = pdf
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| PdfError::Render(e.to_string()))?;
        let bold = pdf
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| PdfError::Render(e.to_string()))?;
        let layer = pdf.get_page(page).get_layer(layer);
        Ok(Self {
            pdf,
            layer,
            regular,
            bold,
            y: TOP,
        })
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < BOTTOM {
            let (page, layer) = self.pdf.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.pdf.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }

    fn line(&mut self, text: &str, size: f32, bold: bool, indent: f32) {
        let height = size * LINE_FACTOR;
        self.ensure_space(height);
        self.y -= height;
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(ascii(text), size, Mm(MARGIN + indent), Mm(self.y), font);
    }

    fn paragraph(&mut self, text: &str, size: f32, indent: f32) {
        let usable = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let width = ((usable / (size * GLYPH_FACTOR)) as usize).max(20);
        for line in textwrap::wrap(text, width) {
            self.line(&line, size, false, indent);
        }
    }

    fn heading(&mut self, text: &str) {
        self.ensure_space(HEADING_SIZE * LINE_FACTOR + 10.0);
        self.y -= 4.0;
        self.line(text, HEADING_SIZE, true, 0.0);
        self.y -= 1.5;
    }

    fn candidate_section(&mut self, title: &str, lines: &[CandidateLine], with_reasoning: bool) {
        self.heading(&format!("{title} ({})", lines.len()));
        if lines.is_empty() {
            self.line("None.", BODY_SIZE, false, 4.0);
            return;
        }
        for c in lines {
            let score = c
                .score
                .map(|s| format!("{s:.0}"))
                .unwrap_or_else(|| "-".to_string());
            self.line(
                &format!("{} <{}> - score {score}", c.name, c.email),
                BODY_SIZE,
                false,
                4.0,
            );
            if with_reasoning {
                if let Some(reasoning) = c.reasoning.as_deref().filter(|r| !r.trim().is_empty()) {
                    self.paragraph(reasoning, SMALL_SIZE, 10.0);
                }
            }
        }
    }

    fn finish(self) -> Result<Vec<u8>, PdfError> {
        self.pdf
            .save_to_bytes()
            .map_err(|e| PdfError::Render(e.to_string()))
    }
}

/// Built-in fonts only cover WinAnsi; anything else is transliterated or replaced.
fn ascii(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\t' | '\n' | '\r' => ' ',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            '\u{A0}'..='\u{FF}' => c,
            _ => '?',
        })
        .collect()
}
