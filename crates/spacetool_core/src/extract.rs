//! Format-specific text extraction for ingested documents.
//!
//! Each format is read through its own capability trait so tests (and
//! future readers) can be swapped in. [`ContentExtractor::extract`] never
//! fails: any reader error, including a panic inside a parser, becomes a
//! placeholder paragraph.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::markup::{heading, paragraph, preformatted, table, truncate_chars};

pub const MAX_TEXT_CHARS: usize = 15_000;
pub const MAX_SHEET_ROWS: usize = 100;

pub const ENCRYPTED_PDF_PLACEHOLDER: &str = "Encrypted PDF - content cannot be extracted";
pub const EMPTY_PDF_PLACEHOLDER: &str =
    "PDF contains no extractable text (possibly a scanned document)";
pub const PDF_FAILED_PLACEHOLDER: &str = "PDF content could not be extracted";
pub const WORD_FAILED_PLACEHOLDER: &str = "Word content could not be extracted";
pub const SPREADSHEET_FAILED_PLACEHOLDER: &str = "Spreadsheet content could not be extracted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Word,
    Spreadsheet,
}

impl DocumentKind {
    /// Classify by extension (case-insensitive). `None` means unsupported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Word),
            "xlsx" | "xls" => Some(Self::Spreadsheet),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::Spreadsheet => "spreadsheet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDocument {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

impl LocalDocument {
    pub fn classify(path: &Path) -> Option<Self> {
        DocumentKind::from_path(path).map(|kind| Self {
            path: path.to_path_buf(),
            kind,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document is encrypted")]
    Encrypted,
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("pdf: {0}")]
    Pdf(String),
    #[error("word: {0}")]
    Word(String),
    #[error("spreadsheet: {0}")]
    Spreadsheet(String),
    #[error("reader panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfPage {
    Text(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    /// First row is the header row.
    pub rows: Vec<Vec<String>>,
}

pub trait PdfSource {
    fn read_pages(&self, path: &Path) -> Result<Vec<PdfPage>, ExtractError>;
}

pub trait WordSource {
    fn read_paragraphs(&self, path: &Path) -> Result<Vec<String>, ExtractError>;
}

pub trait SpreadsheetSource {
    /// Header row plus at most `max_rows` data rows per sheet.
    fn read_sheets(&self, path: &Path, max_rows: usize) -> Result<Vec<Sheet>, ExtractError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfSource;

impl PdfSource for LopdfSource {
    fn read_pages(&self, path: &Path) -> Result<Vec<PdfPage>, ExtractError> {
        let bytes = fs::read(path)?;
        let mut document = lopdf::Document::load_mem(&bytes)
            .map_err(|error| load_error(error.to_string()))?;
        if document.is_encrypted() {
            debug!(file = %path.display(), "pdf is encrypted, trying empty password");
            document
                .decrypt("")
                .map_err(|_| ExtractError::Encrypted)?;
        }

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let mut pages = Vec::with_capacity(page_numbers.len());
        for page_number in page_numbers {
            match document.extract_text(&[page_number]) {
                Ok(text) => pages.push(PdfPage::Text(text)),
                Err(error) => pages.push(PdfPage::Failed(error.to_string())),
            }
        }
        Ok(pages)
    }
}

fn load_error(message: String) -> ExtractError {
    if message.to_ascii_lowercase().contains("crypt") {
        ExtractError::Encrypted
    } else {
        ExtractError::Pdf(message)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocxSource;

impl WordSource for DocxSource {
    fn read_paragraphs(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        use docx_rs::DocumentChild;

        let bytes = fs::read(path)?;
        let docx =
            docx_rs::read_docx(&bytes).map_err(|error| ExtractError::Word(error.to_string()))?;

        let mut paragraphs = Vec::new();
        for child in &docx.document.children {
            let DocumentChild::Paragraph(paragraph) = child else {
                continue;
            };
            let mut text = String::new();
            push_run_text(&paragraph.children, &mut text);
            paragraphs.push(text);
        }
        Ok(paragraphs)
    }
}

/// Append the text of every run, including runs nested in hyperlinks.
fn push_run_text(children: &[docx_rs::ParagraphChild], text: &mut String) {
    use docx_rs::{ParagraphChild, RunChild};

    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    match run_child {
                        RunChild::Text(value) => text.push_str(&value.text),
                        RunChild::Tab(_) => text.push('\t'),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => push_run_text(&link.children, text),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineSource;

impl SpreadsheetSource for CalamineSource {
    fn read_sheets(&self, path: &Path, max_rows: usize) -> Result<Vec<Sheet>, ExtractError> {
        use calamine::Reader;

        let mut workbook = calamine::open_workbook_auto(path)
            .map_err(|error| ExtractError::Spreadsheet(error.to_string()))?;
        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|error| ExtractError::Spreadsheet(format!("{name}: {error}")))?;
            let rows = range
                .rows()
                .take(max_rows.saturating_add(1))
                .map(|row| row.iter().map(ToString::to_string).collect())
                .collect();
            sheets.push(Sheet { name, rows });
        }
        Ok(sheets)
    }
}

pub struct ContentExtractor {
    pdf: Box<dyn PdfSource>,
    word: Box<dyn WordSource>,
    spreadsheet: Box<dyn SpreadsheetSource>,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(
            Box::new(LopdfSource),
            Box::new(DocxSource),
            Box::new(CalamineSource),
        )
    }
}

impl ContentExtractor {
    pub fn new(
        pdf: Box<dyn PdfSource>,
        word: Box<dyn WordSource>,
        spreadsheet: Box<dyn SpreadsheetSource>,
    ) -> Self {
        Self {
            pdf,
            word,
            spreadsheet,
        }
    }

    /// Markup for `document`: a filename heading followed by the extracted
    /// content or a placeholder. Never empty.
    pub fn extract(&self, document: &LocalDocument) -> String {
        let mut content = heading(2, &document.file_name());
        let body = match document.kind {
            DocumentKind::Pdf => self.extract_pdf(&document.path),
            DocumentKind::Word => self.extract_word(&document.path),
            DocumentKind::Spreadsheet => self.extract_spreadsheet(&document.path),
        };
        content.push_str(&body);
        content
    }

    fn extract_pdf(&self, path: &Path) -> String {
        match guarded(|| self.pdf.read_pages(path)) {
            Ok(pages) => render_pdf_pages(&pages),
            Err(ExtractError::Encrypted) => {
                warn!(file = %path.display(), "encrypted pdf could not be opened with an empty password");
                paragraph(ENCRYPTED_PDF_PLACEHOLDER)
            }
            Err(error) => {
                warn!(file = %path.display(), %error, "pdf extraction failed");
                paragraph(PDF_FAILED_PLACEHOLDER)
            }
        }
    }

    fn extract_word(&self, path: &Path) -> String {
        match guarded(|| self.word.read_paragraphs(path)) {
            Ok(paragraphs) => {
                let text = paragraphs.join("\n");
                preformatted(truncate_chars(&text, MAX_TEXT_CHARS))
            }
            Err(error) => {
                warn!(file = %path.display(), %error, "word extraction failed");
                paragraph(WORD_FAILED_PLACEHOLDER)
            }
        }
    }

    fn extract_spreadsheet(&self, path: &Path) -> String {
        match guarded(|| self.spreadsheet.read_sheets(path, MAX_SHEET_ROWS)) {
            Ok(sheets) => {
                let mut output = String::new();
                for sheet in &sheets {
                    output.push_str(&heading(3, &sheet.name));
                    let limit = sheet.rows.len().min(MAX_SHEET_ROWS + 1);
                    output.push_str(&table(&sheet.rows[..limit]));
                }
                output
            }
            Err(error) => {
                warn!(file = %path.display(), %error, "spreadsheet extraction failed");
                paragraph(SPREADSHEET_FAILED_PLACEHOLDER)
            }
        }
    }
}

fn render_pdf_pages(pages: &[PdfPage]) -> String {
    if pages.is_empty() {
        return paragraph(EMPTY_PDF_PLACEHOLDER);
    }
    let mut text = String::new();
    for (index, page) in pages.iter().enumerate() {
        let number = index + 1;
        match page {
            PdfPage::Text(value) if !value.trim().is_empty() => {
                text.push_str(&format!("--- Page {number} ---\n{value}\n\n"));
            }
            PdfPage::Text(_) => text.push_str(&format!("--- Page {number} (no text) ---\n\n")),
            PdfPage::Failed(reason) => {
                debug!(page = number, reason = %reason, "pdf page extraction failed");
                text.push_str(&format!("--- Page {number} (extraction failed) ---\n\n"));
            }
        }
    }
    preformatted(truncate_chars(&text, MAX_TEXT_CHARS))
}

fn guarded<T, F>(read: F) -> Result<T, ExtractError>
where
    F: FnOnce() -> Result<T, ExtractError>,
{
    match panic::catch_unwind(AssertUnwindSafe(read)) {
        Ok(result) => result,
        Err(payload) => Err(ExtractError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
