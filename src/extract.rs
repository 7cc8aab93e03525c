//! Text extraction for uploaded documents (PDF, DOCX, plain text).
//!
//! Extraction is a cascade: an [`ExtractorChain`] holds an ordered list of
//! [`ExtractionStrategy`] implementations and tries every strategy that
//! applies to the upload, in order, until one yields non-blank text. The
//! default chain is:
//!
//! | Upload | Strategies |
//! |--------|------------|
//! | `*.pdf` / `application/pdf` | pdf-extract → lopdf → raw decode |
//! | `*.docx` / DOCX MIME | OOXML `w:t` runs → raw decode |
//! | anything else | raw decode |
//!
//! New formats are added by pushing another strategy onto the chain.
//!
//! Parsers for real-world PDFs can panic on malformed input. Each strategy
//! runs under `catch_unwind`, so a panic counts as a failed strategy and the
//! cascade moves on. Async callers go through [`extract_text`], which runs
//! the whole chain on the blocking pool.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("extractor panicked: {0}")]
    Panicked(String),
}

/// One way of turning uploaded bytes into text.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy should be tried for the upload.
    fn applies_to(&self, filename: &str, content_type: &str) -> bool;

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

fn has_extension(filename: &str, ext: &str) -> bool {
    filename.to_lowercase().ends_with(ext)
}

fn is_pdf(filename: &str, content_type: &str) -> bool {
    has_extension(filename, ".pdf") || content_type == MIME_PDF
}

fn is_docx(filename: &str, content_type: &str) -> bool {
    has_extension(filename, ".docx") || content_type == MIME_DOCX
}

/// PDF text via `pdf-extract`.
pub struct PdfExtractStrategy;

impl ExtractionStrategy for PdfExtractStrategy {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn applies_to(&self, filename: &str, content_type: &str) -> bool {
        is_pdf(filename, content_type)
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

/// PDF text via `lopdf`, more tolerant of malformed files.
pub struct LopdfStrategy;

impl ExtractionStrategy for LopdfStrategy {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn applies_to(&self, filename: &str, content_type: &str) -> bool {
        is_pdf(filename, content_type)
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let mut out = Vec::with_capacity(pages.len());
        for page in pages {
            // A broken page should not discard the rest of the document.
            match doc.extract_text(&[page]) {
                Ok(text) => out.push(text),
                Err(e) => debug!(page, error = %e, "lopdf could not extract page"),
            }
        }
        Ok(out.join("\n"))
    }
}

/// DOCX paragraphs from `word/document.xml`, one line per `w:p`.
pub struct DocxStrategy;

impl ExtractionStrategy for DocxStrategy {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn applies_to(&self, filename: &str, content_type: &str) -> bool {
        is_docx(filename, content_type)
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        let mut doc_xml = Vec::new();
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(ExtractError::Ooxml(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
        extract_paragraphs(&doc_xml)
    }
}

fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

/// Lossy UTF-8 decode; invalid sequences are dropped, not replaced.
pub struct RawDecodeStrategy;

impl ExtractionStrategy for RawDecodeStrategy {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn applies_to(&self, _filename: &str, _content_type: &str) -> bool {
        true
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        Ok(decode_lossy(bytes))
    }
}

pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect()
}

/// Ordered list of strategies; the first non-blank result wins.
pub struct ExtractorChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(PdfExtractStrategy),
            Box::new(LopdfStrategy),
            Box::new(DocxStrategy),
            Box::new(RawDecodeStrategy),
        ])
    }
}

impl ExtractorChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run the cascade. Returns an empty string when nothing produced text.
    pub fn extract(&self, filename: &str, content_type: &str, bytes: &[u8]) -> String {
        for strategy in self
            .strategies
            .iter()
            .filter(|s| s.applies_to(filename, content_type))
        {
            match run_guarded(strategy.as_ref(), bytes) {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(filename, strategy = strategy.name(), "extracted text");
                    return text;
                }
                Ok(_) => debug!(filename, strategy = strategy.name(), "strategy produced no text"),
                Err(e) => debug!(filename, strategy = strategy.name(), error = %e, "strategy failed"),
            }
        }
        String::new()
    }
}

fn run_guarded(strategy: &dyn ExtractionStrategy, bytes: &[u8]) -> Result<String, ExtractError> {
    match catch_unwind(AssertUnwindSafe(|| strategy.extract(bytes))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ExtractError::Panicked(message))
        }
    }
}

/// Run the cascade on the blocking pool so large PDF and DOCX parses do not
/// stall the async workers.
pub async fn extract_text(
    chain: &Arc<ExtractorChain>,
    filename: &str,
    content_type: &str,
    bytes: Vec<u8>,
) -> String {
    let chain = Arc::clone(chain);
    let name = filename.to_string();
    let mime = content_type.to_string();
    match tokio::task::spawn_blocking(move || chain.extract(&name, &mime, &bytes)).await {
        Ok(text) => text,
        Err(e) => {
            warn!(filename, error = %e, "extraction task failed");
            String::new()
        }
    }
}
