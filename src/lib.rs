//! Locate quoted snippets inside PDFs using lopdf
//!
//! This module provides:
//! - Text block extraction with page geometry
//! - Partial-ratio fuzzy scoring of blocks against a snippet
//! - Padded, page-clamped highlight boxes for the matched block
//! - Collation of model answers with the regions they quote

pub mod citation;
pub mod extractor;
pub mod fonts;
pub mod locator;
pub mod similarity;

pub use citation::{collate_answers, collate_answers_mem, AnswerSheet, CitedAnswer, Question};
pub use extractor::{extract_pages, extract_pages_mem, Page, PageGeometry, Rect, TextBlock};
pub use locator::{
    locate, locate_with_config, Coordinates, LocatorConfig, MatchResult, SelectionPolicy,
};
pub use similarity::partial_ratio;

use std::path::Path;

/// Find the region of a PDF file that best matches `search_text`
///
/// This function will:
/// 1. Load the document and extract text blocks for every page
/// 2. Score each block against the search text
/// 3. Return the selected block's highlight box, or the fallback result
///    when nothing reaches the threshold
pub fn find_text_in_pdf<P: AsRef<Path>>(
    path: P,
    search_text: &str,
) -> Result<MatchResult, PdfError> {
    let buffer = std::fs::read(path)?;
    find_text_in_pdf_mem(&buffer, search_text)
}

/// Find the region of an in-memory PDF that best matches `search_text`
pub fn find_text_in_pdf_mem(buffer: &[u8], search_text: &str) -> Result<MatchResult, PdfError> {
    find_text_in_pdf_mem_with_config(buffer, search_text, &LocatorConfig::default())
}

/// Find the best matching region with a custom locator configuration
pub fn find_text_in_pdf_mem_with_config(
    buffer: &[u8],
    search_text: &str,
    config: &LocatorConfig,
) -> Result<MatchResult, PdfError> {
    let start = std::time::Instant::now();
    let pages = extract_pages_mem(buffer)?;
    let result = locate_with_config(&pages, search_text, config);
    log::debug!(
        "searched {} pages in {}ms",
        pages.len(),
        start.elapsed().as_millis()
    );
    Ok(result)
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The bytes are not a parsable PDF
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no answer for question '{0}'")]
    MissingAnswer(String),
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e.to_string())
    }
}
