use thiserror::Error;

/// Extraction-tier failures. A page-level OCR problem degrades to an
/// empty block; `OcrFailure` is raised only when no page in the
/// document produced any text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    #[error("OCR produced no text for any page: {0}")]
    OcrFailure(String),
}
