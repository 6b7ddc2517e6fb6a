pub mod chunker;
pub mod cleanup;
pub mod content;
pub mod document;
pub mod docx;
pub mod error;
pub mod extractor;
pub mod ocr;
pub mod pdf;

pub use chunker::{Chunker, ChunkerConfig, DocumentChunk};
pub use content::{ExtractedContent, ExtractionMethod, PageText};
pub use document::{Document, DocumentKind};
pub use error::ExtractError;
pub use extractor::{ContentExtractor, ExtractorConfig};
pub use ocr::{OcrEngine, OcrOutput, TesseractOcr};

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// Read a single file into a `Document`, detecting its kind from the
/// extension and magic bytes.
pub async fn read_document(path: &Path) -> Result<Document> {
    let bytes = tokio::fs::read(path)
        .await
        .context(format!("Failed to read file: {:?}", path))?;
    let source = path.to_string_lossy().to_string();
    Ok(Document::new(source, bytes)?)
}

/// Enumerate a directory into `Document` records. Files whose format
/// cannot be detected are skipped with a warning rather than failing
/// the run.
pub async fn read_directory(dir: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        let bytes = tokio::fs::read(&path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;
        let source = path.to_string_lossy().to_string();

        match Document::new(source.clone(), bytes) {
            Ok(doc) => documents.push(doc),
            Err(ExtractError::UnsupportedFormat(_)) => {
                warn!(source = %source, "Skipping file with unsupported format");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(documents)
}
