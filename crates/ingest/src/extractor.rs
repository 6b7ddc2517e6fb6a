use crate::cleanup::cleanup_pages;
use crate::content::{ExtractedContent, PageText};
use crate::document::{Document, DocumentKind};
use crate::error::ExtractError;
use crate::ocr::OcrEngine;
use crate::{docx, pdf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Pages whose native text layer carries fewer alphanumeric
    /// characters than this are routed to OCR.
    pub min_native_chars: usize,
    /// A line appearing on more than this fraction of pages is treated
    /// as a running header/footer and removed.
    pub max_header_fraction: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_native_chars: 24,
            max_header_fraction: 0.4,
        }
    }
}

/// Normalizes a source document into ordered per-page text, invoking
/// OCR for image documents and for PDF pages with no usable text layer.
pub struct ContentExtractor {
    ocr: Arc<dyn OcrEngine>,
    config: ExtractorConfig,
}

impl ContentExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, config: ExtractorConfig) -> Self {
        Self { ocr, config }
    }

    pub async fn extract(&self, document: &Document) -> Result<ExtractedContent, ExtractError> {
        let mut pages = match document.kind {
            DocumentKind::Pdf => self.extract_pdf(document).await?,
            DocumentKind::Docx => self.extract_docx(document)?,
            DocumentKind::Image => vec![self.ocr_page(0, &document.bytes, &document.source).await],
        };

        if pages.is_empty() {
            return Err(ExtractError::CorruptDocument(format!(
                "{}: no pages",
                document.source
            )));
        }

        let mut texts: Vec<String> = pages.iter().map(|p| p.text.clone()).collect();
        cleanup_pages(&mut texts, self.config.max_header_fraction);
        for (page, text) in pages.iter_mut().zip(texts) {
            page.text = text;
        }

        let content = ExtractedContent::new(document.id.clone(), pages);
        if !content.has_text() {
            return Err(ExtractError::OcrFailure(document.source.clone()));
        }
        Ok(content)
    }

    async fn extract_pdf(&self, document: &Document) -> Result<Vec<PageText>, ExtractError> {
        let parsed = pdf::parse_pdf(&document.bytes)?;
        let mut pages = Vec::with_capacity(parsed.len());

        for (index, page) in parsed.into_iter().enumerate() {
            let native = page.text.trim().to_string();
            if alphanumeric_count(&native) >= self.config.min_native_chars {
                pages.push(PageText::native(index, native));
                continue;
            }

            debug!(
                source = %document.source,
                page = index,
                native_chars = alphanumeric_count(&native),
                "Sparse text layer, falling back to OCR"
            );
            let ocr_page = self.ocr_pdf_page(index, &page.images, &document.source).await;
            // A sparse-but-present text layer beats a failed OCR pass.
            if ocr_page.text.trim().is_empty() && !native.is_empty() {
                pages.push(PageText::native(index, native));
            } else {
                pages.push(ocr_page);
            }
        }

        Ok(pages)
    }

    fn extract_docx(&self, document: &Document) -> Result<Vec<PageText>, ExtractError> {
        // DOCX has no fixed pagination and nothing to rasterize for
        // OCR; the whole body becomes one page of ordered paragraphs.
        let paragraphs = docx::extract_paragraphs(&document.bytes)?;
        Ok(vec![PageText::native(0, paragraphs.join("\n\n"))])
    }

    /// OCR every embedded image on a PDF page and concatenate the
    /// results. Individual failures degrade to an empty block.
    async fn ocr_pdf_page(&self, index: usize, images: &[Vec<u8>], source: &str) -> PageText {
        if images.is_empty() {
            warn!(source, page = index, "No OCR-able images on sparse page");
            return PageText::failed(index);
        }

        let mut text = String::new();
        let mut conf_sum = 0.0f32;
        let mut ok = 0usize;
        for image in images {
            match self.ocr.recognize(image).await {
                Ok(out) if !out.text.trim().is_empty() => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(out.text.trim());
                    conf_sum += out.confidence;
                    ok += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(source, page = index, error = %e, "OCR failed for page image");
                }
            }
        }

        if ok == 0 {
            PageText::failed(index)
        } else {
            PageText::ocr(index, text, conf_sum / ok as f32)
        }
    }

    async fn ocr_page(&self, index: usize, image: &[u8], source: &str) -> PageText {
        match self.ocr.recognize(image).await {
            Ok(out) if !out.text.trim().is_empty() => {
                PageText::ocr(index, out.text.trim().to_string(), out.confidence)
            }
            Ok(_) => PageText::failed(index),
            Err(e) => {
                warn!(source, page = index, error = %e, "OCR failed");
                PageText::failed(index)
            }
        }
    }
}

fn alphanumeric_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphanumeric()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ExtractionMethod;
    use crate::ocr::OcrOutput;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Mock engine keyed on the first byte of the image payload.
    struct ScriptedOcr;

    #[async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(&self, image: &[u8]) -> Result<OcrOutput> {
            match image.first() {
                Some(1) => Ok(OcrOutput {
                    text: "Alice works at Acme Corp".to_string(),
                    confidence: 0.93,
                }),
                Some(2) => Ok(OcrOutput {
                    text: String::new(),
                    confidence: 0.0,
                }),
                _ => anyhow::bail!("unreadable image"),
            }
        }
    }

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(Arc::new(ScriptedOcr), ExtractorConfig::default())
    }

    fn image_doc(first_byte: u8) -> Document {
        let bytes = vec![first_byte, 0xD8, 0xFF, 0xE0];
        Document {
            id: "doc".to_string(),
            source: "scan.jpg".to_string(),
            kind: DocumentKind::Image,
            bytes,
        }
    }

    #[tokio::test]
    async fn test_image_document_goes_through_ocr() {
        let content = extractor().extract(&image_doc(1)).await.unwrap();
        assert_eq!(content.pages.len(), 1);
        assert_eq!(content.pages[0].method, ExtractionMethod::Ocr);
        assert!((content.pages[0].confidence - 0.93).abs() < 1e-4);
        assert!(content.pages[0].text.contains("Acme Corp"));
    }

    #[tokio::test]
    async fn test_image_with_no_text_is_ocr_failure() {
        let err = extractor().extract(&image_doc(2)).await.unwrap_err();
        assert!(matches!(err, ExtractError::OcrFailure(_)));
    }

    #[tokio::test]
    async fn test_partial_ocr_failure_degrades_not_aborts() {
        // 3 "pages" via the PDF page path: two readable, one broken.
        let ext = extractor();
        let good = ext.ocr_pdf_page(0, &[vec![1]], "doc.pdf").await;
        let bad = ext.ocr_pdf_page(1, &[vec![9]], "doc.pdf").await;
        let good2 = ext.ocr_pdf_page(2, &[vec![1]], "doc.pdf").await;

        let content = ExtractedContent::new("doc".to_string(), vec![good, bad.clone(), good2]);
        assert!(content.has_text());
        assert_eq!(bad.confidence, 0.0);
        assert!(bad.text.is_empty());
        assert_eq!(content.pages.len(), 3);
    }
}
