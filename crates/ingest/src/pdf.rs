use crate::error::ExtractError;
use lopdf::{Dictionary, Object};

/// One parsed PDF page: whatever the text layer yielded, plus the raw
/// bytes of any JPEG image XObjects on the page for the OCR fallback.
#[derive(Debug)]
pub struct PdfPage {
    pub number: u32,
    pub text: String,
    pub images: Vec<Vec<u8>>,
}

/// Parse a PDF from memory into ordered pages. Text comes from the
/// native text layer; images are collected so the caller can route
/// sparse pages to OCR without a second parse.
pub fn parse_pdf(bytes: &[u8]) -> Result<Vec<PdfPage>, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ExtractError::CorruptDocument(format!("PDF parse failed: {e}")))?;

    let mut pages = Vec::new();
    for (number, page_id) in doc.get_pages() {
        // extract_text fails on pages with broken content streams;
        // treat that as an empty text layer, not a corrupt document.
        let text = doc.extract_text(&[number]).unwrap_or_default();
        let images = page_image_streams(&doc, page_id);
        pages.push(PdfPage {
            number,
            text,
            images,
        });
    }

    if pages.is_empty() {
        return Err(ExtractError::CorruptDocument(
            "PDF contains no pages".to_string(),
        ));
    }
    Ok(pages)
}

/// Collect the DCTDecode (JPEG) image streams referenced by a page's
/// XObject resources. Other encodings are raw bitmaps the OCR backend
/// cannot read from a byte stream, so they are skipped.
fn page_image_streams(doc: &lopdf::Document, page_id: (u32, u16)) -> Vec<Vec<u8>> {
    let mut images = Vec::new();

    let (inline, referenced) = doc.get_page_resources(page_id);
    let mut resource_dicts: Vec<&Dictionary> = Vec::new();
    if let Some(dict) = inline {
        resource_dicts.push(dict);
    }
    for object_id in referenced {
        if let Ok(dict) = doc.get_object(object_id).and_then(Object::as_dict) {
            resource_dicts.push(dict);
        }
    }

    for resources in resource_dicts {
        let Ok(xobjects) = resources
            .get(b"XObject")
            .and_then(|obj| resolve_dict(doc, obj))
        else {
            continue;
        };

        for (_name, entry) in xobjects.iter() {
            let stream = match entry {
                Object::Reference(id) => match doc.get_object(*id).and_then(Object::as_stream) {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                Object::Stream(s) => s,
                _ => continue,
            };

            let is_image = stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|n| n == b"Image")
                .unwrap_or(false);
            let is_jpeg = matches!(
                stream.dict.get(b"Filter"),
                Ok(Object::Name(name)) if name.as_slice() == b"DCTDecode"
            );

            if is_image && is_jpeg {
                images.push(stream.content.clone());
            }
        }
    }

    images
}

fn resolve_dict<'a>(
    doc: &'a lopdf::Document,
    obj: &'a Object,
) -> Result<&'a Dictionary, lopdf::Error> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).and_then(Object::as_dict),
        other => other.as_dict(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_corrupt() {
        let err = parse_pdf(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::CorruptDocument(_)));
    }
}
