use crate::error::IngestError;
use lopdf::Document;
use tracing::warn;

/// Content types accepted for uploads. Browsers and HTTP clients commonly
/// send PDFs as a generic binary stream.
pub const PDF_CONTENT_TYPES: [&str; 3] = [
    "application/pdf",
    "application/x-pdf",
    "application/octet-stream",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based position of the page in the document.
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    /// Every page of the document in order, including pages without text.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (position, (page_no, _page_id)) in document.get_pages().into_iter().enumerate() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(page = page_no, %error, "page text extraction failed, treating page as empty");
                    String::new()
                }
            };

            pages.push(PageText {
                number: position as u32 + 1,
                text: text.trim().to_string(),
            });
        }

        Ok(pages)
    }
}

/// Accepts PDF content types, ignoring case and parameters such as `charset`.
pub fn ensure_pdf_content_type(content_type: &str) -> Result<(), IngestError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if PDF_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(IngestError::UnsupportedContentType(content_type.to_string()))
    }
}
