use crate::error::IngestError;
use crate::models::RawDocument;
use lopdf::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    /// Plain text of every page, in page order.
    fn extract_pages(&self, document: &RawDocument) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, document: &RawDocument) -> Result<Vec<PageText>, IngestError> {
        let parse_error = |details: String| IngestError::PdfParse {
            document: document.name.clone(),
            details,
        };

        let parsed = Document::load_mem(&document.bytes).map_err(|error| parse_error(error.to_string()))?;

        // get_pages is keyed by page number, so iteration is already in page order
        let mut pages = Vec::new();
        for (page_no, _page_id) in parsed.get_pages() {
            let text = parsed
                .extract_text(&[page_no])
                .map_err(|error| parse_error(format!("page {page_no}: {error}")))?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}
