use crate::error::IngestError;
use lopdf::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    /// Text of every page, in page order. Pages without text are kept with an
    /// empty string so page numbering stays intact.
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load_mem(pdf).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(format!("page {page_no}: {error}")))?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Joins page texts in order, each page terminated by a newline.
pub fn join_pages(pages: &[PageText]) -> String {
    let mut joined = String::new();
    for page in pages {
        joined.push_str(&page.text);
        joined.push('\n');
    }
    joined
}

pub fn extract_document_text(
    extractor: &dyn PdfExtractor,
    pdf: &[u8],
) -> Result<(String, usize), IngestError> {
    let pages = extractor.extract_pages(pdf)?;
    let text = join_pages(&pages);

    if text.trim().is_empty() {
        return Err(IngestError::NoTextExtracted);
    }

    Ok((text, pages.len()))
}
