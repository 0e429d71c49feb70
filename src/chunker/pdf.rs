//! PDF page splitting with lopdf.

use lopdf::Document;

use super::{DocumentSplitter, PageRange, PageSource, WholeDocument};
use crate::error::ExtractError;
use crate::models::DocumentFormat;

/// Splits PDFs by deleting out-of-range pages from a copy of the document.
#[derive(Debug, Default, Clone)]
pub struct LopdfSplitter;

impl LopdfSplitter {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentSplitter for LopdfSplitter {
    fn open(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<Box<dyn PageSource>, ExtractError> {
        if !format.is_splittable() {
            return Ok(Box::new(WholeDocument::new(bytes)));
        }

        let document = Document::load_mem(bytes)
            .map_err(|e| ExtractError::UnreadableDocument(format!("invalid PDF: {}", e)))?;
        let page_count = document.get_pages().len() as u32;
        if page_count == 0 {
            return Err(ExtractError::UnreadableDocument(
                "PDF has no pages".to_string(),
            ));
        }
        Ok(Box::new(PdfPages {
            document,
            page_count,
        }))
    }
}

struct PdfPages {
    document: Document,
    page_count: u32,
}

impl PageSource for PdfPages {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn extract_pages(&self, range: PageRange) -> Result<Vec<u8>, ExtractError> {
        if range.is_empty() || range.end > self.page_count {
            return Err(ExtractError::UnreadableDocument(format!(
                "page range {} outside document of {} pages",
                range.label(),
                self.page_count
            )));
        }

        // lopdf page numbers are 1-based.
        let drop: Vec<u32> = (1..=self.page_count)
            .filter(|n| *n <= range.start || *n > range.end)
            .collect();

        let mut doc = self.document.clone();
        doc.delete_pages(&drop);
        doc.prune_objects();

        let mut out = Vec::new();
        doc.save_to(&mut out).map_err(|e| {
            ExtractError::UnreadableDocument(format!(
                "failed to write {}: {}",
                range.label(),
                e
            ))
        })?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    fn build_pdf(pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        for i in 0..pages {
            let content = Stream::new(dictionary! {}, format!("% page {}", i + 1).into_bytes());
            let content_id = doc.add_object(content);
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_open_counts_pages() {
        let bytes = build_pdf(5);
        let source = LopdfSplitter::new()
            .open(&bytes, DocumentFormat::Pdf)
            .unwrap();
        assert_eq!(source.page_count(), 5);
    }

    #[test]
    fn test_extract_pages_keeps_only_range() {
        let bytes = build_pdf(6);
        let source = LopdfSplitter::new()
            .open(&bytes, DocumentFormat::Pdf)
            .unwrap();
        let extract = source.extract_pages(PageRange::new(2, 5)).unwrap();
        let reloaded = Document::load_mem(&extract).unwrap();
        assert_eq!(reloaded.get_pages().len(), 3);
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let result = LopdfSplitter::new().open(b"%PDF-1.4 garbage", DocumentFormat::Pdf);
        assert!(matches!(result, Err(ExtractError::UnreadableDocument(_))));
    }

    #[test]
    fn test_images_are_single_page() {
        let source = LopdfSplitter::new()
            .open(b"\x89PNG....", DocumentFormat::Png)
            .unwrap();
        assert_eq!(source.page_count(), 1);
    }
}
