use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Result, SignError};

/// Fallback when a page carries no resolvable MediaBox (A4 portrait).
const DEFAULT_PAGE_SIZE: (f64, f64) = (595.0, 842.0);

/// Mutable in-memory document handle. One handle per source byte buffer:
/// load, mutate through the compositor, serialize once.
pub struct PdfDocument {
    inner: Document,
}

impl PdfDocument {
    /// Parse a byte buffer into a document. The buffer is content-sniffed
    /// first so arbitrary non-PDF input fails before the parser sees it.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(SignError::Parse("empty_input".into()));
        }
        if !is_pdf(bytes) {
            return Err(SignError::Parse("not_a_pdf".into()));
        }
        let inner =
            Document::load_mem(bytes).map_err(|e| SignError::Parse(e.to_string()))?;
        log::debug!("loaded pdf, {} pages", inner.get_pages().len());
        Ok(Self { inner })
    }

    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    /// Object id of the page at `index` (0-based).
    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        let pages = self.inner.get_pages();
        let page_count = pages.len();
        pages
            .into_iter()
            .nth(index)
            .map(|(_, id)| id)
            .ok_or(SignError::PageIndex { index, page_count })
    }

    /// Width and height of the page at `index`, in PDF points.
    pub fn page_size(&self, index: usize) -> Result<(f64, f64)> {
        let id = self.page_id(index)?;
        self.page_size_of(id)
    }

    /// MediaBox resolution with Parent inheritance, the way viewers do it.
    pub(crate) fn page_size_of(&self, page_id: ObjectId) -> Result<(f64, f64)> {
        let mut current = Some(page_id);
        while let Some(id) = current {
            let dict = self
                .inner
                .get_object(id)
                .and_then(|o| o.as_dict())
                .map_err(|_| SignError::Parse("page_missing_dict".into()))?;
            if let Some(size) = media_box(&self.inner, dict) {
                return Ok(size);
            }
            current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
        }
        // Some generators omit MediaBox entirely; assume A4 rather than
        // failing the whole document.
        log::warn!("page {page_id:?} has no resolvable MediaBox, assuming A4");
        Ok(DEFAULT_PAGE_SIZE)
    }

    /// Swap the page at `index` for a fresh blank page of the given size,
    /// in the same slot of its parent's Kids array. Page order and count
    /// are unchanged; returns the new page's id.
    pub fn replace_page(&mut self, index: usize, width: f64, height: f64) -> Result<ObjectId> {
        let old_id = self.page_id(index)?;
        let parent_id = self
            .inner
            .get_object(old_id)
            .and_then(|o| o.as_dict())
            .and_then(|d| d.get(b"Parent"))
            .and_then(|p| p.as_reference())
            .map_err(|_| SignError::Parse("page_missing_parent".into()))?;
        let new_id = self.add_blank_page_object(parent_id, width, height);
        let kids = self
            .inner
            .get_object_mut(parent_id)
            .and_then(|o| o.as_dict_mut())
            .and_then(|d| d.get_mut(b"Kids"))
            .and_then(|k| k.as_array_mut())
            .map_err(|_| SignError::Parse("pages_missing_kids".into()))?;
        let slot = kids
            .iter_mut()
            .find(|kid| kid.as_reference().map(|r| r == old_id).unwrap_or(false))
            .ok_or_else(|| SignError::Parse("page_not_in_parent_kids".into()))?;
        *slot = Object::Reference(new_id);
        log::debug!("replaced page {index} ({old_id:?} -> {new_id:?})");
        Ok(new_id)
    }

    /// Append a blank page at the end of the document. The appended slot is
    /// the end of the page tree, never a previously vacated position;
    /// callers wanting "first page" semantics must target index 0 instead.
    pub fn append_blank_page(&mut self, width: f64, height: f64) -> Result<ObjectId> {
        let root_id = self.pages_root()?;
        let new_id = self.add_blank_page_object(root_id, width, height);
        let pages = self
            .inner
            .get_object_mut(root_id)
            .and_then(|o| o.as_dict_mut())
            .map_err(|_| SignError::Parse("missing_pages_dict".into()))?;
        let kids = pages
            .get_mut(b"Kids")
            .and_then(|k| k.as_array_mut())
            .map_err(|_| SignError::Parse("pages_missing_kids".into()))?;
        kids.push(Object::Reference(new_id));
        let count = pages.get(b"Count").and_then(|c| c.as_i64()).unwrap_or(0);
        pages.set("Count", count + 1);
        Ok(new_id)
    }

    /// Serialize the current document state. Called once, after all
    /// mutations are done.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.inner
            .save_to(&mut out)
            .map_err(|e| SignError::Serialize(e.to_string()))?;
        log::debug!("serialized pdf, {} bytes", out.len());
        Ok(out)
    }

    /// Blank page with an empty content stream, not yet linked into any
    /// Kids array.
    fn add_blank_page_object(&mut self, parent: ObjectId, width: f64, height: f64) -> ObjectId {
        let content_id = self.inner.add_object(Stream::new(dictionary! {}, Vec::new()));
        self.inner.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => parent,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(width as f32),
                Object::Real(height as f32),
            ],
            "Resources" => dictionary! {},
            "Contents" => content_id,
        })
    }

    fn pages_root(&self) -> Result<ObjectId> {
        self.inner
            .catalog()
            .and_then(|c| c.get(b"Pages"))
            .and_then(|o| o.as_reference())
            .map_err(|_| SignError::Parse("missing_pages_root".into()))
    }

    pub(crate) fn inner(&self) -> &Document {
        &self.inner
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Document {
        &mut self.inner
    }
}

fn is_pdf(bytes: &[u8]) -> bool {
    infer::get(bytes)
        .map(|kind| kind.mime_type() == "application/pdf")
        .unwrap_or(false)
}

fn media_box(doc: &Document, dict: &lopdf::Dictionary) -> Option<(f64, f64)> {
    let raw = dict.get(b"MediaBox").ok()?;
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        direct => direct,
    };
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut edges = [0.0f64; 4];
    for (slot, obj) in edges.iter_mut().zip(arr) {
        *slot = match obj {
            Object::Integer(i) => *i as f64,
            Object::Real(f) => f64::from(*f),
            _ => return None,
        };
    }
    Some((edges[2] - edges[0], edges[3] - edges[1]))
}


#[cfg(test)]
mod tests {
    use super::testpdf::sample_pdf_bytes;
    use super::PdfDocument;
    use crate::error::SignError;

    #[test]
    fn load_rejects_empty_and_non_pdf_input() {
        assert!(matches!(
            PdfDocument::load(&[]),
            Err(SignError::Parse(_))
        ));
        assert!(matches!(
            PdfDocument::load(b"just some text, no document here"),
            Err(SignError::Parse(_))
        ));
    }

    #[test]
    fn page_access_out_of_range_reports_index_and_count() {
        let doc = PdfDocument::load(&sample_pdf_bytes(2, 612.0, 792.0)).unwrap();
        match doc.page_size(5) {
            Err(SignError::PageIndex { index, page_count }) => {
                assert_eq!(index, 5);
                assert_eq!(page_count, 2);
            }
            other => panic!("expected PageIndex, got {other:?}"),
        }
    }

    #[test]
    fn page_size_inherits_media_box_from_parent() {
        let doc = PdfDocument::load(&sample_pdf_bytes(1, 612.0, 792.0)).unwrap();
        assert_eq!(doc.page_size(0).unwrap(), (612.0, 792.0));
    }

    #[test]
    fn replace_page_keeps_count_and_slot() {
        let mut doc = PdfDocument::load(&sample_pdf_bytes(3, 612.0, 792.0)).unwrap();
        let old_first = doc.page_id(0).unwrap();
        let old_second = doc.page_id(1).unwrap();
        let new_id = doc.replace_page(0, 200.0, 100.0).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.page_id(0).unwrap(), new_id);
        assert_ne!(doc.page_id(0).unwrap(), old_first);
        assert_eq!(doc.page_id(1).unwrap(), old_second);
        assert_eq!(doc.page_size(0).unwrap(), (200.0, 100.0));
    }

    #[test]
    fn append_blank_page_lands_at_the_end() {
        let mut doc = PdfDocument::load(&sample_pdf_bytes(2, 612.0, 792.0)).unwrap();
        let appended = doc.append_blank_page(300.0, 400.0).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.page_id(2).unwrap(), appended);
        assert_eq!(doc.page_size(2).unwrap(), (300.0, 400.0));
    }

    #[test]
    fn save_and_reload_preserves_structure() {
        let mut doc = PdfDocument::load(&sample_pdf_bytes(2, 612.0, 792.0)).unwrap();
        let bytes = doc.save_to_bytes().unwrap();
        let reloaded = PdfDocument::load(&bytes).unwrap();
        assert_eq!(reloaded.page_count(), 2);
        assert_eq!(reloaded.page_size(0).unwrap(), (612.0, 792.0));
    }
}
