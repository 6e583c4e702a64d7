//! Opened-document capability types
//!
//! The decoder behind a document is hidden behind three small traits so the
//! loader and renderer can run against MuPDF or a test double alike.

use super::surface::PageSurface;

/// Intrinsic page size in PDF points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Errors raised while fetching or rasterizing a single page
#[derive(Debug, thiserror::Error)]
pub enum PageFault {
    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("page {page} could not be loaded: {detail}")]
    Load { page: usize, detail: String },

    #[error("page {page} could not be rasterized: {detail}")]
    Raster { page: usize, detail: String },

    #[error("{detail}")]
    Generic { detail: String },
}

impl PageFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Error returned by a [`Decoder`] that cannot parse the given bytes
#[derive(Debug, thiserror::Error)]
#[error("{detail}")]
pub struct DecodeError {
    pub detail: String,
}

impl DecodeError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// One page of an opened document
pub trait PdfPage {
    /// Intrinsic size in PDF points
    fn size(&self) -> Result<PageSize, PageFault>;

    /// Rasterize the page into `surface`, whose pixel size already reflects `scale`
    fn render_into(&self, surface: &mut PageSurface, scale: f32) -> Result<(), PageFault>;
}

/// The parsed document a [`DocumentHandle`] owns
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Load a page by 1-based number
    fn page(&self, page_number: usize) -> Result<Box<dyn PdfPage + '_>, PageFault>;
}

/// Turns fetched bytes into a [`PageSource`]
///
/// Decoders are moved into the viewer's worker thread, the documents they
/// produce never leave it.
pub trait Decoder: Send {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn PageSource>, DecodeError>;
}

/// Opaque reference to a successfully opened document
///
/// Owns the decoder resources; dropping the handle (or calling
/// [`DocumentHandle::destroy`]) releases them.
pub struct DocumentHandle {
    source: Box<dyn PageSource>,
    origin: String,
}

impl DocumentHandle {
    #[must_use]
    pub fn new(source: Box<dyn PageSource>, origin: impl Into<String>) -> Self {
        Self {
            source,
            origin: origin.into(),
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.source.page_count()
    }

    /// URL the document was loaded from
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Load a page by 1-based number
    pub fn page(&self, page_number: usize) -> Result<Box<dyn PdfPage + '_>, PageFault> {
        if page_number == 0 || page_number > self.page_count() {
            return Err(PageFault::Load {
                page: page_number,
                detail: format!("out of range 1..={}", self.page_count()),
            });
        }
        self.source.page(page_number)
    }

    /// Release the decoder resources
    pub fn destroy(self) {
        log::debug!("releasing document handle for {}", self.origin);
    }
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("origin", &self.origin)
            .field("page_count", &self.page_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeDecoder;

    #[test]
    fn test_handle_rejects_out_of_range_pages() {
        let source = FakeDecoder::default()
            .open(FakeDecoder::document_bytes(2, &[]))
            .unwrap();
        let handle = DocumentHandle::new(source, "mem://two");

        assert_eq!(handle.page_count(), 2);
        assert!(handle.page(1).is_ok());
        assert!(handle.page(2).is_ok());
        assert!(matches!(handle.page(0), Err(PageFault::Load { page: 0, .. })));
        assert!(matches!(handle.page(3), Err(PageFault::Load { page: 3, .. })));
    }
}
