//! MuPDF-backed decoder

#![cfg(feature = "pdf")]

use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::document::{DecodeError, Decoder, PageFault, PageSize, PageSource, PdfPage};
use super::surface::PageSurface;

const PDF_MIME: &str = "application/pdf";

/// Opens documents from memory with MuPDF
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfDecoder;

impl Decoder for MupdfDecoder {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn PageSource>, DecodeError> {
        let doc =
            Document::from_bytes(&bytes, PDF_MIME).map_err(|e| DecodeError::new(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| DecodeError::new(e.to_string()))?;
        let page_count = usize::try_from(page_count).unwrap_or(0);

        Ok(Box::new(MupdfDocument { doc, page_count }))
    }
}

struct MupdfDocument {
    doc: Document,
    page_count: usize,
}

impl PageSource for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page(&self, page_number: usize) -> Result<Box<dyn PdfPage + '_>, PageFault> {
        let index = i32::try_from(page_number - 1)
            .map_err(|_| PageFault::generic(format!("page {page_number} out of range")))?;
        let page = self.doc.load_page(index)?;
        Ok(Box::new(MupdfPage { page, page_number }))
    }
}

struct MupdfPage {
    page: mupdf::Page,
    page_number: usize,
}

impl PdfPage for MupdfPage {
    fn size(&self) -> Result<PageSize, PageFault> {
        let bounds = self.page.bounds()?;
        Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }

    fn render_into(&self, surface: &mut PageSurface, scale: f32) -> Result<(), PageFault> {
        let rgb = Colorspace::device_rgb();
        let pixmap = self
            .page
            .to_pixmap(&Matrix::new_scale(scale, scale), &rgb, false, false)?;
        blit_rgb(&pixmap, surface).map_err(|detail| PageFault::Raster {
            page: self.page_number,
            detail,
        })
    }
}

/// Copy pixmap samples into the surface, cropping to the smaller of the two
fn blit_rgb(pixmap: &Pixmap, surface: &mut PageSurface) -> Result<(), String> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(format!("Unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    if samples.len() < stride.saturating_mul(height) || width * n > stride {
        return Err("Pixmap buffer size mismatch".to_string());
    }

    let target = surface.pixels_mut();
    let copy_w = width.min(target.width() as usize);
    let copy_h = height.min(target.height() as usize);
    let target_w = target.width() as usize;
    let buf: &mut [u8] = target;

    for y in 0..copy_h {
        let src = &samples[y * stride..y * stride + copy_w * n];
        let dst = &mut buf[y * target_w * 3..(y * target_w + copy_w) * 3];
        if n == 3 {
            dst.copy_from_slice(src);
        } else {
            for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(n)) {
                d.copy_from_slice(&s[..3]);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One 200x100 page; MuPDF rebuilds the missing xref table
    const ONE_PAGE: &str = "%PDF-1.4
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj
3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] >> endobj
trailer << /Root 1 0 R >>
%%EOF
";

    #[test]
    fn test_opens_pdf_bytes_from_memory() {
        let source = MupdfDecoder.open(ONE_PAGE.as_bytes().to_vec()).unwrap();
        assert_eq!(source.page_count(), 1);

        let page = source.page(1).unwrap();
        assert_eq!(page.size().unwrap(), PageSize::new(200.0, 100.0));
    }

    #[test]
    fn test_renders_blank_page_white() {
        let source = MupdfDecoder.open(ONE_PAGE.as_bytes().to_vec()).unwrap();
        let page = source.page(1).unwrap();
        let mut surface = PageSurface::new(
            1,
            crate::pdf::surface::PageViewport {
                width_px: 100,
                height_px: 50,
            },
        );

        page.render_into(&mut surface, 0.5).unwrap();
        assert!(surface.pixels().pixels().all(|p| p.0 == [0xFF, 0xFF, 0xFF]));
    }
}
