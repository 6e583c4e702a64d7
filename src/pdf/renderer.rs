//! Page renderer: rasterizes every page of a document, in order, into a
//! destination

use super::document::{DocumentHandle, PageFault};
use super::surface::{
    Destination, DestinationError, PageSurface, PageViewport, RenderedPage, WatermarkOverlay,
    WatermarkStyle,
};
use super::watermark::WatermarkPainter;
use super::zoom::RenderScale;

/// Progress callbacks for the hosting page
pub trait RenderObserver {
    fn on_loading_change(&mut self, loading: bool);
    fn on_error(&mut self, message: Option<String>);
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl RenderObserver for NullObserver {
    fn on_loading_change(&mut self, _loading: bool) {}
    fn on_error(&mut self, _message: Option<String>) {}
}

/// Outcome of one render pass
#[derive(Clone, Debug, PartialEq)]
pub struct PassSummary {
    pub scale: RenderScale,
    pub page_count: usize,
    /// Pages appended to the destination
    pub rendered: usize,
    /// Pages that failed to rasterize, ascending
    pub failed_pages: Vec<usize>,
    /// The destination went away before the pass finished
    pub stopped_early: bool,
    /// Structural failure reported through `on_error`
    pub error: Option<String>,
}

impl PassSummary {
    fn new(scale: RenderScale, page_count: usize) -> Self {
        Self {
            scale,
            page_count,
            rendered: 0,
            failed_pages: Vec::new(),
            stopped_early: false,
            error: None,
        }
    }

    /// Every page made it into the destination
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.stopped_early && self.rendered == self.page_count
    }
}

/// Rasterizes documents page by page with a watermark over each page
#[derive(Clone, Debug, Default)]
pub struct PageRenderer {
    watermark: WatermarkStyle,
    painter: WatermarkPainter,
}

impl PageRenderer {
    #[must_use]
    pub fn new(watermark: WatermarkStyle) -> Self {
        Self {
            watermark,
            painter: WatermarkPainter::new(),
        }
    }

    #[must_use]
    pub fn watermark(&self) -> &WatermarkStyle {
        &self.watermark
    }

    /// Wipe `destination` and rebuild it with every page at `scale`
    ///
    /// Pages are rendered sequentially in ascending order. A page that fails
    /// is logged and skipped. If the destination stops being live the pass
    /// ends quietly. `on_loading_change(false)` is always the last callback.
    pub fn render_all(
        &self,
        handle: &DocumentHandle,
        scale: RenderScale,
        destination: &mut dyn Destination,
        observer: &mut dyn RenderObserver,
    ) -> PassSummary {
        let page_count = handle.page_count();
        let mut summary = PassSummary::new(scale, page_count);

        observer.on_loading_change(true);
        log::debug!("render pass start: {page_count} pages at {scale}");

        if let Err(e) = self.prepare(destination) {
            let message = format!("Unable to render document: {e}");
            log::warn!("{message}");
            observer.on_error(Some(message.clone()));
            summary.error = Some(message);
            observer.on_loading_change(false);
            return summary;
        }

        for page_number in 1..=page_count {
            if !destination.is_live() {
                log::debug!("destination gone before page {page_number}, stopping pass");
                summary.stopped_early = true;
                break;
            }

            let page = match self.render_page(handle, page_number, scale) {
                Ok(page) => page,
                Err(fault) => {
                    log::warn!("page {page_number} failed to render: {fault}");
                    summary.failed_pages.push(page_number);
                    continue;
                }
            };

            if !destination.is_live() {
                log::debug!("destination gone after page {page_number}, stopping pass");
                summary.stopped_early = true;
                break;
            }

            match destination.append(page) {
                Ok(()) => summary.rendered += 1,
                Err(DestinationError::Gone) => {
                    log::debug!("destination gone while appending page {page_number}");
                    summary.stopped_early = true;
                    break;
                }
                Err(e) => {
                    log::warn!("page {page_number} could not be stored: {e}");
                    summary.failed_pages.push(page_number);
                }
            }
        }

        log::debug!(
            "render pass done: {}/{} pages, {} failed{}",
            summary.rendered,
            page_count,
            summary.failed_pages.len(),
            if summary.stopped_early { ", stopped early" } else { "" }
        );
        observer.on_loading_change(false);
        summary
    }

    fn prepare(&self, destination: &mut dyn Destination) -> Result<(), DestinationError> {
        if !destination.is_live() {
            return Err(DestinationError::Gone);
        }
        destination.clear()
    }

    /// Render one page into a fresh surface with its watermark burned in
    pub fn render_page(
        &self,
        handle: &DocumentHandle,
        page_number: usize,
        scale: RenderScale,
    ) -> Result<RenderedPage, PageFault> {
        let page = handle.page(page_number)?;
        let size = page.size()?;
        let viewport = PageViewport::for_page(size, scale);

        let mut surface = PageSurface::new(page_number, viewport);
        page.render_into(&mut surface, scale.get())?;

        let watermark = WatermarkOverlay::for_surface(&self.watermark, &surface, scale);
        if !self.painter.paint(&watermark, &mut surface) {
            log::trace!("page {page_number}: watermark left nothing on the surface");
        }
        Ok(RenderedPage {
            surface,
            watermark,
            scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::document::Decoder;
    use crate::pdf::surface::SurfaceStack;
    use crate::test_utils::{FakeDecoder, RecordingObserver};

    fn handle(pages: usize, broken: &[usize]) -> DocumentHandle {
        let source = FakeDecoder::default()
            .open(FakeDecoder::document_bytes(pages, broken))
            .unwrap();
        DocumentHandle::new(source, "mem://doc")
    }

    #[test]
    fn test_renders_pages_in_order_for_every_scale() {
        let renderer = PageRenderer::default();
        let doc = handle(5, &[]);

        for scale in [0.5, 0.8, 1.0, 1.75, 3.0, 5.0] {
            let mut stack = SurfaceStack::default();
            let mut observer = RecordingObserver::default();
            let summary =
                renderer.render_all(&doc, RenderScale::new(scale), &mut stack, &mut observer);

            assert!(summary.is_complete());
            assert_eq!(stack.page_numbers(), vec![1, 2, 3, 4, 5]);
            assert_eq!(observer.loading, vec![true, false]);
            assert!(observer.errors.is_empty());
        }
    }

    #[test]
    fn test_surfaces_are_sized_by_scale() {
        let renderer = PageRenderer::default();
        let doc = handle(1, &[]);
        let mut stack = SurfaceStack::default();

        let _ = renderer.render_all(&doc, RenderScale::new(2.0), &mut stack, &mut NullObserver);

        let page = &stack.pages()[0];
        assert_eq!(page.surface.width_px(), FakeDecoder::PAGE_WIDTH as u32 * 2);
        assert_eq!(page.surface.height_px(), FakeDecoder::PAGE_HEIGHT as u32 * 2);
        assert_eq!(page.watermark.font_px, WatermarkStyle::default().font_px * 2.0);
    }

    #[test]
    fn test_watermark_is_burned_into_page_pixels() {
        let doc = handle(1, &[]);
        let scale = RenderScale::new(1.0);
        let plain = PageRenderer::new(WatermarkStyle {
            text: String::new(),
            opacity: 0.0,
            ..WatermarkStyle::default()
        });
        let marked = PageRenderer::default();

        let without = plain.render_page(&doc, 1, scale).unwrap();
        let with = marked.render_page(&doc, 1, scale).unwrap();

        assert_eq!(without.surface.width_px(), with.surface.width_px());
        assert_ne!(without.surface.pixels(), with.surface.pixels());
    }

    #[test]
    fn test_rerender_replaces_previous_pass() {
        let renderer = PageRenderer::default();
        let doc = handle(3, &[]);
        let mut stack = SurfaceStack::default();

        let _ = renderer.render_all(&doc, RenderScale::new(1.0), &mut stack, &mut NullObserver);
        let _ = renderer.render_all(&doc, RenderScale::new(1.75), &mut stack, &mut NullObserver);

        assert_eq!(stack.len(), 3);
        assert!(
            stack
                .pages()
                .iter()
                .all(|p| p.scale == RenderScale::new(1.75))
        );
    }

    #[test]
    fn test_failing_page_is_skipped_without_document_error() {
        let renderer = PageRenderer::default();
        let doc = handle(4, &[2]);
        let mut stack = SurfaceStack::default();
        let mut observer = RecordingObserver::default();

        let summary = renderer.render_all(&doc, RenderScale::new(1.0), &mut stack, &mut observer);

        assert_eq!(stack.page_numbers(), vec![1, 3, 4]);
        assert_eq!(summary.failed_pages, vec![2]);
        assert!(summary.error.is_none());
        assert!(observer.errors.is_empty());
        assert_eq!(observer.loading.last(), Some(&false));
    }

    #[test]
    fn test_missing_destination_surfaces_error() {
        let renderer = PageRenderer::default();
        let doc = handle(2, &[]);
        let mut stack = SurfaceStack::default();
        stack.detach();
        let mut observer = RecordingObserver::default();

        let summary = renderer.render_all(&doc, RenderScale::new(1.0), &mut stack, &mut observer);

        assert!(summary.error.is_some());
        assert_eq!(observer.errors.len(), 1);
        assert!(observer.errors[0].is_some());
        assert_eq!(observer.loading, vec![true, false]);
    }

    /// Destination that disappears after accepting a fixed number of pages
    struct ClosingDestination {
        inner: SurfaceStack,
        accept: usize,
    }

    impl Destination for ClosingDestination {
        fn is_live(&self) -> bool {
            self.inner.is_live()
        }

        fn clear(&mut self) -> Result<(), DestinationError> {
            self.inner.clear()
        }

        fn append(&mut self, page: RenderedPage) -> Result<(), DestinationError> {
            self.inner.append(page)?;
            if self.inner.len() == self.accept {
                self.inner.detach();
            }
            Ok(())
        }
    }

    #[test]
    fn test_stops_quietly_when_destination_closes_mid_pass() {
        let renderer = PageRenderer::default();
        let doc = handle(6, &[]);
        let mut dest = ClosingDestination {
            inner: SurfaceStack::default(),
            accept: 2,
        };
        let mut observer = RecordingObserver::default();

        let summary = renderer.render_all(&doc, RenderScale::new(1.0), &mut dest, &mut observer);

        assert!(summary.stopped_early);
        assert_eq!(summary.rendered, 2);
        assert!(summary.error.is_none());
        assert!(observer.errors.is_empty());
        assert_eq!(observer.loading, vec![true, false]);
    }

    #[test]
    fn test_empty_document_renders_nothing() {
        let renderer = PageRenderer::default();
        let doc = handle(0, &[]);
        let mut stack = SurfaceStack::default();

        let summary = renderer.render_all(&doc, RenderScale::new(1.0), &mut stack, &mut NullObserver);

        assert!(summary.is_complete());
        assert!(stack.is_empty());
        assert_eq!(stack.generation(), 1);
    }
}
