//! Render targets: per-page surfaces, their watermark layer, and the
//! ordered destinations render passes write into

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::document::PageSize;
use super::zoom::RenderScale;

/// Background colour of a fresh surface before the page is drawn on it
const PAPER: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);

/// Pixel dimensions of one page at one scale
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageViewport {
    pub width_px: u32,
    pub height_px: u32,
}

impl PageViewport {
    /// Scale the page's intrinsic size; degenerate sizes still get one pixel
    #[must_use]
    pub fn for_page(size: PageSize, scale: RenderScale) -> Self {
        let s = scale.get();
        Self {
            width_px: (size.width * s).round().max(1.0) as u32,
            height_px: (size.height * s).round().max(1.0) as u32,
        }
    }
}

/// One rendering target (canvas equivalent) for one page
pub struct PageSurface {
    page_number: usize,
    pixels: RgbImage,
}

impl PageSurface {
    /// Allocate a blank surface sized to `viewport`
    #[must_use]
    pub fn new(page_number: usize, viewport: PageViewport) -> Self {
        Self {
            page_number,
            pixels: RgbImage::from_pixel(viewport.width_px, viewport.height_px, PAPER),
        }
    }

    /// 1-based page number
    #[must_use]
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    #[must_use]
    pub fn width_px(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height_px(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }
}

impl std::fmt::Debug for PageSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSurface")
            .field("page_number", &self.page_number)
            .field("width_px", &self.width_px())
            .field("height_px", &self.height_px())
            .finish_non_exhaustive()
    }
}

/// Fixed watermark look, taken from settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkStyle {
    pub text: String,
    pub angle_deg: f32,
    pub opacity: f32,
    /// Font size at scale 1.0
    pub font_px: f32,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            text: "CONFIDENTIAL - DO NOT DISTRIBUTE".to_string(),
            angle_deg: -45.0,
            opacity: 0.1,
            font_px: 48.0,
        }
    }
}

/// Non-interactive layer drawn centred over one page surface
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WatermarkOverlay {
    pub text: String,
    pub angle_deg: f32,
    pub opacity: f32,
    pub font_px: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub interactive: bool,
}

impl WatermarkOverlay {
    /// Size the watermark for a surface rendered at `scale`
    #[must_use]
    pub fn for_surface(style: &WatermarkStyle, surface: &PageSurface, scale: RenderScale) -> Self {
        Self {
            text: style.text.clone(),
            angle_deg: style.angle_deg,
            opacity: style.opacity.clamp(0.0, 1.0),
            font_px: style.font_px * scale.get(),
            center_x: surface.width_px() as f32 / 2.0,
            center_y: surface.height_px() as f32 / 2.0,
            interactive: false,
        }
    }
}

/// A surface and its watermark, as appended to a destination
#[derive(Debug)]
pub struct RenderedPage {
    pub surface: PageSurface,
    pub watermark: WatermarkOverlay,
    pub scale: RenderScale,
}

impl RenderedPage {
    #[must_use]
    pub fn page_number(&self) -> usize {
        self.surface.page_number()
    }
}

/// Errors raised by a destination
#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    #[error("render destination is no longer available")]
    Gone,

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding: {0}")]
    Image(#[from] image::ImageError),

    #[error("manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Ordered sink for rendered pages
///
/// A render pass calls [`Destination::clear`] once and then appends pages in
/// ascending page order.
pub trait Destination {
    /// Whether the destination can still accept pages
    fn is_live(&self) -> bool;

    /// Drop every page from the previous pass
    fn clear(&mut self) -> Result<(), DestinationError>;

    fn append(&mut self, page: RenderedPage) -> Result<(), DestinationError>;
}

/// In-memory destination holding the current pass's pages
#[derive(Debug)]
pub struct SurfaceStack {
    pages: Vec<RenderedPage>,
    live: bool,
    generation: u64,
    session: u64,
}

impl Default for SurfaceStack {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            live: true,
            generation: 0,
            session: 0,
        }
    }
}

impl SurfaceStack {
    #[must_use]
    pub fn pages(&self) -> &[RenderedPage] {
        &self.pages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of times the stack has been wiped
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Page numbers in stored order
    #[must_use]
    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.iter().map(RenderedPage::page_number).collect()
    }

    /// Current viewer session; bumped on every [`SurfaceStack::reattach`]
    #[must_use]
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Tear the stack down: release all pages and refuse further appends
    pub fn detach(&mut self) {
        self.pages.clear();
        self.live = false;
    }

    /// Make the stack usable again under a new session
    ///
    /// Passes pinned to an earlier session stay dead.
    pub fn reattach(&mut self) -> u64 {
        self.pages.clear();
        self.live = true;
        self.session += 1;
        self.session
    }
}

impl Destination for SurfaceStack {
    fn is_live(&self) -> bool {
        self.live
    }

    fn clear(&mut self) -> Result<(), DestinationError> {
        if !self.live {
            return Err(DestinationError::Gone);
        }
        self.pages.clear();
        self.generation += 1;
        Ok(())
    }

    fn append(&mut self, page: RenderedPage) -> Result<(), DestinationError> {
        if !self.live {
            return Err(DestinationError::Gone);
        }
        self.pages.push(page);
        Ok(())
    }
}

/// A [`SurfaceStack`] shared between the viewer and its render worker
#[derive(Clone, Debug, Default)]
pub struct SharedSurfaces(Arc<Mutex<SurfaceStack>>);

impl SharedSurfaces {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the stack for reading or mutation
    pub fn lock(&self) -> MutexGuard<'_, SurfaceStack> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Destination that only accepts pages while `session` is current
    #[must_use]
    pub fn pinned(&self, session: u64) -> SessionSurfaces {
        SessionSurfaces {
            shared: self.clone(),
            session,
        }
    }
}

/// View of [`SharedSurfaces`] bound to one viewer session
///
/// Once the stack is detached or reattached for another session this
/// destination is gone for good, so a pass from a closed session can never
/// write into the next one.
#[derive(Clone, Debug)]
pub struct SessionSurfaces {
    shared: SharedSurfaces,
    session: u64,
}

impl SessionSurfaces {
    fn current(&self) -> Result<MutexGuard<'_, SurfaceStack>, DestinationError> {
        let stack = self.shared.lock();
        if stack.session == self.session {
            Ok(stack)
        } else {
            Err(DestinationError::Gone)
        }
    }
}

impl Destination for SessionSurfaces {
    fn is_live(&self) -> bool {
        self.current().is_ok_and(|stack| stack.is_live())
    }

    fn clear(&mut self) -> Result<(), DestinationError> {
        self.current()?.clear()
    }

    fn append(&mut self, page: RenderedPage) -> Result<(), DestinationError> {
        self.current()?.append(page)
    }
}

/// Entry in a [`DirectorySink`] manifest
#[derive(Clone, Debug, Serialize)]
pub struct ManifestEntry {
    pub page_number: usize,
    pub file: String,
    pub width_px: u32,
    pub height_px: u32,
    pub scale: f32,
    pub watermark: WatermarkOverlay,
}

/// Destination that writes each page as a PNG into a directory
///
/// Produces `page-001.png`, `page-002.png`, ... and, on [`DirectorySink::finish`],
/// a `manifest.json` describing pages and their watermark layers.
pub struct DirectorySink {
    dir: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl DirectorySink {
    pub const MANIFEST: &'static str = "manifest.json";

    /// Create the sink, creating `dir` if needed
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, DestinationError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            entries: Vec::new(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// File name used for a page
    #[must_use]
    pub fn page_file_name(page_number: usize) -> String {
        format!("page-{page_number:03}.png")
    }

    fn is_page_file(name: &str) -> bool {
        name.strip_prefix("page-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Write the manifest for the pages appended so far
    pub fn finish(&self) -> Result<PathBuf, DestinationError> {
        let path = self.dir.join(Self::MANIFEST);
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

impl Destination for DirectorySink {
    fn is_live(&self) -> bool {
        self.dir.is_dir()
    }

    fn clear(&mut self) -> Result<(), DestinationError> {
        if !self.is_live() {
            return Err(DestinationError::Gone);
        }

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if Self::is_page_file(name) || name == Self::MANIFEST {
                fs::remove_file(entry.path())?;
            }
        }
        self.entries.clear();
        Ok(())
    }

    fn append(&mut self, page: RenderedPage) -> Result<(), DestinationError> {
        if !self.is_live() {
            return Err(DestinationError::Gone);
        }

        let file = Self::page_file_name(page.page_number());
        page.surface.pixels().save(self.dir.join(&file))?;
        log::debug!("wrote {file}");

        self.entries.push(ManifestEntry {
            page_number: page.page_number(),
            file,
            width_px: page.surface.width_px(),
            height_px: page.surface.height_px(),
            scale: page.scale.get(),
            watermark: page.watermark,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(page: usize, scale: f32) -> RenderedPage {
        let scale = RenderScale::new(scale);
        let surface = PageSurface::new(
            page,
            PageViewport::for_page(PageSize::new(100.0, 200.0), scale),
        );
        let watermark = WatermarkOverlay::for_surface(&WatermarkStyle::default(), &surface, scale);
        RenderedPage {
            surface,
            watermark,
            scale,
        }
    }

    #[test]
    fn test_viewport_follows_scale() {
        let vp = PageViewport::for_page(PageSize::new(612.0, 792.0), RenderScale::new(1.5));
        assert_eq!(vp.width_px, 918);
        assert_eq!(vp.height_px, 1188);

        let tiny = PageViewport::for_page(PageSize::new(0.0, 0.2), RenderScale::new(0.5));
        assert_eq!((tiny.width_px, tiny.height_px), (1, 1));
    }

    #[test]
    fn test_watermark_scales_with_surface() {
        let page = rendered(1, 2.0);
        assert_eq!(page.watermark.font_px, 96.0);
        assert_eq!(page.watermark.center_x, 100.0);
        assert_eq!(page.watermark.center_y, 200.0);
        assert_eq!(page.watermark.angle_deg, -45.0);
        assert!(!page.watermark.interactive);
    }

    #[test]
    fn test_detached_stack_refuses_pages() {
        let mut stack = SurfaceStack::default();
        stack.append(rendered(1, 1.0)).unwrap();
        stack.detach();

        assert!(stack.is_empty());
        assert!(!stack.is_live());
        assert!(matches!(
            stack.append(rendered(2, 1.0)),
            Err(DestinationError::Gone)
        ));
        assert!(matches!(stack.clear(), Err(DestinationError::Gone)));
    }

    #[test]
    fn test_pinned_surfaces_die_with_their_session() {
        let shared = SharedSurfaces::new();
        let first = shared.lock().reattach();
        let mut old_pass = shared.pinned(first);
        old_pass.clear().unwrap();
        old_pass.append(rendered(1, 1.0)).unwrap();

        shared.lock().detach();
        let second = shared.lock().reattach();
        assert_ne!(first, second);

        assert!(!old_pass.is_live());
        assert!(matches!(
            old_pass.append(rendered(2, 1.0)),
            Err(DestinationError::Gone)
        ));
        assert!(shared.lock().is_empty());

        let mut new_pass = shared.pinned(second);
        assert!(new_pass.is_live());
        new_pass.append(rendered(1, 2.0)).unwrap();
        assert_eq!(shared.lock().page_numbers(), vec![1]);
    }

    #[test]
    fn test_clear_bumps_generation() {
        let mut stack = SurfaceStack::default();
        stack.clear().unwrap();
        stack.append(rendered(1, 1.0)).unwrap();
        stack.clear().unwrap();
        assert_eq!(stack.generation(), 2);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_directory_sink_writes_pages_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::create(tmp.path().join("out")).unwrap();

        sink.clear().unwrap();
        sink.append(rendered(1, 1.0)).unwrap();
        sink.append(rendered(2, 1.0)).unwrap();
        let manifest = sink.finish().unwrap();

        assert!(sink.dir().join("page-001.png").is_file());
        assert!(sink.dir().join("page-002.png").is_file());
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(manifest).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[1]["page_number"], 2);
    }

    #[test]
    fn test_directory_sink_clear_only_removes_its_own_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("notes.txt"), "keep me").unwrap();
        fs::write(tmp.path().join("page-x.png"), "not ours").unwrap();

        let mut sink = DirectorySink::create(tmp.path()).unwrap();
        sink.append(rendered(1, 1.0)).unwrap();
        sink.clear().unwrap();

        assert!(!tmp.path().join("page-001.png").exists());
        assert!(tmp.path().join("notes.txt").exists());
        assert!(tmp.path().join("page-x.png").exists());
        assert!(sink.entries().is_empty());
    }
}
