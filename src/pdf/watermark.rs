//! Burns a page's watermark overlay into its pixels
//!
//! The overlay is laid out as a single SVG text element, rasterized with
//! resvg onto a transparent layer and blended over the page.

use std::fmt;
use std::sync::Arc;

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};

use super::surface::{PageSurface, WatermarkOverlay};

/// Ink colour before opacity is applied
const INK: &str = "#808080";

/// Baseline offset that puts the middle of the glyphs on the centre line
const BASELINE_SHIFT_EM: f32 = 0.35;

/// Draws watermark overlays with the fonts installed on the system
#[derive(Clone)]
pub struct WatermarkPainter {
    fonts: Arc<fontdb::Database>,
}

impl Default for WatermarkPainter {
    fn default() -> Self {
        Self::new()
    }
}

impl WatermarkPainter {
    /// Load system fonts once; every page drawn by this painter shares them
    #[must_use]
    pub fn new() -> Self {
        let mut fonts = fontdb::Database::new();
        fonts.load_system_fonts();
        if let Some(family) = fallback_family(&fonts) {
            log::debug!("no sans-serif font configured, using {family}");
            fonts.set_sans_serif_family(family);
        }
        if fonts.is_empty() {
            log::warn!("no system fonts found, watermarks will not be drawn");
        }
        Self {
            fonts: Arc::new(fonts),
        }
    }

    #[must_use]
    pub fn has_fonts(&self) -> bool {
        !self.fonts.is_empty()
    }

    /// Blend `overlay` into `surface`
    ///
    /// Returns whether any pixel changed. Empty text, zero opacity and a
    /// missing font all leave the surface untouched.
    pub fn paint(&self, overlay: &WatermarkOverlay, surface: &mut PageSurface) -> bool {
        if overlay.text.trim().is_empty() || overlay.opacity <= 0.0 || overlay.font_px <= 0.0 {
            return false;
        }
        let (width, height) = (surface.width_px(), surface.height_px());
        let Some(mut layer) = Pixmap::new(width, height) else {
            return false;
        };

        let mut options = usvg::Options::default();
        options.fontdb = Arc::clone(&self.fonts);
        let tree = match usvg::Tree::from_str(&overlay_svg(overlay, width, height), &options) {
            Ok(tree) => tree,
            Err(e) => {
                log::warn!("watermark layout failed: {e}");
                return false;
            }
        };
        resvg::render(&tree, Transform::identity(), &mut layer.as_mut());

        blend(&layer, surface)
    }
}

impl fmt::Debug for WatermarkPainter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatermarkPainter")
            .field("font_faces", &self.fonts.len())
            .finish()
    }
}

/// First installed family, when the generic sans-serif name resolves to nothing
fn fallback_family(fonts: &fontdb::Database) -> Option<String> {
    let query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..fontdb::Query::default()
    };
    if fonts.query(&query).is_some() {
        return None;
    }
    fonts
        .faces()
        .find_map(|face| face.families.first())
        .map(|(name, _)| name.clone())
}

fn overlay_svg(overlay: &WatermarkOverlay, width: u32, height: u32) -> String {
    let (cx, cy) = (overlay.center_x, overlay.center_y);
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r#"<text x="{cx}" y="{y}" font-family="sans-serif" font-size="{size}" "#,
            r#"fill="{ink}" fill-opacity="{opacity}" text-anchor="middle" "#,
            r#"transform="rotate({angle} {cx} {cy})">{text}</text></svg>"#
        ),
        w = width,
        h = height,
        cx = cx,
        cy = cy,
        y = cy + overlay.font_px * BASELINE_SHIFT_EM,
        size = overlay.font_px,
        ink = INK,
        opacity = overlay.opacity,
        angle = overlay.angle_deg,
        text = escape_xml(&overlay.text),
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Source-over of a premultiplied RGBA layer onto opaque RGB
fn blend(layer: &Pixmap, surface: &mut PageSurface) -> bool {
    let mut touched = false;
    for (src, dst) in layer
        .data()
        .chunks_exact(4)
        .zip(surface.pixels_mut().pixels_mut())
    {
        let alpha = u16::from(src[3]);
        if alpha == 0 {
            continue;
        }
        for channel in 0..3 {
            let under = u16::from(dst.0[channel]) * (255 - alpha) / 255;
            dst.0[channel] = (u16::from(src[channel]) + under).min(255) as u8;
        }
        touched = true;
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::document::PageSize;
    use crate::pdf::surface::{PageViewport, WatermarkStyle};
    use crate::pdf::zoom::RenderScale;

    fn blank(scale: f32) -> PageSurface {
        let viewport =
            PageViewport::for_page(PageSize::new(300.0, 300.0), RenderScale::new(scale));
        PageSurface::new(1, viewport)
    }

    fn overlay_for(style: &WatermarkStyle, surface: &PageSurface) -> WatermarkOverlay {
        WatermarkOverlay::for_surface(style, surface, RenderScale::new(1.0))
    }

    #[test]
    fn test_watermark_marks_the_page_lightly() {
        let painter = WatermarkPainter::new();
        let mut surface = blank(1.0);
        let overlay = overlay_for(&WatermarkStyle::default(), &surface);

        assert!(painter.paint(&overlay, &mut surface));

        let marked: Vec<u8> = surface
            .pixels()
            .pixels()
            .filter(|p| p.0 != [0xFF, 0xFF, 0xFF])
            .map(|p| p.0[0])
            .collect();
        assert!(!marked.is_empty());
        // 10% grey ink never gets darker than ~240
        assert!(marked.iter().all(|&v| v >= 230), "darkest {:?}", marked.iter().min());
    }

    #[test]
    fn test_invisible_watermark_leaves_pixels_alone() {
        let painter = WatermarkPainter::new();
        for style in [
            WatermarkStyle {
                text: "  ".into(),
                ..WatermarkStyle::default()
            },
            WatermarkStyle {
                opacity: 0.0,
                ..WatermarkStyle::default()
            },
        ] {
            let mut surface = blank(1.0);
            let before = surface.pixels().clone();
            let overlay = overlay_for(&style, &surface);

            assert!(!painter.paint(&overlay, &mut surface));
            assert_eq!(surface.pixels(), &before);
        }
    }

    #[test]
    fn test_markup_in_text_is_escaped() {
        assert_eq!(
            escape_xml(r#"Q&A <draft> "v2" 'x'"#),
            "Q&amp;A &lt;draft&gt; &quot;v2&quot; &apos;x&apos;"
        );
    }
}
