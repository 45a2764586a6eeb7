//! tiny-skia rendering for overlay frames

use tiny_skia::*;
use tracing::trace;

use super::text::{Font, FontError, TextLayout};
use crate::config::{Corners, Dimensions, Style};

/// Paints one frame: backgrounds, then the text
#[derive(Debug)]
pub struct Renderer {
    font: Font,
    style: Style,
}

impl Renderer {
    pub fn new(font: Font, style: Style) -> Self {
        Self { font, style }
    }

    /// Render `text` onto `pixmap`, which must be `size` scaled by `scale`
    pub fn render(
        &self,
        pixmap: &mut Pixmap,
        size: Dimensions,
        scale: u32,
        text: &str,
    ) -> Result<(), FontError> {
        pixmap.fill(Color::TRANSPARENT);
        draw_background(pixmap, &self.style, size, scale);

        let text = text.trim_end_matches('\n');
        if text.is_empty() {
            return Ok(());
        }
        trace!(text, "painting text");

        let scaled = size.scaled(scale);
        let (width, height) = (scaled.width as f32, scaled.height as f32);
        let font = self.font.sized(self.font.spec().pixel_size(scale))?;
        let wrap_width = self.style.wrap.then_some(width);
        let layout = TextLayout::new(&font, text, wrap_width);

        let mut pb = PathBuilder::new();
        for ((line, _), (x, baseline)) in layout
            .lines
            .iter()
            .zip(line_origins(&layout, width, height, self.style.center))
        {
            font.outline(line, x, baseline, &mut pb);
        }

        // Blank lines only
        let Some(path) = pb.finish() else {
            return Ok(());
        };
        let mut paint = Paint::default();
        paint.set_color(self.style.text.to_skia());
        paint.anti_alias = true;
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        Ok(())
    }
}

/// Pen origin (left edge, baseline) of every line.
///
/// The block is centered on its measured extent. Center mode also centers
/// each line; otherwise lines share the block's left edge.
pub fn line_origins(
    layout: &TextLayout,
    width: f32,
    height: f32,
    center: bool,
) -> Vec<(f32, f32)> {
    let top = (height - layout.height) / 2.0;
    let left = (width - layout.width) / 2.0;
    layout
        .lines
        .iter()
        .enumerate()
        .map(|(i, (_, line_width))| {
            let x = if center { (width - line_width) / 2.0 } else { left };
            (x, top + i as f32 * layout.line_height + layout.ascent)
        })
        .collect()
}

/// Border and background fills, each replacing what is below it
pub fn draw_background(pixmap: &mut Pixmap, style: &Style, size: Dimensions, scale: u32) {
    if style.background.is_transparent() && style.border.is_transparent() {
        return;
    }

    let scaled = size.scaled(scale);
    let radii = Corners {
        top_left: clamp_radius(style.radii.top_left, scale, scaled),
        top_right: clamp_radius(style.radii.top_right, scale, scaled),
        bottom_right: clamp_radius(style.radii.bottom_right, scale, scaled),
        bottom_left: clamp_radius(style.radii.bottom_left, scale, scaled),
    };
    let Some(outer) = Rect::from_xywh(0.0, 0.0, scaled.width as f32, scaled.height as f32) else {
        return;
    };

    let borders = style.borders;
    if [borders.top, borders.right, borders.bottom, borders.left]
        .iter()
        .any(|&width| width > 0)
    {
        fill_replace(pixmap, create_rounded_rect(outer, radii), style.border.to_skia());
    }

    let scaled_border = |width: u32| width.saturating_mul(scale) as f32;
    let (top, right) = (scaled_border(borders.top), scaled_border(borders.right));
    let (bottom, left) = (scaled_border(borders.bottom), scaled_border(borders.left));
    let Some(inner) = Rect::from_xywh(
        left,
        top,
        outer.width() - left - right,
        outer.height() - top - bottom,
    ) else {
        return;
    };
    fill_replace(pixmap, create_rounded_rect(inner, radii), style.background.to_skia());
}

/// Scale a corner radius and keep it within half the larger side
pub fn clamp_radius(radius: u32, scale: u32, scaled: Dimensions) -> f32 {
    let limit = scaled.width.max(scaled.height) as f32 / 2.0;
    (radius.saturating_mul(scale) as f32).min(limit)
}

fn fill_replace(pixmap: &mut Pixmap, path: Path, color: Color) {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint.blend_mode = BlendMode::Source;
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
}

fn create_rounded_rect(rect: Rect, radii: Corners<f32>) -> Path {
    if radii == Corners::uniform(0.0) {
        return PathBuilder::from_rect(rect);
    }

    let mut pb = PathBuilder::new();

    let x = rect.x();
    let y = rect.y();
    let w = rect.width();
    let h = rect.height();

    pb.move_to(x + radii.top_left, y);

    // Top edge, top-right corner
    pb.line_to(x + w - radii.top_right, y);
    pb.quad_to(x + w, y, x + w, y + radii.top_right);

    // Right edge, bottom-right corner
    pb.line_to(x + w, y + h - radii.bottom_right);
    pb.quad_to(x + w, y + h, x + w - radii.bottom_right, y + h);

    // Bottom edge, bottom-left corner
    pb.line_to(x + radii.bottom_left, y + h);
    pb.quad_to(x, y + h, x, y + h - radii.bottom_left);

    // Left edge, top-left corner
    pb.line_to(x, y + radii.top_left);
    pb.quad_to(x, y, x + radii.top_left, y);

    pb.close();

    pb.finish().unwrap_or_else(|| PathBuilder::from_rect(rect))
}

/// Copy premultiplied RGBA into a little-endian ARGB8888 buffer
pub fn copy_to_argb(pixmap: &Pixmap, canvas: &mut [u8]) {
    for (src, dst) in pixmap.data().chunks_exact(4).zip(canvas.chunks_exact_mut(4)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
        dst[3] = src[3];
    }
}
