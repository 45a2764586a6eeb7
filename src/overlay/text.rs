//! Font lookup, shaping and line layout

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use rustybuzz::ttf_parser::{GlyphId, OutlineBuilder};
use rustybuzz::{Face, UnicodeBuffer};
use thiserror::Error;
use tiny_skia::PathBuilder;
use tracing::{debug, warn};

/// Points to pixels at 96 dpi
const PT_TO_PX: f32 = 96.0 / 72.0;
const DEFAULT_SIZE_PT: f32 = 12.0;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("no usable font installed")]
    NotFound,
    #[error("invalid font size in \"{0}\"")]
    Size(String),
    #[error("failed to parse font face: {0}")]
    Face(String),
}

/// Parsed `Family[,Family] [Style...] [Size]` pattern
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub families: Vec<String>,
    pub weight: Weight,
    pub style: Style,
    pub stretch: Stretch,
    /// Size in points
    pub size: f32,
}

impl FontSpec {
    pub fn parse(pattern: &str) -> Result<Self, FontError> {
        let mut words: Vec<&str> = pattern.split_whitespace().collect();
        let mut spec = FontSpec {
            families: Vec::new(),
            weight: Weight::NORMAL,
            style: Style::Normal,
            stretch: Stretch::Normal,
            size: DEFAULT_SIZE_PT,
        };

        if let Some(last) = words.last() {
            let digits = last.strip_suffix("px");
            if let Ok(size) = digits.unwrap_or(last).parse::<f32>() {
                if !size.is_finite() || size <= 0.0 {
                    return Err(FontError::Size(pattern.to_string()));
                }
                spec.size = if digits.is_some() { size / PT_TO_PX } else { size };
                words.pop();
            }
        }

        while let Some(word) = words.last() {
            if !spec.apply_style_word(word) {
                break;
            }
            words.pop();
        }

        spec.families = words
            .join(" ")
            .split(',')
            .map(str::trim)
            .filter(|family| !family.is_empty())
            .map(str::to_string)
            .collect();
        if spec.families.is_empty() {
            spec.families.push("Sans".to_string());
        }
        Ok(spec)
    }

    /// Pixel size at `scale`
    pub fn pixel_size(&self, scale: u32) -> f32 {
        self.size * PT_TO_PX * scale as f32
    }

    fn apply_style_word(&mut self, word: &str) -> bool {
        match word.to_ascii_lowercase().as_str() {
            "thin" => self.weight = Weight::THIN,
            "ultra-light" | "extra-light" => self.weight = Weight::EXTRA_LIGHT,
            "light" => self.weight = Weight::LIGHT,
            "regular" | "normal" | "book" => self.weight = Weight::NORMAL,
            "medium" => self.weight = Weight::MEDIUM,
            "semi-bold" | "semibold" | "demi-bold" => self.weight = Weight::SEMIBOLD,
            "bold" => self.weight = Weight::BOLD,
            "ultra-bold" | "extra-bold" => self.weight = Weight::EXTRA_BOLD,
            "heavy" | "black" => self.weight = Weight::BLACK,
            "italic" => self.style = Style::Italic,
            "oblique" => self.style = Style::Oblique,
            "condensed" => self.stretch = Stretch::Condensed,
            "expanded" => self.stretch = Stretch::Expanded,
            _ => return false,
        }
        true
    }
}

/// Concrete family names tried for the generic aliases
fn expand_family(family: &str) -> &[&str] {
    match family.to_ascii_lowercase().as_str() {
        "monospace" | "mono" => &[
            "DejaVu Sans Mono",
            "Liberation Mono",
            "Noto Sans Mono",
            "Cascadia Mono",
            "Courier New",
        ],
        "sans" | "sans-serif" => &["DejaVu Sans", "Liberation Sans", "Noto Sans", "Cantarell", "Arial"],
        "serif" => &["DejaVu Serif", "Liberation Serif", "Noto Serif", "Times New Roman"],
        _ => &[],
    }
}

/// A loaded font face
pub struct Font {
    data: Vec<u8>,
    index: u32,
    spec: FontSpec,
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .field("spec", &self.spec)
            .finish()
    }
}

impl Font {
    /// Look `spec` up among the system fonts, falling back to any installed face
    pub fn load(spec: FontSpec) -> Result<Self, FontError> {
        let mut db = Database::new();
        db.load_system_fonts();
        debug!(faces = db.len(), "loaded system fonts");

        let found = {
            let names: Vec<&str> = spec
                .families
                .iter()
                .flat_map(|family| {
                    let expanded = expand_family(family);
                    if expanded.is_empty() {
                        vec![family.as_str()]
                    } else {
                        expanded.to_vec()
                    }
                })
                .collect();
            let families: Vec<Family<'_>> = names.iter().map(|name| Family::Name(*name)).collect();
            db.query(&Query {
                families: &families,
                weight: spec.weight,
                stretch: spec.stretch,
                style: spec.style,
            })
        };
        let id = match found {
            Some(id) => id,
            None => {
                warn!(families = ?spec.families, "font not found, using first available face");
                db.faces().next().map(|face| face.id).ok_or(FontError::NotFound)?
            }
        };

        let (data, index) = db
            .with_face_data(id, |data, index| (data.to_vec(), index))
            .ok_or(FontError::NotFound)?;
        Face::from_slice(&data, index).ok_or_else(|| FontError::Face(format!("face {index}")))?;
        if let Some(face) = db.face(id) {
            debug!(family = ?face.families.first(), "selected font face");
        }

        Ok(Self { data, index, spec })
    }

    pub fn spec(&self) -> &FontSpec {
        &self.spec
    }

    /// Bind the face at a pixel size
    pub fn sized(&self, px: f32) -> Result<SizedFont<'_>, FontError> {
        let face = Face::from_slice(&self.data, self.index)
            .ok_or_else(|| FontError::Face(format!("face {}", self.index)))?;
        let units = face.units_per_em().max(1) as f32;
        Ok(SizedFont {
            scale: px / units,
            face,
        })
    }
}

/// A face bound to a pixel size
pub struct SizedFont<'a> {
    face: Face<'a>,
    scale: f32,
}

impl SizedFont<'_> {
    pub fn ascent(&self) -> f32 {
        f32::from(self.face.ascender()) * self.scale
    }

    pub fn line_height(&self) -> f32 {
        let face = &self.face;
        (f32::from(face.ascender()) - f32::from(face.descender()) + f32::from(face.line_gap()))
            * self.scale
    }

    pub fn measure(&self, text: &str) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        let glyphs = self.shape(text);
        glyphs.glyph_positions().iter().map(|pos| pos.x_advance as f32).sum::<f32>() * self.scale
    }

    /// Append the outlines of `text` with its baseline origin at (`x`, `y`)
    pub fn outline(&self, text: &str, x: f32, y: f32, builder: &mut PathBuilder) {
        if text.is_empty() {
            return;
        }
        let glyphs = self.shape(text);
        let mut pen = x;
        for (info, pos) in glyphs.glyph_infos().iter().zip(glyphs.glyph_positions()) {
            let mut glyph = GlyphOutline {
                builder,
                x: pen + pos.x_offset as f32 * self.scale,
                y: y - pos.y_offset as f32 * self.scale,
                scale: self.scale,
            };
            let id = GlyphId(u16::try_from(info.glyph_id).unwrap_or(0));
            self.face.outline_glyph(id, &mut glyph);
            pen += pos.x_advance as f32 * self.scale;
        }
    }

    fn shape(&self, text: &str) -> rustybuzz::GlyphBuffer {
        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        rustybuzz::shape(&self.face, &[], buffer)
    }
}

/// Font units to pixels, y flipped
struct GlyphOutline<'a> {
    builder: &'a mut PathBuilder,
    x: f32,
    y: f32,
    scale: f32,
}

impl GlyphOutline<'_> {
    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.x + x * self.scale, self.y - y * self.scale)
    }
}

impl OutlineBuilder for GlyphOutline<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Break `text` into display lines.
///
/// Explicit newlines always break. With `max_width`, words are packed
/// greedily and a word wider than the line is split between characters.
pub fn wrap_lines<F>(text: &str, max_width: Option<f32>, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.strip_suffix('\r').unwrap_or(paragraph);
        let Some(max_width) = max_width else {
            lines.push(paragraph.to_string());
            continue;
        };

        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if measure(&candidate) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if measure(word) <= max_width {
                current = word.to_string();
            } else {
                current = break_word(word, max_width, &measure, &mut lines);
            }
        }
        lines.push(current);
    }
    lines
}

/// Emit full chunks of an overlong word; returns the unfinished tail
fn break_word<F>(word: &str, max_width: f32, measure: &F, lines: &mut Vec<String>) -> String
where
    F: Fn(&str) -> f32,
{
    let mut chunk = String::new();
    for ch in word.chars() {
        chunk.push(ch);
        if measure(&chunk) > max_width && chunk.chars().count() > 1 {
            chunk.pop();
            lines.push(std::mem::take(&mut chunk));
            chunk.push(ch);
        }
    }
    chunk
}

/// Positioned lines ready to be drawn
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<(String, f32)>,
    pub line_height: f32,
    pub ascent: f32,
    /// Extent of the widest line; the wrap width only decides where lines break
    pub width: f32,
    pub height: f32,
}

impl TextLayout {
    pub fn new(font: &SizedFont<'_>, text: &str, wrap_width: Option<f32>) -> Self {
        Self::measured(
            text,
            wrap_width,
            |line| font.measure(line),
            font.line_height(),
            font.ascent(),
        )
    }

    pub fn measured<F>(
        text: &str,
        wrap_width: Option<f32>,
        measure: F,
        line_height: f32,
        ascent: f32,
    ) -> Self
    where
        F: Fn(&str) -> f32,
    {
        let lines: Vec<(String, f32)> = wrap_lines(text, wrap_width, &measure)
            .into_iter()
            .map(|line| {
                let width = measure(&line);
                (line, width)
            })
            .collect();
        Self {
            height: line_height * lines.len() as f32,
            width: lines.iter().map(|(_, width)| *width).fold(0.0, f32::max),
            lines,
            line_height,
            ascent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is 10 units wide
    fn fixed(text: &str) -> f32 {
        text.chars().count() as f32 * 10.0
    }

    #[test]
    fn test_parse_font_pattern() {
        let spec = FontSpec::parse("Monospace 26").unwrap();
        assert_eq!(spec.families, vec!["Monospace"]);
        assert_eq!(spec.size, 26.0);
        assert_eq!(spec.weight, Weight::NORMAL);

        let spec = FontSpec::parse("DejaVu Sans, Noto Sans Bold Italic 11.5").unwrap();
        assert_eq!(spec.families, vec!["DejaVu Sans", "Noto Sans"]);
        assert_eq!(spec.weight, Weight::BOLD);
        assert_eq!(spec.style, Style::Italic);
        assert_eq!(spec.size, 11.5);
    }

    #[test]
    fn test_parse_font_pattern_defaults() {
        let spec = FontSpec::parse("Bold").unwrap();
        assert_eq!(spec.families, vec!["Sans"]);
        assert_eq!(spec.size, DEFAULT_SIZE_PT);
        assert!(FontSpec::parse("Sans 0").is_err());
        assert!(FontSpec::parse("Sans -3").is_err());
    }

    #[test]
    fn test_pixel_size_follows_scale() {
        let spec = FontSpec::parse("Sans 12").unwrap();
        assert_eq!(spec.pixel_size(1), 16.0);
        assert_eq!(spec.pixel_size(2), 32.0);
    }

    #[test]
    fn test_generic_families_expand() {
        assert!(expand_family("Monospace").contains(&"DejaVu Sans Mono"));
        assert!(expand_family("Terminus").is_empty());
    }

    #[test]
    fn test_wrap_greedy() {
        let lines = wrap_lines("the quick brown fox", Some(100.0), fixed);
        assert_eq!(lines, vec!["the quick", "brown fox"]);
    }

    #[test]
    fn test_explicit_newlines_always_break() {
        assert_eq!(wrap_lines("a\nb", None, fixed), vec!["a", "b"]);
        assert_eq!(wrap_lines("a\n\nb", Some(100.0), fixed), vec!["a", "", "b"]);
    }

    #[test]
    fn test_no_wrap_keeps_long_lines() {
        let text = "a line that is far wider than the surface";
        assert_eq!(wrap_lines(text, None, fixed), vec![text]);
    }

    #[test]
    fn test_layout_width_is_widest_line_when_wrapping() {
        let layout = TextLayout::measured("ab\nabcd", Some(300.0), fixed, 12.0, 9.0);
        assert_eq!(layout.width, 40.0);
        assert_eq!(layout.height, 24.0);
        let unwrapped = TextLayout::measured("ab\nabcd", None, fixed, 12.0, 9.0);
        assert_eq!(layout, unwrapped);
    }

    #[test]
    fn test_overlong_word_is_split() {
        let lines = wrap_lines("abcdefghijkl xy", Some(50.0), fixed);
        assert_eq!(lines, vec!["abcde", "fghij", "kl xy"]);
    }
}
