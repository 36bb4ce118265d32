use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow, bail};
use scanblock_core::{BlockContent, MessageStyle, Screen};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use string_cache::DefaultAtom as Atom;
use tiny_skia::{Color, Paint, Pixmap, PixmapPaint, PremultipliedColorU8, Rect, Transform};
use tracing::{debug, warn};

pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
pub const FINISH_BACKGROUND: [u8; 4] = [166, 166, 166, 255];
const FOREGROUND: [u8; 4] = [255, 255, 255, 255];
const FINISH_FOREGROUND: [u8; 4] = [0, 0, 0, 255];
const ANNOTATION_COLOR: [u8; 4] = [90, 90, 90, 255];

// text heights as a fraction of the window height
const BLOCK_TEXT: f32 = 0.25;
const MESSAGE_TEXT: f32 = 0.05;
const ANNOTATION_TEXT: f32 = 0.035;

const LINE_SPACING: f32 = 1.25;
const WRAP_WIDTH: f32 = 0.9;
const TEXT_CACHE_LIMIT: usize = 256;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub fn load_font(path: impl AsRef<Path>) -> Result<FontVec> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {e}", path.display()))
}

/// First usable font from the usual install locations.
pub fn load_system_font() -> Option<FontVec> {
    SYSTEM_FONTS.iter().find_map(|path| {
        let font = load_font(path).ok()?;
        debug!(path, "loaded system font");
        Some(font)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TextKey {
    text: Atom,
    size_bits: u32,
    color: [u8; 4],
}

#[derive(Default)]
struct TextCache {
    map: HashMap<TextKey, Arc<Pixmap>>,
}

impl TextCache {
    fn get_or_render<F: Font>(
        &mut self,
        font: &F,
        text: &str,
        size_px: f32,
        color: [u8; 4],
    ) -> Option<Arc<Pixmap>> {
        let key = TextKey {
            text: Atom::from(text),
            size_bits: size_px.to_bits(),
            color,
        };
        if let Some(p) = self.map.get(&key) {
            return Some(Arc::clone(p));
        }
        // annotations change every pulse; keep the cache from growing without bound
        if self.map.len() >= TEXT_CACHE_LIMIT {
            self.map.clear();
        }
        let pm = Arc::new(render_text_pixmap(text, size_px, font, color)?);
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}

/// Rasterizes one line of text into a tight transparent pixmap.
/// Returns `None` when nothing in `text` has an outline.
pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    font: &F,
    color: [u8; 4],
) -> Option<Pixmap> {
    let glyphs = layout_line(font, font_size, text);

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }
    if outlines.is_empty() {
        return None;
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a = (cov * color[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let Some(src) = PremultipliedColorU8::from_rgba(
                (color[0] as f32 * a) as u8,
                (color[1] as f32 * a) as u8,
                (color[2] as f32 * a) as u8,
                sa,
            ) else {
                return;
            };

            // source over, premultiplied
            let bg = dst[i];
            let inv = 1.0 - sa as f32 / 255.0;
            let blended = PremultipliedColorU8::from_rgba(
                src.red().saturating_add((bg.red() as f32 * inv) as u8),
                src.green().saturating_add((bg.green() as f32 * inv) as u8),
                src.blue().saturating_add((bg.blue() as f32 * inv) as u8),
                src.alpha().saturating_add((bg.alpha() as f32 * inv) as u8),
            );
            if let Some(c) = blended {
                dst[i] = c;
            }
        });
    }

    Some(pm)
}

fn layout_line<F: Font>(font: &F, font_size: f32, text: &str) -> Vec<Glyph> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::with_capacity(text.len());
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }
    glyphs
}

fn line_width<F: Font>(font: &F, font_size: f32, text: &str) -> f32 {
    let sf = font.as_scaled(PxScale::from(font_size));
    let mut width = 0.0;
    let mut prev = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            width += sf.kern(p, id);
        }
        width += sf.h_advance(id);
        prev = Some(id);
    }
    width
}

/// Splits on newlines, then greedily wraps words at `max_width` pixels.
/// Blank lines are kept so paragraph spacing survives.
fn wrap_lines<F: Font>(font: &F, font_size: f32, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if line.is_empty() {
                line.push_str(word);
                continue;
            }
            let candidate = format!("{line} {word}");
            if line_width(font, font_size, &candidate) > max_width {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }
    lines
}

fn skia_color(c: [u8; 4]) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

fn solid_paint(c: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(skia_color(c));
    paint
}

/// Software renderer for block-design screens.
///
/// Draws into a caller-supplied pixmap or, through [`BlockRenderer::render_frame`],
/// straight into an RGBA frame buffer. Without a font every text element
/// degrades to a fixation cross so a run can still be presented.
pub struct BlockRenderer {
    width: u32,
    height: u32,
    font: Option<FontVec>,
    text_cache: TextCache,
    canvas: Pixmap,
    warned_no_font: bool,
}

impl BlockRenderer {
    pub fn new(width: u32, height: u32, font: Option<FontVec>) -> Result<Self> {
        let canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate a {width}x{height} canvas"))?;
        Ok(Self {
            width,
            height,
            font,
            text_cache: TextCache::default(),
            canvas,
            warned_no_font: false,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate a {width}x{height} canvas"))?;
        self.width = width;
        self.height = height;
        // text sizes follow the height
        self.text_cache.clear();
        Ok(())
    }

    /// Renders `screen` into the internal canvas and copies it into `frame`,
    /// an RGBA8 buffer of exactly `width * height * 4` bytes.
    pub fn render_frame(&mut self, screen: &Screen, frame: &mut [u8]) -> Result<()> {
        let mut canvas = std::mem::replace(&mut self.canvas, Pixmap::new(1, 1).context("pixmap")?);
        let drawn = self.render(&mut canvas, screen);
        self.canvas = canvas;
        drawn?;

        let src = self.canvas.data();
        if frame.len() != src.len() {
            bail!("frame buffer holds {} bytes, canvas needs {}", frame.len(), src.len());
        }
        // everything drawn is opaque, so premultiplied and straight RGBA agree
        frame.copy_from_slice(src);
        Ok(())
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    pub fn render(&mut self, pixmap: &mut Pixmap, screen: &Screen) -> Result<()> {
        if (pixmap.width(), pixmap.height()) != (self.width, self.height) {
            bail!(
                "pixmap is {}x{}, renderer expects {}x{}",
                pixmap.width(),
                pixmap.height(),
                self.width,
                self.height
            );
        }
        let h = self.height as f32;
        let center = (self.width as f32 / 2.0, h / 2.0);

        match screen {
            Screen::Message { text, style } => {
                let (bg, fg) = match style {
                    MessageStyle::Finished => (FINISH_BACKGROUND, FINISH_FOREGROUND),
                    MessageStyle::Waiting | MessageStyle::Instruction => (BACKGROUND, FOREGROUND),
                };
                pixmap.fill(skia_color(bg));
                self.draw_paragraph(pixmap, text, MESSAGE_TEXT * h, fg, center);
            }
            Screen::Block {
                content,
                flicker_phase,
                annotation,
                ..
            } => {
                pixmap.fill(skia_color(BACKGROUND));
                match content {
                    BlockContent::Text { text, color } => {
                        self.draw_paragraph(pixmap, text, BLOCK_TEXT * h, *color, center)
                    }
                    BlockContent::Checkerboard {
                        checker_size,
                        color,
                    } => draw_checkerboard(pixmap, *checker_size, *color, *flicker_phase),
                }
                if let Some(text) = annotation {
                    self.draw_annotation(pixmap, text);
                }
            }
        }
        Ok(())
    }

    fn draw_paragraph(
        &mut self,
        pixmap: &mut Pixmap,
        text: &str,
        size_px: f32,
        color: [u8; 4],
        center: (f32, f32),
    ) {
        let Some(font) = self.font.as_ref() else {
            if !self.warned_no_font {
                warn!("no font loaded, drawing a fixation cross in place of text");
                self.warned_no_font = true;
            }
            draw_fixation_cross(pixmap, center, color);
            return;
        };

        let lines = wrap_lines(font, size_px, text, self.width as f32 * WRAP_WIDTH);
        let line_h = size_px * LINE_SPACING;
        let top = center.1 - line_h * lines.len() as f32 / 2.0;
        for (i, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let Some(pm) = self.text_cache.get_or_render(font, line, size_px, color) else {
                continue;
            };
            let cy = top + line_h * (i as f32 + 0.5);
            blit(
                pixmap,
                &pm,
                center.0 - pm.width() as f32 / 2.0,
                cy - pm.height() as f32 / 2.0,
            );
        }
    }

    /// Small status text in the bottom-right corner.
    fn draw_annotation(&mut self, pixmap: &mut Pixmap, text: &str) {
        let Some(font) = self.font.as_ref() else {
            return;
        };
        let size = ANNOTATION_TEXT * self.height as f32;
        let Some(pm) = self
            .text_cache
            .get_or_render(font, text, size, ANNOTATION_COLOR)
        else {
            return;
        };
        let x = self.width as f32 * 0.98 - pm.width() as f32;
        let y = self.height as f32 * 0.96 - pm.height() as f32;
        blit(pixmap, &pm, x, y);
    }
}

fn blit(dst: &mut Pixmap, src: &Pixmap, x: f32, y: f32) {
    dst.draw_pixmap(
        x.round() as i32,
        y.round() as i32,
        src.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

/// Square checks of `checker_size * height` pixels. Odd phases swap which
/// squares are lit.
fn draw_checkerboard(pixmap: &mut Pixmap, checker_size: f32, color: [u8; 4], phase: u64) {
    let (w, h) = (pixmap.width() as f32, pixmap.height() as f32);
    let cell = (checker_size * h).max(1.0);
    let cols = (w / cell).ceil() as u64;
    let rows = (h / cell).ceil() as u64;
    let paint = solid_paint(color);

    for row in 0..rows {
        for col in 0..cols {
            if (row + col + phase) % 2 != 0 {
                continue;
            }
            let x = col as f32 * cell;
            let y = row as f32 * cell;
            if let Some(r) = Rect::from_xywh(x, y, cell.min(w - x), cell.min(h - y)) {
                pixmap.fill_rect(r, &paint, Transform::identity(), None);
            }
        }
    }
}

fn draw_fixation_cross(pixmap: &mut Pixmap, center: (f32, f32), color: [u8; 4]) {
    let size = (pixmap.height() as f32 * 0.05).max(8.0);
    let thickness = (size / 20.0).max(2.0);
    let paint = solid_paint(color);

    let bars = [
        Rect::from_xywh(center.0 - size / 2.0, center.1 - thickness / 2.0, size, thickness),
        Rect::from_xywh(center.0 - thickness / 2.0, center.1 - size / 2.0, thickness, size),
    ];
    for bar in bars.into_iter().flatten() {
        pixmap.fill_rect(bar, &paint, Transform::identity(), None);
    }
}
