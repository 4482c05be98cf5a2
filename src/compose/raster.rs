use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use std::path::Path;

use super::{DrawOp, FontStyle, TextMeasure, CANVAS_HEIGHT, CANVAS_WIDTH, GRADIENT_END, GRADIENT_START};
use crate::config;
use crate::error::RenderError;

/// Regular, bold and (optionally) italic faces used for the story text.
pub struct FontSet {
    regular: FontVec,
    bold: FontVec,
    italic: Option<FontVec>,
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet")
            .field("italic", &self.italic.is_some())
            .finish_non_exhaustive()
    }
}

impl FontSet {
    pub fn load(fonts: &config::Fonts) -> Result<Self, RenderError> {
        let italic = match &fonts.italic {
            Some(path) => Some(read_font(Path::new(path))?),
            None => None,
        };
        Ok(Self {
            regular: read_font(Path::new(&fonts.regular))?,
            bold: read_font(Path::new(&fonts.bold))?,
            italic,
        })
    }

    pub fn from_bytes(regular: Vec<u8>, bold: Vec<u8>, italic: Option<Vec<u8>>) -> Result<Self, RenderError> {
        Ok(Self {
            regular: parse_font("regular", regular)?,
            bold: parse_font("bold", bold)?,
            italic: italic.map(|bytes| parse_font("italic", bytes)).transpose()?,
        })
    }

    fn face(&self, style: FontStyle) -> &FontVec {
        match style {
            FontStyle::Regular => &self.regular,
            FontStyle::Bold => &self.bold,
            FontStyle::Italic => self.italic.as_ref().unwrap_or(&self.regular),
        }
    }
}

/// ab_glyph scales by line height; convert so that `size` is the em size,
/// which is what a CSS pixel font size means.
fn em_scale(font: &FontVec, size: f32) -> PxScale {
    let units_per_em = font.units_per_em().unwrap_or(1000.0);
    PxScale::from(size * font.height_unscaled() / units_per_em)
}

impl TextMeasure for FontSet {
    fn text_width(&self, style: FontStyle, size: f32, text: &str) -> f32 {
        let font = self.face(style);
        let scaled = font.as_scaled(em_scale(font, size));
        let mut width = 0.0;
        let mut prev = None;
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }
}

fn read_font(path: &Path) -> Result<FontVec, RenderError> {
    let bytes = std::fs::read(path).map_err(|e| RenderError::Font {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_font(&path.display().to_string(), bytes)
}

fn parse_font(name: &str, bytes: Vec<u8>) -> Result<FontVec, RenderError> {
    FontVec::try_from_vec(bytes).map_err(|e| RenderError::Font {
        path: name.to_string(),
        reason: e.to_string(),
    })
}

/// Paint the gradient background and every op onto a fresh canvas.
pub fn render(ops: &[DrawOp], fonts: &FontSet) -> RgbaImage {
    let mut canvas = RgbaImage::new(CANVAS_WIDTH, CANVAS_HEIGHT);
    fill_vertical_gradient(&mut canvas, GRADIENT_START, GRADIENT_END);

    for op in ops {
        match op {
            DrawOp::Text { text, x, y, size, style, color } => {
                if text.is_empty() {
                    continue;
                }
                let font = fonts.face(*style);
                let [r, g, b] = *color;
                draw_text_mut(
                    &mut canvas,
                    Rgba([r, g, b, 255]),
                    x.round() as i32,
                    y.round() as i32,
                    em_scale(font, *size),
                    font,
                    text,
                );
            }
            DrawOp::Rule { x0, x1, y, thickness, color, alpha } => {
                draw_translucent_rule(&mut canvas, *x0, *x1, *y, *thickness, *color, *alpha);
            }
        }
    }
    canvas
}

pub(crate) fn fill_vertical_gradient(canvas: &mut RgbaImage, top: [u8; 3], bottom: [u8; 3]) {
    let height = canvas.height();
    let span = height.saturating_sub(1).max(1) as f32;
    for y in 0..height {
        let t = y as f32 / span;
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        let px = Rgba([mix(top[0], bottom[0]), mix(top[1], bottom[1]), mix(top[2], bottom[2]), 255]);
        for x in 0..canvas.width() {
            canvas.put_pixel(x, y, px);
        }
    }
}

pub(crate) fn draw_translucent_rule(
    canvas: &mut RgbaImage,
    x0: f32,
    x1: f32,
    y: f32,
    thickness: f32,
    color: [u8; 3],
    alpha: f32,
) {
    let overlay = Rgba([color[0], color[1], color[2], (alpha.clamp(0.0, 1.0) * 255.0).round() as u8]);
    let top = y.round().max(0.0) as u32;
    let bottom = ((y + thickness).round().max(0.0) as u32).min(canvas.height());
    let left = x0.round().max(0.0) as u32;
    let right = (x1.round().max(0.0) as u32).min(canvas.width());
    for py in top..bottom {
        for px in left..right {
            canvas.get_pixel_mut(px, py).blend(&overlay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{layout_page, SEPARATOR_COLOR};
    use crate::model::{RenderPage, ZodiacReading};
    use chrono::NaiveDate;

    #[test]
    fn gradient_runs_top_to_bottom() {
        let mut canvas = RgbaImage::new(4, 11);
        fill_vertical_gradient(&mut canvas, GRADIENT_START, GRADIENT_END);
        assert_eq!(canvas.get_pixel(0, 0).0, [0xf5, 0xe8, 0xff, 255]);
        assert_eq!(canvas.get_pixel(3, 10).0, [0xe0, 0xf7, 0xfa, 255]);
        assert_eq!(canvas.get_pixel(0, 5), canvas.get_pixel(3, 5));
    }

    #[test]
    fn rule_is_blended_not_painted() {
        let mut canvas = RgbaImage::from_pixel(20, 10, Rgba([255, 255, 255, 255]));
        draw_translucent_rule(&mut canvas, 2.0, 18.0, 4.0, 2.0, SEPARATOR_COLOR, 0.25);
        let inside = canvas.get_pixel(10, 4).0;
        assert_ne!(inside, [255, 255, 255, 255]);
        assert_ne!(&inside[..3], &SEPARATOR_COLOR[..]);
        assert_eq!(canvas.get_pixel(10, 5).0, inside);
        assert_eq!(canvas.get_pixel(10, 6).0, [255, 255, 255, 255]);
        assert_eq!(canvas.get_pixel(1, 4).0, [255, 255, 255, 255]);
    }

    #[test]
    fn missing_font_is_reported() {
        let fonts = config::Fonts {
            regular: "/nonexistent/regular.ttf".into(),
            bold: "/nonexistent/bold.ttf".into(),
            italic: None,
        };
        assert!(matches!(FontSet::load(&fonts), Err(RenderError::Font { .. })));
        assert!(matches!(
            FontSet::from_bytes(vec![1, 2, 3], vec![], None),
            Err(RenderError::Font { .. })
        ));
    }

    /// Renders with a real system font when one is installed.
    #[test]
    fn renders_deterministically_with_system_font() {
        let candidates = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
        ];
        let Some(path) = candidates.iter().find(|p| Path::new(p).exists()) else {
            return;
        };
        let bytes = std::fs::read(path).unwrap();
        let fonts = FontSet::from_bytes(bytes.clone(), bytes, None).unwrap();
        assert!(fonts.text_width(FontStyle::Regular, 25.0, "Avinas") > 0.0);

        let page = RenderPage {
            page_number: 1,
            total_pages: 2,
            zodiacs: vec![ZodiacReading { sign: "ARIES".into(), content: "Puiki diena.".into() }],
        };
        let ops = layout_page(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), &page, &fonts);
        let a = render(&ops, &fonts);
        let b = render(&ops, &fonts);
        assert_eq!(a.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
