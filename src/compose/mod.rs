//! Horoscope story composer.
//!
//! Layout is computed as a flat list of [`DrawOp`]s against a [`TextMeasure`],
//! then rasterised by [`raster`]. Keeping the two apart lets the layout rules
//! be checked without any font files.
use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ContentError, RenderError};
use crate::model::{HoroscopeEntry, RenderPage, ZodiacReading};
use crate::text::{clean_content, format_lt_date, split_sign_off, wrap_text};

pub mod raster;

pub use raster::FontSet;

pub const CANVAS_WIDTH: u32 = 1080;
pub const CANVAS_HEIGHT: u32 = 1920;

#[derive(Debug, Clone, Copy)]
pub struct Padding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

pub const PADDING: Padding = Padding { top: 70.0, right: 50.0, bottom: 50.0, left: 50.0 };

pub const TITLE: &str = "Šios Dienos Horoskopas";
pub const TOTAL_PAGES: usize = 2;

pub const TEXT_COLOR: [u8; 3] = [0x00, 0x00, 0x00];
pub const DATE_COLOR: [u8; 3] = [0x6a, 0x1b, 0x9a];
pub const PAGE_INDICATOR_COLOR: [u8; 3] = [0x6a, 0x1b, 0x9a];
pub const SEPARATOR_COLOR: [u8; 3] = [0xb3, 0x9d, 0xdb];
pub const GRADIENT_START: [u8; 3] = [0xf5, 0xe8, 0xff];
pub const GRADIENT_END: [u8; 3] = [0xe0, 0xf7, 0xfa];

const TITLE_FONT_SIZE: f32 = 68.0;
const DATE_FONT_SIZE: f32 = 46.0;
const ZODIAC_NAME_FONT_SIZE: f32 = 38.0;
const ZODIAC_CONTENT_FONT_SIZE: f32 = 25.0;
const PAGE_INDICATOR_FONT_SIZE: f32 = 38.0;

// Vertical rhythm, in pixels.
const NAME_ADVANCE: f32 = 30.0 * 1.15 + 10.0 + 12.0;
const CONTENT_LINE_HEIGHT: f32 = 23.0 * 1.3 + 2.0;
const ATTRIBUTION_GAP: f32 = 23.0 * 1.3 * 0.7;
const CONTENT_INDENT: f32 = 8.0;
const MARGIN_CONTENT_TO_LINE: f32 = 22.0;
const MARGIN_LINE_TO_NEXT_NAME: f32 = 32.0;
const LINE_THICKNESS: f32 = 2.0;
const SEPARATOR_ALPHA: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
}

/// Width of a run of text in pixels for a given style and pixel size.
pub trait TextMeasure {
    fn text_width(&self, style: FontStyle, size: f32, text: &str) -> f32;
}

/// One primitive of the finished layout. `x`/`y` are the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        text: String,
        x: f32,
        y: f32,
        size: f32,
        style: FontStyle,
        color: [u8; 3],
    },
    Rule {
        x0: f32,
        x1: f32,
        y: f32,
        thickness: f32,
        color: [u8; 3],
        alpha: f32,
    },
}

/// Stable sort by the canonical Aries..Pisces order. Unrecognised signs go first.
pub fn sort_canonical(zodiacs: &[ZodiacReading]) -> Vec<ZodiacReading> {
    let mut sorted = zodiacs.to_vec();
    sorted.sort_by_key(ZodiacReading::order_key);
    sorted
}

/// Split the canonically sorted signs in two at `ceil(n / 2)`.
pub fn paginate(entry: &HoroscopeEntry) -> Result<Vec<RenderPage>, ContentError> {
    if entry.zodiacs.is_empty() {
        return Err(ContentError::Parse("horoscope entry has no zodiac readings".into()));
    }
    let sorted = sort_canonical(&entry.zodiacs);
    let mid = sorted.len().div_ceil(2);
    let (first, second) = sorted.split_at(mid);
    Ok(vec![
        RenderPage { page_number: 1, total_pages: TOTAL_PAGES, zodiacs: first.to_vec() },
        RenderPage { page_number: 2, total_pages: TOTAL_PAGES, zodiacs: second.to_vec() },
    ])
}

/// Select one page (1-based) of an entry.
pub fn page(entry: &HoroscopeEntry, page_number: usize) -> Result<RenderPage, ContentError> {
    paginate(entry)?
        .into_iter()
        .find(|p| p.page_number == page_number)
        .ok_or_else(|| ContentError::Parse(format!("no page {page_number} in horoscope")))
}

struct Layout<'a> {
    measure: &'a dyn TextMeasure,
    ops: Vec<DrawOp>,
    y: f32,
}

impl<'a> Layout<'a> {
    fn centered(&mut self, text: &str, size: f32, style: FontStyle, color: [u8; 3], y: f32) {
        let width = self.measure.text_width(style, size, text);
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            x: CANVAS_WIDTH as f32 / 2.0 - width / 2.0,
            y,
            size,
            style,
            color,
        });
    }

    fn paragraph(&mut self, text: &str, style: FontStyle) {
        let max_width = CANVAS_WIDTH as f32 - PADDING.left - PADDING.right - CONTENT_INDENT;
        let measure = self.measure;
        let lines = wrap_text(text, max_width, |s| {
            measure.text_width(style, ZODIAC_CONTENT_FONT_SIZE, s)
        });
        for line in lines {
            if !line.is_empty() {
                self.ops.push(DrawOp::Text {
                    text: line,
                    x: PADDING.left + CONTENT_INDENT,
                    y: self.y,
                    size: ZODIAC_CONTENT_FONT_SIZE,
                    style,
                    color: TEXT_COLOR,
                });
            }
            self.y += CONTENT_LINE_HEIGHT;
        }
    }

    fn zodiac(&mut self, reading: &ZodiacReading) {
        self.ops.push(DrawOp::Text {
            text: reading.display_name().to_string(),
            x: PADDING.left,
            y: self.y,
            size: ZODIAC_NAME_FONT_SIZE,
            style: FontStyle::Bold,
            color: TEXT_COLOR,
        });
        self.y += NAME_ADVANCE;

        let cleaned = clean_content(&reading.content);
        match split_sign_off(&cleaned) {
            Some(sign_off) => {
                self.paragraph(sign_off.body, FontStyle::Regular);
                self.y += ATTRIBUTION_GAP;
                self.paragraph(sign_off.attribution, FontStyle::Italic);
            }
            None => self.paragraph(&cleaned, FontStyle::Regular),
        }
    }

    fn separator(&mut self) {
        self.y += MARGIN_CONTENT_TO_LINE;
        self.ops.push(DrawOp::Rule {
            x0: PADDING.left,
            x1: CANVAS_WIDTH as f32 - PADDING.right,
            y: self.y,
            thickness: LINE_THICKNESS,
            color: SEPARATOR_COLOR,
            alpha: SEPARATOR_ALPHA,
        });
        self.y += LINE_THICKNESS + MARGIN_LINE_TO_NEXT_NAME;
    }
}

/// Lay out one story page. Signs are drawn in canonical order whatever order
/// the page holds them in. Content running past the bottom edge is not
/// clipped or reflowed.
pub fn layout_page(period_start: NaiveDate, page: &RenderPage, measure: &dyn TextMeasure) -> Vec<DrawOp> {
    let mut layout = Layout { measure, ops: Vec::new(), y: PADDING.top };

    layout.centered(TITLE, TITLE_FONT_SIZE, FontStyle::Bold, TEXT_COLOR, layout.y);
    layout.y += TITLE_FONT_SIZE * 1.1 + 30.0;

    let date = format_lt_date(period_start);
    layout.centered(&date, DATE_FONT_SIZE, FontStyle::Bold, DATE_COLOR, layout.y);
    layout.y += DATE_FONT_SIZE * 1.1 + 40.0;

    let zodiacs = sort_canonical(&page.zodiacs);
    for (i, reading) in zodiacs.iter().enumerate() {
        layout.zodiac(reading);
        if i + 1 < zodiacs.len() {
            layout.separator();
        }
    }

    if page.total_pages > 1 {
        let indicator = format!("{}/{}", page.page_number, page.total_pages);
        let y = CANVAS_HEIGHT as f32 - PADDING.bottom - 20.0 + 16.0;
        layout.centered(&indicator, PAGE_INDICATOR_FONT_SIZE, FontStyle::Bold, PAGE_INDICATOR_COLOR, y);
    }

    debug!(page = page.page_number, ops = layout.ops.len(), bottom = layout.y, "laid out horoscope page");
    layout.ops
}

/// Render one page of `entry` to a PNG at `output_path`, creating parent
/// directories as needed.
pub fn compose_horoscope_page(
    entry: &HoroscopeEntry,
    page: &RenderPage,
    output_path: &Path,
    fonts: &FontSet,
) -> Result<(), RenderError> {
    let ops = layout_page(entry.period_start, page, fonts);
    let image = raster::render(&ops, fonts);
    if let Some(dir) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    image.save(output_path)?;
    info!(path=%output_path.display(), page = page.page_number, "horoscope image saved");
    Ok(())
}
