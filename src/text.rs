//! Text preparation for the horoscope story: markup cleanup, sign-off
//! detection, greedy word wrapping and Lithuanian date formatting.
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#?\w+;").unwrap());
static SPECIAL_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{00A0}\x{2000}-\x{200D}\x{202F}\x{205F}\x{3000}]").unwrap());
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s\s+").unwrap());
static TRAILING_GREETING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Geros dienos\.$").unwrap());
static SIGN_OFF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(Geros dienos\.)\s*(Horoskopą parengė.*)$").unwrap());

const LT_MONTHS_GENITIVE: [&str; 12] = [
    "sausio",
    "vasario",
    "kovo",
    "balandžio",
    "gegužės",
    "birželio",
    "liepos",
    "rugpjūčio",
    "rugsėjo",
    "spalio",
    "lapkričio",
    "gruodžio",
];

/// Strip markup, entities and exotic whitespace from an API text, and drop a
/// bare trailing "Geros dienos." greeting.
pub fn clean_content(raw: &str) -> String {
    let cleaned = TAG_RE.replace_all(raw, " ");
    let cleaned = ENTITY_RE.replace_all(cleaned.trim(), " ");
    let cleaned = SPECIAL_SPACE_RE.replace_all(&cleaned, " ");
    let cleaned = MULTI_SPACE_RE.replace_all(cleaned.trim(), " ");
    let cleaned = TRAILING_GREETING_RE.replace(cleaned.trim(), "");
    cleaned.trim().to_string()
}

/// Body text split into the prediction and the author attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOff<'a> {
    /// Everything up to and including "Geros dienos.".
    pub body: &'a str,
    /// "Horoskopą parengė ..." through the end of the text.
    pub attribution: &'a str,
}

/// Detect a closing greeting followed by an attribution clause.
pub fn split_sign_off(text: &str) -> Option<SignOff<'_>> {
    let caps = SIGN_OFF_RE.captures(text)?;
    let greeting = caps.get(1)?;
    let attribution = caps.get(2)?;
    Some(SignOff {
        body: text[..greeting.end()].trim(),
        attribution: attribution.as_str().trim(),
    })
}

/// Greedy word wrap. Words accumulate while the measured width of the
/// candidate line (with its trailing space) stays within `max_width`; a line
/// is never broken inside a word, so an over-long single word gets its own
/// line.
pub fn wrap_text<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut line = String::new();

    for (n, word) in text.split_whitespace().enumerate() {
        let candidate = format!("{line}{word} ");
        if measure(&candidate) > max_width && n > 0 {
            lines.push(line.trim().to_string());
            line = format!("{word} ");
        } else {
            line = candidate;
        }
    }
    lines.push(line.trim().to_string());
    lines
}

/// Long Lithuanian date, e.g. `2025 m. birželio 1 d.`
pub fn format_lt_date(date: NaiveDate) -> String {
    let month = LT_MONTHS_GENITIVE[date.month0() as usize];
    format!("{} m. {} {} d.", date.year(), month, date.day())
}
