//! Japanese-era date extraction from free text.
//!
//! Extraction is a two-stage tokenizer:
//!   1. locate the weekday boundary (月曜日 … 日曜日) and cut the text there,
//!      so clock times and other digits written after the date are ignored;
//!   2. inside that window, locate the first era name followed by a run of
//!      3–6 digits (full-width or half-width).
//!
//! The digit run is then split into year/month/day by its length alone:
//!
//!   len | year | month | day
//!   ----+------+-------+----
//!    3  |  1   |   1   |  1
//!    4  |  2   |   1   |  1
//!    5  |  2   |   1   |  2
//!    6  |  2   |   2   |  2
//!
//! Real data examples:
//!   令和０６０４０１月曜日午前１０時
//!   平成30401金曜日
//!   昭和591
//!
//! Digits separated by 年/月/日 (令和６年４月１日) are not a numeral run
//! and do not match.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Weekday};
use regex::Regex;

use crate::era::{self, Era};

// ── Regex patterns ─────────────────────────────────────────────────

static RE_WEEKDAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:月|火|水|木|金|土|日)曜日").unwrap());

static RE_ERA_NUMERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?P<era>{})(?P<digits>[0-9０-９]{{3,6}})",
        era::build_era_regex()
    ))
    .unwrap()
});

// ── Result type ────────────────────────────────────────────────────

/// A Gregorian date reconstructed from era notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraDate {
    pub date: NaiveDate,
    pub weekday: Weekday,
}

impl EraDate {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            weekday: date.weekday(),
        }
    }

    pub fn weekday_name(&self) -> &'static str {
        weekday_name(self.weekday)
    }

    /// `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Japanese weekday name, e.g. `月曜日` for Monday.
pub fn weekday_name(w: Weekday) -> &'static str {
    match w {
        Weekday::Mon => "月曜日",
        Weekday::Tue => "火曜日",
        Weekday::Wed => "水曜日",
        Weekday::Thu => "木曜日",
        Weekday::Fri => "金曜日",
        Weekday::Sat => "土曜日",
        Weekday::Sun => "日曜日",
    }
}

// ── Stage 1: weekday boundary ──────────────────────────────────────

/// The part of `text` strictly before the first weekday token,
/// or the whole text if there is none.
pub fn date_window(text: &str) -> &str {
    match RE_WEEKDAY.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

// ── Stage 2: era + numeral run ─────────────────────────────────────

/// Full-width digits (０–９) → ASCII digits. Other characters pass through.
pub fn normalize_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// First era name followed by 3–6 digits, with the digits normalized to ASCII.
pub fn find_era_numeral(window: &str) -> Option<(Era, String)> {
    let caps = RE_ERA_NUMERAL.captures(window)?;
    let era = Era::from_japanese(caps.name("era")?.as_str())?;
    let digits = normalize_digits(caps.name("digits")?.as_str());
    Some((era, digits))
}

/// Split an ASCII digit run into (in-era year, month, day) by its length.
pub fn split_numeral_run(digits: &str) -> Option<(u32, u32, u32)> {
    if !digits.is_ascii() {
        return None;
    }
    let (y, m, d) = match digits.len() {
        3 => (&digits[..1], &digits[1..2], &digits[2..]),
        4 => (&digits[..2], &digits[2..3], &digits[3..]),
        5 => (&digits[..2], &digits[2..3], &digits[3..]),
        6 => (&digits[..2], &digits[2..4], &digits[4..]),
        _ => return None,
    };
    Some((y.parse().ok()?, m.parse().ok()?, d.parse().ok()?))
}

// ── Public entry point ─────────────────────────────────────────────

/// Extract the era date written in `text`, if any.
///
/// Returns `None` when no era+digits token precedes the first weekday
/// name, or when the digits do not form a real calendar date.
pub fn parse_era_date(text: &str) -> Option<EraDate> {
    let window = date_window(text);
    let (era, digits) = find_era_numeral(window)?;
    let (year, month, day) = split_numeral_run(&digits)?;
    let date = NaiveDate::from_ymd_opt(era.to_gregorian(year), month, day)?;
    Some(EraDate::new(date))
}
