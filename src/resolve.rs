//! Per-record date resolution with carry-forward.
//!
//! Harvested rows often lose the date on continuation lines. A row whose
//! own text yields no date takes the date of the most recent row that did;
//! rows before any dated row stay unresolved.

use wareki_types::ResolutionKind;

use crate::wareki::{self, EraDate};

/// Characters of source text kept in each log line.
pub const LOG_PREFIX_CHARS: usize = 50;

// ── Resolution ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Direct(EraDate),
    Inherited(EraDate),
    Unresolved,
}

impl Resolution {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Self::Direct(_) => ResolutionKind::Direct,
            Self::Inherited(_) => ResolutionKind::Inherited,
            Self::Unresolved => ResolutionKind::Unresolved,
        }
    }

    pub fn date(&self) -> Option<EraDate> {
        match self {
            Self::Direct(d) | Self::Inherited(d) => Some(*d),
            Self::Unresolved => None,
        }
    }
}

// ── Scanner ────────────────────────────────────────────────────────

/// Carry-forward state for one record stream.
///
/// Create one per input; state never crosses streams.
#[derive(Debug, Default)]
pub struct CarryForward {
    last: Option<EraDate>,
    position: usize,
}

impl CarryForward {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the next record's text. Returns its 1-based position too.
    pub fn resolve(&mut self, text: &str) -> (usize, Resolution) {
        self.position += 1;
        let resolution = match wareki::parse_era_date(text) {
            Some(d) => {
                self.last = Some(d);
                Resolution::Direct(d)
            }
            None => match self.last {
                Some(d) => Resolution::Inherited(d),
                None => Resolution::Unresolved,
            },
        };
        (self.position, resolution)
    }
}

// ── Log lines ──────────────────────────────────────────────────────

/// First `LOG_PREFIX_CHARS` characters of `text`.
pub fn text_prefix(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREFIX_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// One resolution-log line, e.g.
/// `Line 3: 2024-04-01 (月曜日) [継承]  ← 続き...`
pub fn log_line(position: usize, resolution: &Resolution, text: &str) -> String {
    let prefix = text_prefix(text);
    match resolution {
        Resolution::Direct(d) => format!(
            "Line {position}: {} ({})  ← {prefix}...",
            d.date_string(),
            d.weekday_name()
        ),
        Resolution::Inherited(d) => format!(
            "Line {position}: {} ({}) [継承]  ← {prefix}...",
            d.date_string(),
            d.weekday_name()
        ),
        Resolution::Unresolved => format!("Line {position}: 日付なし / 抽出失敗 ← {prefix}..."),
    }
}
