//! Date ranges: collected export periods, the gaps between them, and
//! the one-line-per-gap text artifact.
//!
//! Export files are named `output_YYYY-MM-DD_YYYY-MM-DD_<label>.csv`.
//! Names that do not match, or whose dates are not real dates, are
//! skipped without complaint: the directory is curated by hand and
//! stray files are expected.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use tracing::debug;
use wareki_types::GapEntry;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Separator between the two dates of a gap line (full-width tilde).
pub const GAP_SEPARATOR: &str = "～";

// ── Regex patterns ─────────────────────────────────────────────────

static RE_EXPORT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^output_(?P<start>\d{4}-\d{2}-\d{2})_(?P<end>\d{4}-\d{2}-\d{2})_(?P<label>[^.]+)",
    )
    .unwrap()
});

static RE_GAP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<start>\d{4}-\d{2}-\d{2}) ～ (?P<end>\d{4}-\d{2}-\d{2})").unwrap()
});

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

// ── DateRange ──────────────────────────────────────────────────────

/// Inclusive `[start, end]` range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `None` if `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Parse a `YYYY-MM-DD ～ YYYY-MM-DD` line. Anything after the end
    /// date is ignored; lines that do not start that way give `None`.
    pub fn parse_gap_line(line: &str) -> Option<Self> {
        let caps = RE_GAP_LINE.captures(line)?;
        let start = parse_date(caps.name("start")?.as_str())?;
        let end = parse_date(caps.name("end")?.as_str())?;
        Self::new(start, end)
    }

    pub fn to_entry(&self) -> GapEntry {
        GapEntry {
            start: self.start.format(DATE_FORMAT).to_string(),
            end: self.end.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Gap-line form: `2020-01-11 ～ 2020-01-14`.
impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {GAP_SEPARATOR} {}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

// ── Period ─────────────────────────────────────────────────────────

/// A collected export period, taken from its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub range: DateRange,
    pub label: String,
}

impl Period {
    /// Parse `output_<start>_<end>_<label>[.ext]`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let caps = RE_EXPORT_NAME.captures(name)?;
        let start = parse_date(caps.name("start")?.as_str())?;
        let end = parse_date(caps.name("end")?.as_str())?;
        Some(Period {
            range: DateRange::new(start, end)?,
            label: caps.name("label")?.as_str().to_string(),
        })
    }
}

/// Extract periods from raw file names, optionally keeping only one label.
pub fn periods_from_names<I, S>(names: I, label: Option<&str>) -> Vec<Period>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut periods = Vec::new();
    for name in names {
        let name = name.as_ref();
        let period = match Period::from_file_name(name) {
            Some(p) => p,
            None => {
                debug!(name, "skipping non-export file name");
                continue;
            }
        };
        if label.is_some_and(|l| l != period.label) {
            debug!(name, label = %period.label, "skipping other label");
            continue;
        }
        periods.push(period);
    }
    periods
}

// ── Gap detection ──────────────────────────────────────────────────

/// Ranges between collected periods that no period covers.
///
/// Periods are sorted by start date first, so the result does not depend
/// on input order. Only interior gaps are reported: nothing before the
/// earliest period or after the latest. Coverage is tracked as the latest
/// end seen so far, so a period nested inside a longer one never opens a
/// gap the longer one covers.
pub fn find_gaps(periods: &[Period]) -> Vec<DateRange> {
    let mut ranges: Vec<DateRange> = periods.iter().map(|p| p.range).collect();
    ranges.sort();

    let mut gaps = Vec::new();
    let Some(first) = ranges.first() else {
        return gaps;
    };
    let mut covered_until = first.end;
    for curr in &ranges[1..] {
        if let Some(expected) = covered_until.checked_add_days(Days::new(1)) {
            if curr.start > expected {
                if let Some(last_missing) = curr.start.checked_sub_days(Days::new(1)) {
                    if let Some(gap) = DateRange::new(expected, last_missing) {
                        gaps.push(gap);
                    }
                }
            }
        }
        covered_until = covered_until.max(curr.end);
    }
    gaps
}

// ── GapSet ─────────────────────────────────────────────────────────

/// The set of missing ranges, queried per record date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapSet {
    ranges: Vec<DateRange>,
}

impl GapSet {
    pub fn new(ranges: Vec<DateRange>) -> Self {
        GapSet { ranges }
    }

    pub fn from_periods(periods: &[Period]) -> Self {
        Self::new(find_gaps(periods))
    }

    /// Parse gap lines; lines that don't start with a gap are skipped.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ranges = Vec::new();
        for line in lines {
            let line = line.as_ref();
            match DateRange::parse_gap_line(line) {
                Some(r) => ranges.push(r),
                None => debug!(line, "skipping non-gap line"),
            }
        }
        Self::new(ranges)
    }

    /// One `start ～ end` line per gap.
    pub fn to_lines(&self) -> Vec<String> {
        self.ranges.iter().map(|r| r.to_string()).collect()
    }

    /// Whether `date` falls inside any gap (bounds inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.ranges.iter().any(|r| r.contains(date))
    }

    #[cfg(test)]
    pub fn ranges(&self) -> &[DateRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn entries(&self) -> Vec<GapEntry> {
        self.ranges.iter().map(DateRange::to_entry).collect()
    }
}
