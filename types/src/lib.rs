use serde::{Deserialize, Serialize};

// ── Resolution kind ──────────────────────────────────────────────────────

/// How a record's date was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionKind {
    /// Parsed from the record's own text.
    Direct,
    /// Copied from the most recent directly-parsed record.
    Inherited,
    /// No date in the record and none seen before it.
    Unresolved,
}

// ── Gap entry ────────────────────────────────────────────────────────────

/// One missing date range, both ends inclusive, as `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapEntry {
    pub start: String,
    pub end: String,
}

// ── Per-file statistics ──────────────────────────────────────────────────

/// Counters for one scanned record file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: String,
    pub rows: usize,
    pub direct: usize,
    pub inherited: usize,
    pub unresolved: usize,
    /// Rows whose resolved date falls inside a gap.
    pub recovered: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl FileSummary {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    /// Bump the counter matching `kind`.
    pub fn count(&mut self, kind: ResolutionKind) {
        self.rows += 1;
        match kind {
            ResolutionKind::Direct => self.direct += 1,
            ResolutionKind::Inherited => self.inherited += 1,
            ResolutionKind::Unresolved => self.unresolved += 1,
        }
    }
}

/// A file that could not be processed; the rest of the batch still ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

// ── Batch output ─────────────────────────────────────────────────────────

/// JSON summary written after a `recover` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub gaps: Vec<GapEntry>,
    pub files: Vec<FileSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FileFailure>,
}

impl BatchSummary {
    pub fn total_recovered(&self) -> usize {
        self.files.iter().map(|f| f.recovered).sum()
    }
}
