//! Re-scan record files and keep the rows whose date falls in a gap.
//!
//! Each file is an independent unit: it gets its own carry-forward state,
//! its own log and output files, and a failure in one file is recorded in
//! the batch summary without stopping the others.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use wareki_types::{BatchSummary, FileFailure, FileSummary};

use crate::error::{Error, Result};
use crate::period::GapSet;
use crate::records::{RecordSource, Row, RowWriter};
use crate::resolve::{self, CarryForward};
use crate::wareki::EraDate;

/// Extra columns appended to every recovered row.
pub const APPENDED_COLUMNS: [&str; 2] = ["resolved_date", "weekday"];

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone)]
pub struct RecoverOptions {
    pub out_dir: PathBuf,
    pub column: String,
}

// ── Gap artifact ───────────────────────────────────────────────────

pub fn load_gap_set(path: &Path) -> Result<GapSet> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    Ok(GapSet::from_lines(content.lines()))
}

pub fn write_gap_set(path: &Path, gaps: &GapSet) -> Result<()> {
    let mut text = gaps.to_lines().join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    fs::write(path, text).map_err(|e| Error::io(path, e))
}

// ── Single stream ──────────────────────────────────────────────────

/// Resolve every row of `source` in order, writing one log line per row.
///
/// `on_dated` is called for each row that ended up with a date (direct or
/// inherited); it returns whether the row was kept, which is counted in
/// `summary.recovered`.
pub fn scan_stream<R, L, F>(
    source: &mut RecordSource<R>,
    log: &mut L,
    summary: &mut FileSummary,
    mut on_dated: F,
) -> Result<()>
where
    R: BufRead,
    L: Write,
    F: FnMut(&Row, EraDate) -> Result<bool>,
{
    let mut carry = CarryForward::new();
    while let Some(row) = source.next_row()? {
        let text = row.text();
        let (position, resolution) = carry.resolve(text);
        writeln!(log, "{}", resolve::log_line(position, &resolution, text))
            .map_err(|e| Error::io(&summary.file, e))?;
        summary.count(resolution.kind());

        if let Some(date) = resolution.date() {
            if on_dated(&row, date)? {
                summary.recovered += 1;
            }
        }
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| Error::io(path, e))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("records")
        .to_string()
}

/// Reserve `stem` for one input, suffixing `_2`, `_3`, ... when an earlier
/// input of the batch already holds it.
fn unique_stem(stem: String, used: &mut HashSet<String>) -> String {
    let mut candidate = stem.clone();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{stem}_{n}");
        n += 1;
    }
    candidate
}

// ── Output files ───────────────────────────────────────────────────
//
// Outputs are written beside their final name with a `.partial` suffix and
// only renamed once the whole stream has been scanned, so a file that fails
// halfway never leaves a truncated log or row file behind.

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn discard_outputs(finals: &[&Path]) {
    for path in finals {
        let _ = fs::remove_file(partial_path(path));
    }
}

fn commit_outputs(finals: &[&Path]) -> Result<()> {
    for (i, path) in finals.iter().enumerate() {
        if let Err(e) = fs::rename(partial_path(path), path) {
            for done in &finals[..i] {
                let _ = fs::remove_file(done);
            }
            discard_outputs(&finals[i..]);
            return Err(Error::io(*path, e));
        }
    }
    Ok(())
}

/// Run `write` against the partial paths of `finals`, then move them into
/// place. On any error every output of this unit is removed.
fn with_outputs<T>(finals: &[&Path], write: impl FnOnce() -> Result<T>) -> Result<T> {
    match write() {
        Ok(value) => {
            commit_outputs(finals)?;
            Ok(value)
        }
        Err(e) => {
            discard_outputs(finals);
            Err(e)
        }
    }
}

/// Write the resolution log for one record file; no rows are kept.
pub fn write_dates_log(csv: &Path, column: &str, log_path: &Path) -> Result<FileSummary> {
    let mut source = RecordSource::open(csv, column)?;
    let mut summary = with_outputs(&[log_path], || {
        let partial = partial_path(log_path);
        let mut log = create(&partial)?;
        let mut summary = FileSummary::new(csv.display().to_string());
        scan_stream(&mut source, &mut log, &mut summary, |_, _| Ok(false))?;
        log.flush().map_err(|e| Error::io(&partial, e))?;
        Ok(summary)
    })?;
    summary.output = Some(log_path.display().to_string());
    Ok(summary)
}

/// Scan one record file against the gap set.
///
/// Writes `<stem>_log.txt` and `<stem>_recovered.csv` into the output
/// directory. The recovered file has the original header plus
/// `resolved_date,weekday`. Either both files appear or neither does.
pub fn recover_file(
    csv: &Path,
    stem: &str,
    gaps: &GapSet,
    opts: &RecoverOptions,
) -> Result<FileSummary> {
    let mut source = RecordSource::open(csv, &opts.column)?;
    let log_path = opts.out_dir.join(format!("{stem}_log.txt"));
    let rows_path = opts.out_dir.join(format!("{stem}_recovered.csv"));

    let mut summary = with_outputs(&[log_path.as_path(), rows_path.as_path()], || {
        let log_partial = partial_path(&log_path);
        let rows_partial = partial_path(&rows_path);
        let mut log = create(&log_partial)?;
        let mut rows = RowWriter::new(create(&rows_partial)?);

        let header: Vec<&str> = source
            .header()
            .iter()
            .map(String::as_str)
            .chain(APPENDED_COLUMNS)
            .collect();
        rows.write_record(header)
            .map_err(|e| Error::io(&rows_partial, e))?;

        let mut summary = FileSummary::new(csv.display().to_string());
        scan_stream(&mut source, &mut log, &mut summary, |row, date| {
            if !gaps.contains(date.date) {
                return Ok(false);
            }
            let date_str = date.date_string();
            let fields = row
                .fields
                .iter()
                .map(String::as_str)
                .chain([date_str.as_str(), date.weekday_name()]);
            rows.write_record(fields)
                .map_err(|e| Error::io(&rows_partial, e))?;
            Ok(true)
        })?;

        log.flush().map_err(|e| Error::io(&log_partial, e))?;
        rows.flush().map_err(|e| Error::io(&rows_partial, e))?;
        Ok(summary)
    })?;

    summary.output = Some(rows_path.display().to_string());
    Ok(summary)
}

// ── Batch ──────────────────────────────────────────────────────────

/// Run `recover_file` over every file, isolating per-file failures,
/// then write `summary.json` into the output directory.
///
/// Inputs sharing a file stem (e.g. `a/7.csv` and `b/7.csv`) get distinct
/// output names.
pub fn run_batch(files: &[PathBuf], gaps: &GapSet, opts: &RecoverOptions) -> Result<BatchSummary> {
    fs::create_dir_all(&opts.out_dir).map_err(|e| Error::io(&opts.out_dir, e))?;

    let mut batch = BatchSummary {
        gaps: gaps.entries(),
        ..BatchSummary::default()
    };
    let mut used_stems = HashSet::new();

    for file in files {
        let base = file_stem(file);
        let stem = unique_stem(base.clone(), &mut used_stems);
        if stem != base {
            warn!(file = %file.display(), stem = %stem, "duplicate file stem, renaming outputs");
        }

        match recover_file(file, &stem, gaps, opts) {
            Ok(summary) => {
                info!(
                    file = %file.display(),
                    rows = summary.rows,
                    unresolved = summary.unresolved,
                    recovered = summary.recovered,
                    "scanned"
                );
                batch.files.push(summary);
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "skipping file");
                batch.failures.push(FileFailure {
                    file: file.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let summary_path = opts.out_dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(&batch)?;
    fs::write(&summary_path, &json).map_err(|e| Error::io(&summary_path, e))?;
    debug!(path = %summary_path.display(), bytes = json.len(), "wrote summary");

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::DateRange;
    use crate::records::TEXT_COLUMN;
    use chrono::NaiveDate;
    use wareki_types::ResolutionKind;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn april_gap() -> GapSet {
        GapSet::new(vec![DateRange::new(ymd(2024, 4, 1), ymd(2024, 4, 3)).unwrap()])
    }

    fn opts(dir: &Path) -> RecoverOptions {
        RecoverOptions {
            out_dir: dir.to_path_buf(),
            column: TEXT_COLUMN.to_string(),
        }
    }

    const RECORDS: &str = "\u{feff}id,display_text\n\
        1,見出し\n\
        2,令和060401月曜日 10時30分\n\
        3,続き\n\
        4,令和060410\n\
        5,続き\n";

    // ── scan_stream ──────────────────────────────────────────────────

    #[test]
    fn test_scan_stream_logs_every_row() {
        let mut source =
            RecordSource::from_reader(RECORDS.as_bytes(), Path::new("r.csv"), TEXT_COLUMN).unwrap();
        let mut log = Vec::new();
        let mut summary = FileSummary::new("r.csv");
        let mut kept = Vec::new();
        scan_stream(&mut source, &mut log, &mut summary, |row, d| {
            kept.push((row.fields[0].clone(), d.date));
            Ok(true)
        })
        .unwrap();

        let log = String::from_utf8(log).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Line 1: 日付なし"));
        assert!(lines[1].starts_with("Line 2: 2024-04-01 (月曜日)  ←"));
        assert!(lines[2].starts_with("Line 3: 2024-04-01 (月曜日) [継承]"));
        assert!(lines[4].starts_with("Line 5: 2024-04-10 (水曜日) [継承]"));

        assert_eq!(summary.rows, 5);
        assert_eq!(summary.direct, 2);
        assert_eq!(summary.inherited, 2);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.recovered, 4);
        // the unresolved row is never offered for retention
        assert_eq!(kept[0], ("2".to_string(), ymd(2024, 4, 1)));
    }

    // ── recover_file ─────────────────────────────────────────────────

    #[test]
    fn test_recover_file_keeps_rows_in_gap() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("records.csv");
        fs::write(&csv, RECORDS).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let summary = recover_file(&csv, "records", &april_gap(), &opts(&out)).unwrap();
        assert_eq!(summary.recovered, 2);

        let recovered = fs::read_to_string(out.join("records_recovered.csv")).unwrap();
        assert_eq!(
            recovered,
            "id,display_text,resolved_date,weekday\n\
             2,令和060401月曜日 10時30分,2024-04-01,月曜日\n\
             3,続き,2024-04-01,月曜日\n"
        );
        let log = fs::read_to_string(out.join("records_log.txt")).unwrap();
        assert_eq!(log.lines().count(), 5);
    }

    #[test]
    fn test_write_dates_log() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("7.csv");
        fs::write(&csv, RECORDS).unwrap();
        let log_path = dir.path().join("result.txt");

        let summary = write_dates_log(&csv, TEXT_COLUMN, &log_path).unwrap();
        assert_eq!(summary.recovered, 0);
        assert_eq!(summary.unresolved, 1);
        let log = fs::read_to_string(&log_path).unwrap();
        assert!(log.starts_with("Line 1: 日付なし / 抽出失敗 ← 見出し..."));
    }

    // ── run_batch ────────────────────────────────────────────────────

    #[test]
    fn test_batch_isolates_failures_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        let bad = dir.path().join("bad.csv");
        fs::write(&a, "display_text\n令和060402\n").unwrap();
        // b starts undated: nothing carries over from a
        fs::write(&b, "display_text\n続き\n令和060403\n").unwrap();
        fs::write(&bad, "id,other\n1,x\n").unwrap();
        let missing = dir.path().join("missing.csv");
        let out = dir.path().join("out");

        let files = vec![a, bad, missing, b];
        let batch = run_batch(&files, &april_gap(), &opts(&out)).unwrap();

        assert_eq!(batch.files.len(), 2);
        assert_eq!(batch.failures.len(), 2);
        assert_eq!(batch.total_recovered(), 2);
        assert_eq!(batch.files[1].unresolved, 1);
        assert_eq!(batch.gaps[0].start, "2024-04-01");

        let json = fs::read_to_string(out.join(SUMMARY_FILE)).unwrap();
        let parsed: BatchSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.files, batch.files);
    }

    #[test]
    fn test_batch_same_stem_in_two_dirs_keeps_both() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        let first = dir.path().join("a").join("7.csv");
        let second = dir.path().join("b").join("7.csv");
        fs::write(&first, "display_text\n令和060401\n").unwrap();
        fs::write(&second, "display_text\n令和060402\n").unwrap();
        let out = dir.path().join("out");

        let batch = run_batch(&[first, second], &april_gap(), &opts(&out)).unwrap();
        assert_eq!(batch.files.len(), 2);
        assert_eq!(batch.total_recovered(), 2);

        let kept_first = fs::read_to_string(out.join("7_recovered.csv")).unwrap();
        let kept_second = fs::read_to_string(out.join("7_2_recovered.csv")).unwrap();
        assert!(kept_first.contains("令和060401,2024-04-01"));
        assert!(kept_second.contains("令和060402,2024-04-02"));
        assert!(out.join("7_2_log.txt").exists());
        assert_ne!(batch.files[0].output, batch.files[1].output);
    }

    #[test]
    fn test_batch_failure_mid_stream_leaves_no_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.csv");
        let mut bytes = "display_text\n令和060401\n".as_bytes().to_vec();
        bytes.extend_from_slice(b"\xff\xfe\n");
        fs::write(&broken, bytes).unwrap();
        let out = dir.path().join("out");

        let batch = run_batch(&[broken], &april_gap(), &opts(&out)).unwrap();
        assert!(batch.files.is_empty());
        assert_eq!(batch.failures.len(), 1);

        let mut names: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![SUMMARY_FILE.to_string()]);
    }

    #[test]
    fn test_unique_stem_suffixes_repeats() {
        let mut used = HashSet::new();
        assert_eq!(unique_stem("7".to_string(), &mut used), "7");
        assert_eq!(unique_stem("7".to_string(), &mut used), "7_2");
        assert_eq!(unique_stem("7".to_string(), &mut used), "7_3");
        assert_eq!(unique_stem("7_2".to_string(), &mut used), "7_2_2");
    }

    #[test]
    fn test_summary_counts_kinds() {
        let mut s = FileSummary::new("x");
        s.count(ResolutionKind::Direct);
        s.count(ResolutionKind::Inherited);
        assert_eq!((s.rows, s.direct, s.inherited), (2, 1, 1));
    }

    // ── gap artifact ─────────────────────────────────────────────────

    #[test]
    fn test_gap_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.txt");
        let gaps = GapSet::new(vec![
            DateRange::new(ymd(2020, 1, 11), ymd(2020, 1, 14)).unwrap(),
            DateRange::new(ymd(2020, 2, 1), ymd(2020, 2, 3)).unwrap(),
        ]);
        write_gap_set(&path, &gaps).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "2020-01-11 ～ 2020-01-14\n2020-02-01 ～ 2020-02-03\n"
        );
        assert_eq!(load_gap_set(&path).unwrap(), gaps);
    }

    #[test]
    fn test_load_gap_set_with_bom_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.txt");
        fs::write(&path, "\u{feff}2020-01-11 ～ 2020-01-14\n⛔ 欠損している期間:\n").unwrap();
        assert_eq!(load_gap_set(&path).unwrap().len(), 1);
    }
}
