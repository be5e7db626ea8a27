use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// File names (not paths) of the regular files directly inside `dir`.
///
/// Used to collect export periods: only the names matter, contents are
/// never opened.
pub fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => debug!(name = ?raw, "skipping non-UTF-8 file name"),
        }
    }
    names.sort();
    Ok(names)
}

/// Expand the command-line inputs into the list of record files to scan.
///
/// A file is taken as-is. A directory contributes the `*.csv` files
/// directly inside it, sorted by name. Missing paths are kept so the
/// batch reports them as failed units instead of dropping them.
pub fn discover_record_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut results = Vec::new();

    for input in inputs {
        if !input.is_dir() {
            results.push(input.clone());
            continue;
        }

        let mut found: Vec<PathBuf> = WalkDir::new(input)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.is_file() && is_csv(p))
            .collect();
        found.sort();
        debug!(dir = %input.display(), files = found.len(), "discovered record files");
        results.extend(found);
    }

    results
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}
