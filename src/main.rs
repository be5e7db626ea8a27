mod era;
mod error;
mod period;
mod records;
mod recover;
mod resolve;
mod scanner;
mod wareki;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use period::GapSet;
use recover::RecoverOptions;

const OUTPUT_DIR: &str = "output";
const DATES_LOG_FILE: &str = "result.txt";

fn default_dates_log() -> PathBuf {
    Path::new(OUTPUT_DIR).join(DATES_LOG_FILE)
}

#[derive(Parser)]
#[command(
    name = "wareki_gaps",
    about = "Find missing export periods and recover era-dated records that fall in them",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List gaps between exported periods (output_<start>_<end>_<label>.csv)
    Gaps {
        /// Directory holding the export files
        dir: PathBuf,
        /// Only use export files with this label, e.g. "破産"
        #[arg(long)]
        label: Option<String>,
        /// Also write the gaps, one "start ～ end" per line, to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write the per-row date resolution log for one record file
    Dates {
        /// Record CSV file
        csv: PathBuf,
        /// Log file to write
        #[arg(long, default_value_os_t = default_dates_log())]
        out: PathBuf,
        /// Name of the free-text column
        #[arg(long, default_value = records::TEXT_COLUMN)]
        column: String,
    },
    /// Re-scan record files and keep rows dated inside a gap
    Recover {
        /// Gap file written by `gaps --out`
        gaps: PathBuf,
        /// Record CSV files, or directories of them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Where logs, recovered rows and summary.json are written
        #[arg(long, default_value = OUTPUT_DIR)]
        out_dir: PathBuf,
        /// Name of the free-text column
        #[arg(long, default_value = records::TEXT_COLUMN)]
        column: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Gaps { dir, label, out } => run_gaps(&dir, label.as_deref(), out.as_deref()),
        Command::Dates { csv, out, column } => run_dates(&csv, &out, &column),
        Command::Recover {
            gaps,
            inputs,
            out_dir,
            column,
        } => run_recover(&gaps, &inputs, RecoverOptions { out_dir, column }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  GAPS MODE: export file names → missing periods
// ═══════════════════════════════════════════════════════════════════════

fn run_gaps(dir: &Path, label: Option<&str>, out: Option<&Path>) -> error::Result<()> {
    let names = scanner::list_file_names(dir)?;
    let periods = period::periods_from_names(&names, label);
    info!(
        dir = %dir.display(),
        files = names.len(),
        periods = periods.len(),
        "collected export periods"
    );

    let gaps = GapSet::from_periods(&periods);

    if gaps.is_empty() {
        info!("no gaps between collected periods");
    }

    println!("⛔ 欠損している期間:");
    for line in gaps.to_lines() {
        println!("{line}");
    }

    if let Some(path) = out {
        ensure_parent(path)?;
        recover::write_gap_set(path, &gaps)?;
        info!(path = %path.display(), gaps = gaps.len(), "wrote gap file");
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  DATES MODE: one record file → resolution log
// ═══════════════════════════════════════════════════════════════════════

fn run_dates(csv: &Path, out: &Path, column: &str) -> error::Result<()> {
    ensure_parent(out)?;
    let summary = recover::write_dates_log(csv, column, out)?;
    info!(
        rows = summary.rows,
        direct = summary.direct,
        inherited = summary.inherited,
        unresolved = summary.unresolved,
        "✅ 結果を保存しました: {}",
        out.display()
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  RECOVER MODE: gap file + record files → rows dated inside gaps
// ═══════════════════════════════════════════════════════════════════════

fn run_recover(gaps_path: &Path, inputs: &[PathBuf], opts: RecoverOptions) -> error::Result<()> {
    let gaps = recover::load_gap_set(gaps_path)?;
    info!(path = %gaps_path.display(), gaps = gaps.len(), "loaded gaps");

    let files = scanner::discover_record_files(inputs);
    let batch = recover::run_batch(&files, &gaps, &opts)?;

    info!(
        files = batch.files.len(),
        failed = batch.failures.len(),
        recovered = batch.total_recovered(),
        out_dir = %opts.out_dir.display(),
        "recovery finished"
    );
    Ok(())
}

fn ensure_parent(path: &Path) -> error::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| error::Error::io(parent, e))
        }
        _ => Ok(()),
    }
}
