use asymfix::{
    fix_files, fix_findings, write_text, Error, FindingsCollection, FixOptions, FixOutcome,
    FixStatus, FixSummary, OutputCompression, OutputTarget,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, trace, warn};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Findings JSON document produced by `scan`
    #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
    input: Option<PathBuf>,

    /// mmCIF file(s) to fix directly; each is scanned first
    #[arg(short, long)]
    file: Vec<PathBuf>,

    /// Directory that receives the corrected files
    #[arg(
        short,
        long = "output-dir",
        conflicts_with = "in_place",
        required_unless_present = "in_place"
    )]
    output_dir: Option<PathBuf>,

    /// Overwrite the input files
    #[arg(long, default_value_t = false)]
    in_place: bool,

    /// Keep a .bak copy of each file modified in place
    #[arg(long, requires = "in_place", default_value_t = false)]
    backup: bool,

    /// Look up the files named in the findings document below this directory
    #[arg(short, long, requires = "input")]
    source_dir: Option<PathBuf>,

    /// Compression of the corrected files
    #[arg(
        short = 'z',
        long,
        value_enum,
        default_value_t = OutputCompression::Keep,
        conflicts_with = "in_place"
    )]
    compression: OutputCompression,

    /// Also load input and output as atomic models and compare atom and chain counts
    #[arg(long, default_value_t = false)]
    verify_model: bool,

    /// Write per-entry outcomes as JSON to this file
    #[arg(long)]
    outcomes: Option<PathBuf>,
}

pub(crate) fn run(args: &Args) -> ExitCode {
    trace!("{args:?}");

    match execute(args) {
        Ok(summary) if summary.failed == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Fixes the requested entries and returns the run's summary.
fn execute(args: &Args) -> Result<FixSummary, Error> {
    let options = FixOptions {
        target: match &args.output_dir {
            Some(dir) => OutputTarget::Directory(dir.clone()),
            None => OutputTarget::InPlace {
                backup: args.backup,
            },
        },
        compression: args.compression,
        verify_model: args.verify_model,
    };

    let outcomes = match &args.input {
        Some(input) => {
            let findings = FindingsCollection::load(input)?;
            if findings.is_empty() {
                info!("No entries to fix in {}", input.display());
                return Ok(FixSummary::default());
            }
            info!("Fixing {} entries from {}", findings.len(), input.display());
            fix_findings(&findings, args.source_dir.as_deref(), &options)
        }
        None => {
            info!("Fixing {} file(s)", args.file.len());
            fix_files(&args.file, &options)
        }
    };

    let summary = summarize(&outcomes);
    if let Some(path) = &args.outcomes {
        let report = serde_json::json!({
            "summary": summary,
            "results": outcomes,
        });
        let json = serde_json::to_string_pretty(&report).map_err(|source| Error::Findings {
            path: Some(path.clone()),
            source,
        })?;
        write_text(path, &json, false)?;
        info!("Outcomes saved to {}", path.display());
    }
    Ok(summary)
}

fn summarize(outcomes: &[FixOutcome]) -> FixSummary {
    let summary = FixSummary::from_outcomes(outcomes);
    info!(
        "Processed {} entries: {} fixed, {} already consistent, {} failed",
        summary.total, summary.fixed, summary.skipped, summary.failed
    );
    for outcome in outcomes {
        match outcome.status {
            FixStatus::Fixed => info!(
                "  {}: added {:?} -> {}",
                outcome.entry_id,
                outcome.added,
                outcome
                    .output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            FixStatus::AlreadyConsistent => {
                warn!("  {}: nothing to fix", outcome.entry_id)
            }
            FixStatus::Failed => error!(
                "  {}: {}",
                outcome.entry_id,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    summary
}
