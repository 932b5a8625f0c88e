use asymfix::{default_workers, enumerate_cif_files, scan_files, Error, FindingsCollection};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, trace, warn};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// mmCIF file(s) to scan (plain or gzipped); repeat the flag for several files
    #[arg(short, long, conflicts_with = "mirror", required_unless_present = "mirror")]
    file: Vec<PathBuf>,

    /// Root of a PDB mirror; every *.cif and *.cif.gz below it is scanned
    #[arg(short, long)]
    mirror: Option<PathBuf>,

    /// Findings JSON document to write (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of threads to use for parallel scanning (0 for all cores)
    #[arg(short = 'j', long = "workers", default_value_t = default_workers())]
    workers: usize,

    /// Only scan the first N files (in path order)
    #[arg(short, long)]
    limit: Option<usize>,

    /// Merge into the existing document at --output instead of replacing it
    #[arg(long, requires = "output", default_value_t = false)]
    merge: bool,
}

pub(crate) fn run(args: &Args) -> ExitCode {
    trace!("{args:?}");

    match execute(args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            warn!("{failed} file(s) could not be scanned");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Scans, saves the findings and returns how many files failed in this run.
fn execute(args: &Args) -> Result<usize, Error> {
    let mut files = match &args.mirror {
        Some(mirror) => {
            let files = enumerate_cif_files(mirror)?;
            info!("Found {} mmCIF files below {}", files.len(), mirror.display());
            files
        }
        None => args.file.clone(),
    };
    if let Some(limit) = args.limit {
        if limit < files.len() {
            info!("Limiting the scan to the first {limit} files");
            files.truncate(limit);
        }
    }

    let findings = scan_files(&files, args.workers);
    let failed = findings.failures().len();
    summarize(&findings);

    let findings = match (&args.output, args.merge) {
        (Some(path), true) if path.exists() => {
            let mut previous = FindingsCollection::load(path)?;
            debug!(
                "Merging into {} ({} earlier entries)",
                path.display(),
                previous.len()
            );
            previous.merge(findings);
            previous
        }
        _ => findings,
    };

    match &args.output {
        Some(path) => {
            findings.save(path)?;
            info!("Results saved to {}", path.display());
        }
        None => println!("{}", findings.to_json()?),
    }
    Ok(failed)
}

fn summarize(findings: &FindingsCollection) {
    let affected = findings.len();
    let percentage = match findings.total_scanned {
        0 => 0.0,
        n => affected as f64 / n as f64 * 100.0,
    };
    info!(
        "Scanned {} entries: {} with missing _struct_asym rows ({percentage:.2}%), {} failed",
        findings.total_scanned,
        affected,
        findings.failures().len()
    );
    for finding in findings.entries() {
        info!(
            "  {}: missing {} ({} atoms)",
            finding.entry_id,
            finding
                .details
                .iter()
                .map(|(asym, m)| format!("{asym} -> entity {} [{}]", m.entity_id, m.comp_ids.join(",")))
                .collect::<Vec<_>>()
                .join(", "),
            finding.total_atoms()
        );
    }
    for (key, message) in findings.failures() {
        error!("  {key}: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn test_data(name: &str) -> String {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("test-data")
            .join(name)
            .display()
            .to_string()
    }

    fn scan_args(extra: &[&str]) -> Args {
        let mut argv = vec!["scan".to_string()];
        argv.extend(extra.iter().map(ToString::to_string));
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn clean_batch_reports_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("findings.json");
        let args = scan_args(&[
            "-f",
            &test_data("1ubq_fragment.cif"),
            "-f",
            &test_data("2g10_fragment.cif"),
            "-o",
            &output.display().to_string(),
        ]);

        assert_eq!(execute(&args).unwrap(), 0);
        let findings = FindingsCollection::load(&output).unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn one_bad_file_fails_the_batch_but_not_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("findings.json");
        let args = scan_args(&[
            "-f",
            &test_data("broken.cif"),
            "-f",
            &test_data("2k9y_fragment.cif"),
            "-o",
            &output.display().to_string(),
        ]);

        assert_eq!(execute(&args).unwrap(), 1);
        let findings = FindingsCollection::load(&output).unwrap();
        assert!(findings.get("2K9Y").is_some());
        assert_eq!(findings.failures().len(), 1);
    }

    #[test]
    fn missing_mirror_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = scan_args(&["-m", &dir.path().join("absent").display().to_string()]);
        assert!(execute(&args).is_err());
    }
}
