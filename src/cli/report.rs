use asymfix::{findings_to_df, write_df_to_file, DataFrameFileType, FindingsCollection};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, trace};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Findings JSON document produced by `scan`
    #[arg(short, long)]
    input: PathBuf,

    /// Output file; the extension is set from the output type
    #[arg(short, long)]
    output: PathBuf,

    /// Output file type
    #[arg(short = 't', long, value_enum, default_value_t = DataFrameFileType::Csv)]
    output_format: DataFrameFileType,
}

pub(crate) fn run(args: &Args) -> ExitCode {
    trace!("{args:?}");

    let findings = match FindingsCollection::load(&args.input) {
        Ok(findings) => findings,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut df = match findings_to_df(&findings) {
        Ok(df) => df,
        Err(e) => {
            error!("Failed to tabulate findings: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Findings table\n{df}");

    match write_df_to_file(&mut df, &args.output, args.output_format) {
        Ok(()) => {
            let output_file = args.output.with_extension(args.output_format.to_string());
            info!(
                "{} missing chains in {} entries saved to {}",
                df.height(),
                findings.len(),
                output_file.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to write {}: {e}", args.output.display());
            ExitCode::FAILURE
        }
    }
}
