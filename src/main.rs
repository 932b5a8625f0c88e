mod cli;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity of the program:
    /// -v for debug and -vv for trace; summaries are always shown
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find entries whose _atom_site chains are missing from _struct_asym
    Scan(cli::scan::Args),
    /// Write corrected copies of affected entries
    Fix(cli::fix::Args),
    /// Export a findings document as a table
    Report(cli::report::Args),
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        Commands::Scan(args) => cli::scan::run(args),
        Commands::Fix(args) => cli::fix::run(args),
        Commands::Report(args) => cli::report::run(args),
    }
}
