#![doc = include_str!("../README.md")]

//! # asymfix library
//!
//! Finds mmCIF entries whose `_atom_site` records use a `label_asym_id` that
//! `_struct_asym` never declares, and writes corrected copies that add the
//! missing `_struct_asym` rows without touching anything else.
//!
//! ```no_run
//! use asymfix::{scan_file, fix_file, FileScan, FixOptions};
//! use std::path::Path;
//!
//! let input = Path::new("path/to/2g10.cif.gz");
//! if let FileScan::Finding(finding) = scan_file(input).unwrap() {
//!     println!("{} lacks {:?}", finding.entry_id, finding.missing_asym_ids);
//!     fix_file(input, Some(&finding), &FixOptions::into_dir("fixed")).unwrap();
//! }
//! ```

pub mod cif;
mod error;
mod findings;
mod fix;
mod io;
mod models;
mod report;
mod scan;
mod verify;

// Re-export key public types
pub use error::Error;
pub use findings::FindingsCollection;
pub use fix::{
    fix_block, fix_file, fix_files, fix_findings, fix_records, insert_struct_asym,
    repair_document, FixOptions, OutputTarget, Repair, STRUCT_ASYM_FIELDS,
};
pub use io::{
    enumerate_cif_files, is_cif_path, read_document, read_text, write_text, OutputCompression,
};
pub use models::{
    AsymId, AtomRecord, EntityId, FixOutcome, FixStatus, FixSummary, MissingAsym, ScanFinding,
    StructAsymEntry,
};
pub use report::{findings_to_df, write_df_to_file, DataFrameFileType};
pub use scan::{
    atom_records, entry_id, scan_block, scan_file, scan_files, struct_asym_ids, FileScan,
};
pub use verify::{check_model, check_round_trip, load_structure};

/// Default size of the scan worker pool: half the available cores, between 1 and 8.
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism().map_or(4, |n| n.get());
    (cores / 2).clamp(1, 8)
}
