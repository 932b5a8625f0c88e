use crate::cif::{Block, Category, Document};
use crate::error::Error;
use crate::findings::FindingsCollection;
use crate::io::{read_text, write_text, OutputCompression};
use crate::models::{AsymId, FixOutcome, FixStatus, ScanFinding, StructAsymEntry};
use crate::scan::{entry_id, scan_block};
use crate::verify::{check_model, check_round_trip};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fields of a `_struct_asym` category created from scratch.
pub const STRUCT_ASYM_FIELDS: [&str; 5] = [
    "id",
    "pdbx_blank_PDB_chainid_flag",
    "pdbx_modified",
    "entity_id",
    "details",
];

/// Where corrected files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A directory receiving one file per corrected entry
    Directory(PathBuf),
    /// Overwrite the input, optionally keeping a `.bak` copy
    InPlace { backup: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOptions {
    pub target: OutputTarget,
    pub compression: OutputCompression,
    /// Additionally compare atomic models of input and output with pdbtbx
    pub verify_model: bool,
}

impl FixOptions {
    pub fn into_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            target: OutputTarget::Directory(dir.into()),
            compression: OutputCompression::Keep,
            verify_model: false,
        }
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        match &self.target {
            OutputTarget::Directory(dir) => dir.join(self.compression.file_name_for(input)),
            OutputTarget::InPlace { .. } => input.to_path_buf(),
        }
    }
}

/// Appends `entries` to `_struct_asym`, creating the category when absent.
///
/// Existing rows keep their order. Rows only carry the fields the category
/// already declares; the ids of rows that lost their `entity_id` because the
/// category has no such column are returned.
pub fn insert_struct_asym(block: &mut Block, entries: &[StructAsymEntry]) -> Vec<AsymId> {
    if entries.is_empty() {
        return Vec::new();
    }
    if block.category("_struct_asym").is_none() {
        block.push_category(Category::new("_struct_asym", STRUCT_ASYM_FIELDS));
    }
    let Some(category) = block.category_mut("_struct_asym") else {
        return Vec::new();
    };

    let mut unlinked = Vec::new();
    for entry in entries {
        let dropped = category.push_record(&entry.to_record());
        if dropped.iter().any(|field| field == "entity_id") {
            unlinked.push(entry.id.clone());
        }
    }
    unlinked
}

/// Adds the `_struct_asym` rows a fresh scan of `block` asks for.
///
/// Nothing is changed (and nothing returned) when the block is already
/// consistent, which makes repeated fixes a no-op. When an `expected` finding
/// is given its entity assignments are cross-checked; the fresh scan wins.
pub fn fix_block(
    block: &mut Block,
    expected: Option<&ScanFinding>,
) -> Result<Vec<StructAsymEntry>, Error> {
    let Some(finding) = scan_block(block, Path::new(""))? else {
        return Ok(Vec::new());
    };

    let entries: Vec<StructAsymEntry> = finding
        .details
        .iter()
        .map(|(asym_id, missing)| {
            if let Some(recorded) = expected.and_then(|f| f.entity_of(asym_id)) {
                if recorded != missing.entity_id {
                    warn!(
                        "{}: asym {asym_id} was recorded with entity {recorded}, atoms now say {}",
                        finding.entry_id, missing.entity_id
                    );
                }
            }
            StructAsymEntry::with_defaults(asym_id.as_str(), missing.entity_id.as_str())
        })
        .collect();

    let unlinked = insert_struct_asym(block, &entries);
    if !unlinked.is_empty() {
        warn!(
            "{}: _struct_asym has no entity_id column, rows for {} carry no entity link",
            finding.entry_id,
            unlinked.join(", ")
        );
    }
    Ok(entries)
}

/// A corrected record ready to be written.
#[derive(Debug, Clone)]
pub struct Repair {
    pub entry_id: String,
    pub added: Vec<StructAsymEntry>,
    pub document: Document,
    pub text: String,
}

/// Repairs an in-memory record and verifies the result; `None` means the
/// record needed no change.
pub fn repair_document(
    original: &Document,
    expected: Option<&ScanFinding>,
) -> Result<Option<Repair>, Error> {
    let entry = entry_id(original.first_block());
    if let Some(finding) = expected {
        if !finding.entry_id.eq_ignore_ascii_case(&entry) {
            return Err(Error::EntryNotFound {
                entry: finding.entry_id.clone(),
            });
        }
    }

    let mut corrected = original.clone();
    let added = fix_block(corrected.first_block_mut(), expected)?;
    if added.is_empty() {
        return Ok(None);
    }

    let text = corrected.to_cif_string();
    let document = check_round_trip(&entry, original, &text)?;
    Ok(Some(Repair {
        entry_id: entry,
        added,
        document,
        text,
    }))
}

/// Repairs the entry named by `finding` from a set of already-parsed records.
pub fn fix_records(finding: &ScanFinding, records: &[Document]) -> Result<Option<Repair>, Error> {
    let record = records
        .iter()
        .find(|doc| entry_id(doc.first_block()).eq_ignore_ascii_case(&finding.entry_id))
        .ok_or_else(|| Error::EntryNotFound {
            entry: finding.entry_id.clone(),
        })?;
    repair_document(record, Some(finding))
}

/// Repairs one file and writes the corrected copy according to `options`.
pub fn fix_file(
    input: &Path,
    expected: Option<&ScanFinding>,
    options: &FixOptions,
) -> Result<FixOutcome, Error> {
    let text = read_text(input)?;
    let original = Document::parse(text.as_str()).map_err(|e| e.with_path(input))?;

    let Some(repair) = repair_document(&original, expected)? else {
        let entry = entry_id(original.first_block());
        info!("{entry}: no missing _struct_asym entries, nothing to do");
        return Ok(FixOutcome {
            entry_id: entry,
            input_path: input.to_path_buf(),
            output_path: None,
            status: FixStatus::AlreadyConsistent,
            added: Default::default(),
            error: None,
        });
    };

    if options.verify_model {
        check_model(&repair.entry_id, &text, &repair.text)?;
    }

    let output = options.output_path(input);
    if let OutputTarget::InPlace { backup: true } = options.target {
        let mut backup = input.as_os_str().to_owned();
        backup.push(".bak");
        std::fs::copy(input, &backup)
            .map_err(|e| Error::from_io(e, Some(PathBuf::from(&backup))))?;
        debug!("Backed up {} to {}", input.display(), backup.to_string_lossy());
    }
    write_text(&output, &repair.text, options.compression.gzip_for(input))?;

    info!(
        "{}: added {} to _struct_asym, saved to {}",
        repair.entry_id,
        repair
            .added
            .iter()
            .map(|e| format!("{} (entity {})", e.id, e.entity_id))
            .collect::<Vec<_>>()
            .join(", "),
        output.display()
    );
    Ok(FixOutcome {
        entry_id: repair.entry_id,
        input_path: input.to_path_buf(),
        output_path: Some(output),
        status: FixStatus::Fixed,
        added: repair
            .added
            .into_iter()
            .map(|e| (e.id, e.entity_id))
            .collect(),
        error: None,
    })
}

/// Locates the source file of a finding, optionally below `source_dir`.
fn locate_source(finding: &ScanFinding, source_dir: Option<&Path>) -> Option<PathBuf> {
    let Some(dir) = source_dir else {
        return Some(finding.file_path.clone()).filter(|p| p.is_file());
    };
    let mut candidates = Vec::new();
    if finding.file_path.is_relative() {
        candidates.push(dir.join(&finding.file_path));
    }
    if let Some(name) = finding.file_path.file_name() {
        candidates.push(dir.join(name));
    }
    candidates.into_iter().find(|p| p.is_file())
}

/// Fixes every entry of a findings collection, one after another.
///
/// Failures are turned into [`FixStatus::Failed`] outcomes so that one bad
/// entry never stops the others.
pub fn fix_findings(
    findings: &FindingsCollection,
    source_dir: Option<&Path>,
    options: &FixOptions,
) -> Vec<FixOutcome> {
    findings
        .entries()
        .map(|finding| {
            let Some(path) = locate_source(finding, source_dir) else {
                let err = Error::EntryNotFound {
                    entry: finding.entry_id.clone(),
                };
                warn!("{err}");
                return FixOutcome::failed(&finding.entry_id, finding.file_path.clone(), err);
            };
            fix_file(&path, Some(finding), options).unwrap_or_else(|err| {
                warn!("{err}");
                FixOutcome::failed(&finding.entry_id, path, err)
            })
        })
        .collect()
}

/// Fixes explicitly named files without a prior findings document.
pub fn fix_files(paths: &[PathBuf], options: &FixOptions) -> Vec<FixOutcome> {
    paths
        .iter()
        .map(|path| {
            fix_file(path, None, options).unwrap_or_else(|err| {
                warn!("{err}");
                FixOutcome::failed(path.display().to_string(), path.clone(), err)
            })
        })
        .collect()
}
