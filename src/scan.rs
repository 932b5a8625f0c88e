use crate::cif::{Block, Value};
use crate::error::Error;
use crate::findings::FindingsCollection;
use crate::io::read_document;
use crate::models::{AsymId, AtomRecord, EntityId, MissingAsym, ScanFinding};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Entry identifier of a block: its name, upper-cased (`data_2g10` -> `2G10`).
pub fn entry_id(block: &Block) -> String {
    block.name().to_ascii_uppercase()
}

/// Reads the `_atom_site` fields relevant to chain bookkeeping.
///
/// A block without `_atom_site` has no atom records.
pub fn atom_records(block: &Block) -> Vec<AtomRecord> {
    let Some(atom_site) = block.category("_atom_site") else {
        return Vec::new();
    };
    let text_at = |row: &[Value], idx: Option<usize>| {
        idx.and_then(|i| row[i].as_str())
            .map(ToString::to_string)
    };
    let asym_idx = atom_site.field_index("label_asym_id");
    let entity_idx = atom_site.field_index("label_entity_id");
    let comp_idx = atom_site.field_index("label_comp_id");
    if asym_idx.is_none() {
        debug!("_atom_site of {} has no label_asym_id column", block.name());
    }

    atom_site
        .rows()
        .iter()
        .map(|row| AtomRecord {
            label_asym_id: text_at(row, asym_idx),
            label_entity_id: text_at(row, entity_idx),
            label_comp_id: text_at(row, comp_idx),
        })
        .collect()
}

/// The set of chain ids declared in `_struct_asym`; empty when the category is absent.
pub fn struct_asym_ids(block: &Block) -> BTreeSet<AsymId> {
    block
        .category("_struct_asym")
        .and_then(|c| c.column("id"))
        .map(|ids| ids.filter_map(Value::as_str).map(ToString::to_string).collect())
        .unwrap_or_default()
}

#[derive(Default)]
struct ChainTally {
    entities: BTreeSet<EntityId>,
    comp_ids: BTreeSet<String>,
    atoms: usize,
}

/// Compares the chains used by `_atom_site` with those declared in `_struct_asym`.
///
/// Returns `None` when every atom-side chain is declared. Each missing chain
/// must be linked to exactly one entity by its atoms, otherwise the entry is
/// reported as [`Error::AmbiguousEntity`] or [`Error::UnresolvedEntity`].
pub fn scan_block(block: &Block, file_path: &Path) -> Result<Option<ScanFinding>, Error> {
    let entry = entry_id(block);
    let declared = struct_asym_ids(block);

    let mut chains: BTreeMap<AsymId, ChainTally> = BTreeMap::new();
    for record in atom_records(block) {
        let Some(asym_id) = record.label_asym_id else {
            continue;
        };
        let tally = chains.entry(asym_id).or_default();
        tally.atoms += 1;
        tally.entities.extend(record.label_entity_id);
        tally.comp_ids.extend(record.label_comp_id);
    }
    trace!(
        "{entry}: {} chains in _atom_site, {} in _struct_asym",
        chains.len(),
        declared.len()
    );

    let mut details = BTreeMap::new();
    for (asym_id, tally) in chains {
        if declared.contains(&asym_id) {
            continue;
        }
        let entity_id = match tally.entities.len() {
            0 => {
                return Err(Error::UnresolvedEntity {
                    entry,
                    asym_id,
                })
            }
            1 => tally.entities.into_iter().next().unwrap_or_default(),
            _ => {
                return Err(Error::AmbiguousEntity {
                    entry,
                    asym_id,
                    entity_ids: tally.entities.into_iter().collect(),
                })
            }
        };
        details.insert(
            asym_id,
            MissingAsym {
                entity_id,
                atom_count: tally.atoms,
                comp_ids: tally.comp_ids.into_iter().collect(),
            },
        );
    }

    if details.is_empty() {
        return Ok(None);
    }
    debug!("{entry}: missing from _struct_asym: {:?}", details.keys());
    Ok(Some(ScanFinding {
        entry_id: entry,
        file_path: file_path.to_path_buf(),
        missing_asym_ids: details.keys().cloned().collect(),
        details,
    }))
}

/// Outcome of scanning one file that parsed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileScan {
    Clean { entry_id: String },
    Finding(ScanFinding),
}

/// Scans the first data block of a (possibly gzipped) mmCIF file.
pub fn scan_file(path: &Path) -> Result<FileScan, Error> {
    let doc = read_document(path)?;
    let block = doc.first_block();
    Ok(match scan_block(block, path)? {
        Some(finding) => FileScan::Finding(finding),
        None => FileScan::Clean {
            entry_id: entry_id(block),
        },
    })
}

/// Scans many files on a dedicated rayon pool of `workers` threads (0 uses all cores).
///
/// Every worker fills its own partial collection; partials are merged at the
/// end, so the result does not depend on scheduling. A file that fails is
/// recorded under its entry id when known (or its path) and the rest continue.
pub fn scan_files(paths: &[PathBuf], workers: usize) -> FindingsCollection {
    let scan = || {
        paths
            .par_iter()
            .fold(FindingsCollection::default, |mut partial, path| {
                record_scan(&mut partial, path, scan_file(path));
                partial
            })
            .reduce(FindingsCollection::default, |mut a, b| {
                a.merge(b);
                a
            })
    };

    let mut collection = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
    {
        Ok(pool) => {
            debug!("Scanning with {} thread(s)", pool.current_num_threads());
            pool.install(scan)
        }
        Err(e) => {
            warn!("Failed to build a thread pool ({e}); using the global pool");
            scan()
        }
    };
    collection.stamp_today();
    collection
}

fn record_scan(collection: &mut FindingsCollection, path: &Path, result: Result<FileScan, Error>) {
    match result {
        Ok(FileScan::Clean { entry_id }) => collection.record_clean(&entry_id, path),
        Ok(FileScan::Finding(finding)) => collection.insert(finding),
        Err(e) => {
            let key = match &e {
                Error::AmbiguousEntity { entry, .. } | Error::UnresolvedEntity { entry, .. } => {
                    entry.clone()
                }
                _ => path.display().to_string(),
            };
            warn!("{e}");
            collection.record_failure(key, path, &e);
        }
    }
}
