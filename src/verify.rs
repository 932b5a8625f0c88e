use crate::cif::Document;
use crate::error::Error;
use crate::scan::scan_block;
use pdbtbx::{ErrorLevel, Format, ReadOptions, StrictnessLevel, PDB};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

/// Re-reads a corrected record and checks it against the original.
///
/// Every category other than `_struct_asym` must come back field for field
/// identical, the original `_struct_asym` rows must lead the category
/// unchanged, and a fresh scan must find nothing left to fix.
pub fn check_round_trip(entry: &str, original: &Document, rendered: &str) -> Result<Document, Error> {
    let fail = |details: String| Error::serialization(entry, details);

    let reparsed =
        Document::parse(rendered).map_err(|e| fail(format!("output does not parse: {e}")))?;
    if reparsed.blocks().len() != original.blocks().len() {
        return Err(fail(format!(
            "expected {} data blocks, found {}",
            original.blocks().len(),
            reparsed.blocks().len()
        )));
    }

    for (before, after) in original.blocks().iter().zip(reparsed.blocks()) {
        if before.name() != after.name() {
            return Err(fail(format!(
                "block data_{} was renamed to data_{}",
                before.name(),
                after.name()
            )));
        }
        for category in before.categories() {
            let Some(written) = after.category(category.name()) else {
                return Err(fail(format!("category {} was lost", category.name())));
            };
            if category.name().eq_ignore_ascii_case("_struct_asym") {
                let kept = written.len() >= category.len()
                    && written.rows()[..category.len()] == *category.rows();
                if !kept {
                    return Err(fail("original _struct_asym rows were altered".to_string()));
                }
            } else if !category.same_content(written) {
                return Err(fail(format!("category {} changed", category.name())));
            }
        }
        for category in after.categories() {
            let is_new = before.category(category.name()).is_none();
            if is_new && !category.name().eq_ignore_ascii_case("_struct_asym") {
                return Err(fail(format!("unexpected category {}", category.name())));
            }
        }
    }

    if let Some(finding) = scan_block(reparsed.first_block(), Path::new(""))? {
        return Err(fail(format!(
            "asym ids still missing after the fix: {}",
            finding.missing_asym_ids.join(", ")
        )));
    }
    Ok(reparsed)
}

/// Loads mmCIF text as an atomic model.
pub fn load_structure(text: &str) -> Result<PDB, String> {
    let (pdb, warnings) = ReadOptions::default()
        .set_format(Format::Mmcif)
        .set_level(StrictnessLevel::Loose)
        .set_only_atomic_coords(true)
        .read_raw(BufReader::new(text.as_bytes()))
        .map_err(|errors| {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        })?;
    for w in &warnings {
        match w.level() {
            ErrorLevel::BreakingError | ErrorLevel::InvalidatingError => warn!("{w}"),
            _ => debug!("{w}"),
        }
    }
    Ok(pdb)
}

/// Checks that the corrected text still describes the same atomic model.
pub fn check_model(entry: &str, original: &str, rendered: &str) -> Result<(), Error> {
    let fail = |details: String| Error::serialization(entry, details);
    let before = load_structure(original).map_err(|e| fail(format!("original model: {e}")))?;
    let after = load_structure(rendered).map_err(|e| fail(format!("corrected model: {e}")))?;

    if before.atom_count() != after.atom_count() {
        return Err(fail(format!(
            "atom count changed from {} to {}",
            before.atom_count(),
            after.atom_count()
        )));
    }
    if before.chain_count() != after.chain_count() {
        return Err(fail(format!(
            "chain count changed from {} to {}",
            before.chain_count(),
            after.chain_count()
        )));
    }
    debug!(
        "{entry}: model check passed ({} atoms in {} chains)",
        after.atom_count(),
        after.chain_count()
    );
    Ok(())
}
