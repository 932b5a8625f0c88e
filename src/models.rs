use crate::cif::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Chain identifier (`label_asym_id` / `_struct_asym.id`)
pub type AsymId = String;
/// Chemical entity identifier (`label_entity_id` / `_struct_asym.entity_id`)
pub type EntityId = String;

/// The `_atom_site` fields the scanner looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomRecord {
    pub label_asym_id: Option<AsymId>,
    pub label_entity_id: Option<EntityId>,
    pub label_comp_id: Option<String>,
}

/// One row of `_struct_asym`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructAsymEntry {
    pub id: AsymId,
    pub entity_id: EntityId,
    pub pdbx_blank_pdb_chainid_flag: String,
    pub pdbx_modified: String,
    pub details: Option<String>,
}

impl StructAsymEntry {
    /// A row with the archive defaults: both flags `N` and no details.
    pub fn with_defaults(id: impl Into<AsymId>, entity_id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            pdbx_blank_pdb_chainid_flag: "N".to_string(),
            pdbx_modified: "N".to_string(),
            details: None,
        }
    }

    /// `(field, value)` pairs in `_struct_asym` field order.
    pub fn to_record(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::text(&self.id)),
            (
                "pdbx_blank_PDB_chainid_flag",
                Value::text(&self.pdbx_blank_pdb_chainid_flag),
            ),
            ("pdbx_modified", Value::text(&self.pdbx_modified)),
            ("entity_id", Value::text(&self.entity_id)),
            (
                "details",
                self.details.as_ref().map_or(Value::Unknown, Value::text),
            ),
        ]
    }
}

/// Diagnostics for one AsymId that atoms reference but `_struct_asym` lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingAsym {
    pub entity_id: EntityId,
    pub atom_count: usize,
    #[serde(default)]
    pub comp_ids: Vec<String>,
}

/// Everything the scanner found wrong with one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFinding {
    #[serde(skip)]
    pub entry_id: String,
    pub file_path: PathBuf,
    pub missing_asym_ids: Vec<AsymId>,
    pub details: BTreeMap<AsymId, MissingAsym>,
}

impl ScanFinding {
    pub fn entity_of(&self, asym_id: &str) -> Option<&str> {
        self.details.get(asym_id).map(|d| d.entity_id.as_str())
    }

    pub fn total_atoms(&self) -> usize {
        self.details.values().map(|d| d.atom_count).sum()
    }
}

/// What happened to one entry during a fix run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Fixed,
    AlreadyConsistent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub entry_id: String,
    pub input_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub status: FixStatus,
    pub added: BTreeMap<AsymId, EntityId>,
    pub error: Option<String>,
}

impl FixOutcome {
    pub fn failed(entry_id: impl Into<String>, input_path: PathBuf, error: impl ToString) -> Self {
        Self {
            entry_id: entry_id.into(),
            input_path,
            output_path: None,
            status: FixStatus::Failed,
            added: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == FixStatus::Failed
    }
}

/// Counts for the end-of-run summary of a fix batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSummary {
    pub total: usize,
    pub fixed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl FixSummary {
    pub fn from_outcomes(outcomes: &[FixOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.status {
                FixStatus::Fixed => summary.fixed += 1,
                FixStatus::AlreadyConsistent => summary.skipped += 1,
                FixStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_entry_uses_archive_flags() {
        let entry = StructAsymEntry::with_defaults("F", "5");
        let record = entry.to_record();
        assert_eq!(
            record,
            vec![
                ("id", Value::text("F")),
                ("pdbx_blank_PDB_chainid_flag", Value::text("N")),
                ("pdbx_modified", Value::text("N")),
                ("entity_id", Value::text("5")),
                ("details", Value::Unknown),
            ]
        );
    }

    #[test]
    fn summary_counts_each_status() {
        let ok = FixOutcome {
            entry_id: "2G10".to_string(),
            input_path: PathBuf::from("2g10.cif"),
            output_path: Some(PathBuf::from("out/2g10.cif")),
            status: FixStatus::Fixed,
            added: BTreeMap::from([("F".to_string(), "5".to_string())]),
            error: None,
        };
        let skipped = FixOutcome {
            status: FixStatus::AlreadyConsistent,
            added: BTreeMap::new(),
            ..ok.clone()
        };
        let failed = FixOutcome::failed("1TS6", PathBuf::from("1ts6.cif"), "boom");

        let summary = FixSummary::from_outcomes(&[ok, skipped, failed.clone()]);
        assert_eq!(
            summary,
            FixSummary {
                total: 3,
                fixed: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert!(failed.is_failure());
    }
}
