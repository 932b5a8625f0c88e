//! Aggregation and persistence of scan findings.

use crate::error::Error;
use crate::io::{read_text, write_text};
use crate::models::ScanFinding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// All findings of one or more scan runs, keyed by entry identifier.
///
/// Keys are kept sorted, so serializing the same content always yields the
/// same document. Every scanned file ends up under exactly one key: a finding,
/// a failure (entry id, or the path when the entry is unknown), or a clean
/// entry. Re-scanning a file replaces whatever it was recorded as before;
/// files a later scan did not touch are kept as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsCollection {
    #[serde(default)]
    pub scan_date: String,
    /// Distinct entries (or unreadable files) recorded so far
    #[serde(default)]
    pub total_scanned: usize,
    #[serde(default)]
    pub affected_entries: usize,
    entries: BTreeMap<String, ScanFinding>,
    #[serde(default)]
    failures: BTreeMap<String, String>,
    /// Entries that passed, with the file they were read from
    #[serde(default, rename = "clean_entries")]
    clean: BTreeMap<String, PathBuf>,
    /// Key each known file is recorded under
    #[serde(skip)]
    by_path: BTreeMap<PathBuf, String>,
}

impl FindingsCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the finding for its entry.
    pub fn insert(&mut self, finding: ScanFinding) {
        let key = finding.entry_id.to_ascii_uppercase();
        self.put_entry(key, finding);
        self.refresh_counts();
    }

    /// Notes that the entry read from `path` was scanned and found consistent.
    pub fn record_clean(&mut self, entry_id: &str, path: &Path) {
        self.put_clean(entry_id.to_ascii_uppercase(), path.to_path_buf());
        self.refresh_counts();
    }

    /// Records an entry (or file, when the entry is unknown) that could not be scanned.
    pub fn record_failure(&mut self, key: impl Into<String>, path: &Path, error: &Error) {
        self.put_failure(key.into(), Some(path.to_path_buf()), error.to_string());
        self.refresh_counts();
    }

    /// Case-insensitive lookup by entry identifier.
    pub fn get(&self, entry_id: &str) -> Option<&ScanFinding> {
        self.entries.get(&entry_id.to_ascii_uppercase())
    }

    pub fn entries(&self) -> impl Iterator<Item = &ScanFinding> {
        self.entries.values()
    }

    pub fn failures(&self) -> &BTreeMap<String, String> {
        &self.failures
    }

    /// True when `entry_id` was last seen passing.
    pub fn is_clean(&self, entry_id: &str) -> bool {
        self.clean.contains_key(&entry_id.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folds a later (or parallel) collection into this one.
    ///
    /// Everything `other` recorded replaces what this collection holds for the
    /// same entry or the same file; everything else is preserved.
    pub fn merge(&mut self, other: FindingsCollection) {
        let mut paths: BTreeMap<String, PathBuf> = other
            .by_path
            .into_iter()
            .map(|(path, key)| (key, path))
            .collect();
        for (key, path) in other.clean {
            self.put_clean(key, path);
        }
        for (key, finding) in other.entries {
            self.put_entry(key, finding);
        }
        for (key, message) in other.failures {
            let path = paths.remove(&key);
            self.put_failure(key, path, message);
        }
        self.refresh_counts();
        if other.scan_date > self.scan_date {
            self.scan_date = other.scan_date;
        }
    }

    fn put_entry(&mut self, key: String, finding: ScanFinding) {
        let path = finding.file_path.clone();
        self.forget(&key, Some(path.as_path()));
        self.by_path.insert(path, key.clone());
        self.entries.insert(key, finding);
    }

    fn put_clean(&mut self, key: String, path: PathBuf) {
        self.forget(&key, Some(path.as_path()));
        self.by_path.insert(path.clone(), key.clone());
        self.clean.insert(key, path);
    }

    fn put_failure(&mut self, key: String, path: Option<PathBuf>, message: String) {
        self.forget(&key, path.as_deref());
        if let Some(path) = path {
            self.by_path.insert(path, key.clone());
        }
        self.failures.insert(key, message);
    }

    /// Drops everything recorded under `key`, under the key `path` was last
    /// recorded with, and any failure filed under the path itself.
    fn forget(&mut self, key: &str, path: Option<&Path>) {
        let mut keys = vec![key.to_string()];
        if let Some(path) = path {
            keys.extend(self.by_path.remove(path));
            keys.push(path.display().to_string());
        }
        for key in keys {
            if let Some(finding) = self.entries.remove(&key) {
                self.by_path.remove(&finding.file_path);
            }
            if let Some(path) = self.clean.remove(&key) {
                self.by_path.remove(&path);
            }
            self.failures.remove(&key);
        }
    }

    fn refresh_counts(&mut self) {
        self.affected_entries = self.entries.len();
        self.total_scanned = self.entries.len() + self.failures.len() + self.clean.len();
    }

    pub fn stamp_today(&mut self) {
        self.scan_date = chrono::Local::now().format("%Y-%m-%d").to_string();
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|source| Error::Findings { path: None, source })
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        let mut collection: Self =
            serde_json::from_str(text).map_err(|source| Error::Findings { path: None, source })?;
        for (key, finding) in collection.entries.iter_mut() {
            finding.entry_id = key.clone();
            collection
                .by_path
                .insert(finding.file_path.clone(), key.clone());
        }
        for (key, path) in &collection.clean {
            collection.by_path.insert(path.clone(), key.clone());
        }
        collection.refresh_counts();
        Ok(collection)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = read_text(path)?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Findings { source, .. } => Error::Findings {
                path: Some(path.to_path_buf()),
                source,
            },
            other => other,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let mut text = self.to_json()?;
        text.push('\n');
        write_text(path, &text, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MissingAsym;
    use std::path::PathBuf;

    fn finding(entry: &str, missing: &[(&str, &str, usize)]) -> ScanFinding {
        ScanFinding {
            entry_id: entry.to_string(),
            file_path: PathBuf::from(format!("/mirror/{}.cif.gz", entry.to_lowercase())),
            missing_asym_ids: missing.iter().map(|m| m.0.to_string()).collect(),
            details: missing
                .iter()
                .map(|(asym, entity, atoms)| {
                    (
                        asym.to_string(),
                        MissingAsym {
                            entity_id: entity.to_string(),
                            atom_count: *atoms,
                            comp_ids: vec!["HOH".to_string()],
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let mut collection = FindingsCollection::new();
        collection.insert(finding("2G10", &[("F", "5", 147)]));
        assert_eq!(collection.get("2g10").unwrap().entity_of("F"), Some("5"));
        assert!(collection.get("1ABC").is_none());
        assert_eq!(collection.affected_entries, 1);
    }

    #[test]
    fn merge_keeps_untouched_entries() {
        let mut first = FindingsCollection::new();
        first.insert(finding("2G10", &[("F", "5", 147)]));
        first.insert(finding("2K9Y", &[("C", "3", 10), ("D", "3", 12)]));
        first.record_clean("1UBQ", Path::new("/mirror/1ubq.cif.gz"));

        let mut rescan = FindingsCollection::new();
        rescan.insert(finding("2K9Y", &[("C", "3", 10)]));
        rescan.record_clean("2G10", Path::new("/mirror/2g10.cif.gz"));
        first.merge(rescan);

        assert!(first.get("2G10").is_none());
        assert_eq!(first.get("2K9Y").unwrap().missing_asym_ids, ["C"]);
        assert_eq!(first.affected_entries, 1);
        assert_eq!(first.total_scanned, 3);
        assert!(first.is_clean("2G10"));
    }

    #[test]
    fn merge_of_disjoint_partials_is_order_independent() {
        let mut a = FindingsCollection::new();
        a.insert(finding("2G10", &[("F", "5", 147)]));
        let mut b = FindingsCollection::new();
        b.insert(finding("2K9Y", &[("C", "3", 10)]));
        let bad = Path::new("/mirror/bad.cif");
        b.record_failure(bad.display().to_string(), bad, &Error::parse(1, "empty document"));

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab.to_json().unwrap(), ba.to_json().unwrap());
        assert_eq!(ab.failures().len(), 1);
    }

    #[test]
    fn json_document_is_keyed_by_entry() {
        let mut collection = FindingsCollection::new();
        collection.scan_date = "2026-01-17".to_string();
        collection.insert(finding("2G10", &[("F", "5", 147)]));

        let value: serde_json::Value = serde_json::from_str(&collection.to_json().unwrap()).unwrap();
        assert_eq!(value["total_scanned"], 1);
        assert_eq!(value["affected_entries"], 1);
        let entry = &value["entries"]["2G10"];
        assert_eq!(entry["missing_asym_ids"], serde_json::json!(["F"]));
        assert_eq!(entry["details"]["F"]["entity_id"], "5");
        assert_eq!(entry["details"]["F"]["atom_count"], 147);
        assert!(entry.get("entry_id").is_none());
    }

    #[test]
    fn reload_restores_entry_ids() {
        let mut collection = FindingsCollection::new();
        collection.insert(finding("2G10", &[("F", "5", 147)]));
        let reloaded = FindingsCollection::from_json(&collection.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.get("2G10").unwrap().entry_id, "2G10");
        assert_eq!(reloaded, collection);
    }

    #[test]
    fn reserialization_after_merge_preserves_existing_entries() {
        let mut collection = FindingsCollection::new();
        collection.insert(finding("2G10", &[("F", "5", 147)]));
        let before = serde_json::to_value(collection.get("2G10").unwrap()).unwrap();

        let mut later = FindingsCollection::new();
        later.insert(finding("3ABC", &[("B", "2", 4)]));
        collection.merge(later);

        let reloaded = FindingsCollection::from_json(&collection.to_json().unwrap()).unwrap();
        let after = serde_json::to_value(reloaded.get("2G10").unwrap()).unwrap();
        assert_eq!(before, after);
        assert_eq!(reloaded.len(), 2);
    }

    fn unreadable(path: &Path) -> FindingsCollection {
        let mut collection = FindingsCollection::new();
        let err = Error::parse(2, "loop_ for _atom_site has no values").with_path(path);
        collection.record_failure(path.display().to_string(), path, &err);
        collection
    }

    #[test]
    fn clean_rescan_clears_an_earlier_failure() {
        let path = Path::new("/mirror/2g10.cif");
        let mut collection = unreadable(path);
        assert_eq!(collection.failures().len(), 1);

        let mut rescan = FindingsCollection::new();
        rescan.record_clean("2G10", path);
        collection.merge(rescan);

        assert!(collection.failures().is_empty());
        assert!(collection.is_clean("2G10"));
        assert_eq!(collection.total_scanned, 1);
    }

    #[test]
    fn failure_survives_reload_and_is_cleared_by_a_finding() {
        let path = Path::new("/mirror/2g10.cif.gz");
        let collection = unreadable(path);
        let mut reloaded = FindingsCollection::from_json(&collection.to_json().unwrap()).unwrap();

        let mut rescan = FindingsCollection::new();
        rescan.insert(finding("2G10", &[("F", "5", 147)]));
        reloaded.merge(rescan);

        assert!(reloaded.failures().is_empty());
        assert!(reloaded.get("2G10").is_some());
        assert_eq!(reloaded.total_scanned, 1);
    }

    #[test]
    fn failing_rescan_drops_the_stale_finding() {
        let mut collection = FindingsCollection::new();
        collection.insert(finding("2G10", &[("F", "5", 147)]));
        collection.record_clean("1UBQ", Path::new("/mirror/1ubq.cif.gz"));
        let mut collection = FindingsCollection::from_json(&collection.to_json().unwrap()).unwrap();

        collection.merge(unreadable(Path::new("/mirror/2g10.cif.gz")));
        assert!(collection.get("2G10").is_none());
        assert_eq!(collection.failures().len(), 1);

        let mut rescan = FindingsCollection::new();
        let err = Error::AmbiguousEntity {
            entry: "1UBQ".to_string(),
            asym_id: "B".to_string(),
            entity_ids: vec!["2".to_string(), "3".to_string()],
        };
        rescan.record_failure("1UBQ", Path::new("/mirror/1ubq.cif.gz"), &err);
        collection.merge(rescan);

        assert!(!collection.is_clean("1UBQ"));
        assert_eq!(collection.failures().len(), 2);
        assert_eq!(collection.affected_entries, 0);
        assert_eq!(collection.total_scanned, 2);
    }

    #[test]
    fn rescanning_the_same_entry_is_counted_once() {
        let mut collection = FindingsCollection::new();
        collection.insert(finding("2G10", &[("F", "5", 147)]));
        let mut rescan = FindingsCollection::new();
        rescan.insert(finding("2G10", &[("F", "5", 147)]));
        collection.merge(rescan);

        assert_eq!(collection.total_scanned, 1);
        assert_eq!(collection.affected_entries, 1);
    }
}
