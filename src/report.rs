use crate::findings::FindingsCollection;
use polars::prelude::*;
use std::path::Path;

/// Flattens findings into one row per missing asym id.
///
/// Columns: entry, asym_id, entity_id, atom_count, comp_ids, file_path.
pub fn findings_to_df(findings: &FindingsCollection) -> PolarsResult<DataFrame> {
    let rows: Vec<_> = findings
        .entries()
        .flat_map(|finding| {
            finding
                .details
                .iter()
                .map(move |(asym_id, missing)| (finding, asym_id, missing))
        })
        .collect();

    df!(
        "entry" => rows.iter().map(|(f, _, _)| f.entry_id.to_owned()).collect::<Vec<String>>(),
        "asym_id" => rows.iter().map(|(_, a, _)| a.to_string()).collect::<Vec<String>>(),
        "entity_id" => rows.iter().map(|(_, _, m)| m.entity_id.to_owned()).collect::<Vec<String>>(),
        "atom_count" => rows.iter().map(|(_, _, m)| m.atom_count as u32).collect::<Vec<u32>>(),
        "comp_ids" => rows.iter().map(|(_, _, m)| m.comp_ids.join(",")).collect::<Vec<String>>(),
        "file_path" => rows.iter().map(|(f, _, _)| f.file_path.display().to_string()).collect::<Vec<String>>(),
    )
}

/// Write a DataFrame to `file_path`, replacing its extension with the file type's.
///
/// Missing parent directories are created.
pub fn write_df_to_file(
    df: &mut DataFrame,
    file_path: &Path,
    file_type: DataFrameFileType,
) -> PolarsResult<()> {
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file_suffix = file_type.to_string();
    let mut file = std::fs::File::create(file_path.with_extension(file_suffix))?;
    match file_type {
        DataFrameFileType::Csv => {
            CsvWriter::new(&mut file).finish(df)?;
        }
        DataFrameFileType::Parquet => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
        DataFrameFileType::Json => {
            JsonWriter::new(&mut file)
                .with_json_format(JsonFormat::Json)
                .finish(df)?;
        }
        DataFrameFileType::NDJson => {
            JsonWriter::new(&mut file)
                .with_json_format(JsonFormat::JsonLines)
                .finish(df)?;
        }
    }
    Ok(())
}

/// File format for writing DataFrames.
#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum DataFrameFileType {
    /// Comma-separated values
    Csv,
    /// Parquet columnar storage
    Parquet,
    /// Standard JSON
    Json,
    /// Newline-delimited JSON
    NDJson,
}

impl std::fmt::Display for DataFrameFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DataFrameFileType::Csv => write!(f, "csv"),
            DataFrameFileType::Parquet => write!(f, "parquet"),
            DataFrameFileType::Json => write!(f, "json"),
            DataFrameFileType::NDJson => write!(f, "ndjson"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MissingAsym, ScanFinding};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn sample() -> FindingsCollection {
        let mut collection = FindingsCollection::new();
        collection.insert(ScanFinding {
            entry_id: "2K9Y".to_string(),
            file_path: PathBuf::from("/mirror/k9/2k9y.cif.gz"),
            missing_asym_ids: vec!["C".to_string(), "D".to_string()],
            details: BTreeMap::from([
                (
                    "C".to_string(),
                    MissingAsym {
                        entity_id: "3".to_string(),
                        atom_count: 3,
                        comp_ids: vec!["HOH".to_string()],
                    },
                ),
                (
                    "D".to_string(),
                    MissingAsym {
                        entity_id: "3".to_string(),
                        atom_count: 5,
                        comp_ids: vec!["HOH".to_string(), "NA".to_string()],
                    },
                ),
            ]),
        });
        collection
    }

    #[test]
    fn one_row_per_missing_chain() {
        let df = findings_to_df(&sample()).unwrap();
        assert_eq!(df.shape(), (2, 6));
        let comp_ids = df.column("comp_ids").unwrap().str().unwrap();
        assert_eq!(comp_ids.get(1), Some("HOH,NA"));
        let atoms = df.column("atom_count").unwrap().u32().unwrap();
        assert_eq!(atoms.get(0), Some(3));
    }

    #[test]
    fn empty_findings_give_empty_frame() {
        let df = findings_to_df(&FindingsCollection::new()).unwrap();
        assert_eq!(df.height(), 0);
    }

    #[test]
    fn csv_is_written_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut df = findings_to_df(&sample()).unwrap();
        write_df_to_file(&mut df, &dir.path().join("findings"), DataFrameFileType::Csv).unwrap();

        let text = std::fs::read_to_string(dir.path().join("findings.csv")).unwrap();
        assert!(text.starts_with("entry,asym_id,entity_id,atom_count,comp_ids,file_path"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn missing_output_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let mut df = findings_to_df(&sample()).unwrap();
        let output = dir.path().join("reports").join("2026").join("findings");
        write_df_to_file(&mut df, &output, DataFrameFileType::NDJson).unwrap();

        let text = std::fs::read_to_string(output.with_extension("ndjson")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn unwritable_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "not a directory").unwrap();
        let mut df = findings_to_df(&sample()).unwrap();

        let result = write_df_to_file(&mut df, &blocker.join("findings"), DataFrameFileType::Csv);
        assert!(result.is_err());
    }
}
