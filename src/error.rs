use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while scanning or repairing mmCIF entries.
///
/// Batch operations record these against the entry (or file) they belong to
/// and keep going; single-file calls hand them straight back to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error for {path_desc}: {source}", path_desc = PathDisplay(path))]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "failed to parse mmCIF {path_desc}: {details} (line {line_number})",
        path_desc = PathDisplay(path)
    )]
    Parse {
        path: Option<PathBuf>,
        line_number: usize,
        details: String,
    },

    #[error(
        "entry {entry}: asym id '{asym_id}' is referenced by several entities ({})",
        .entity_ids.join(", ")
    )]
    AmbiguousEntity {
        entry: String,
        asym_id: String,
        entity_ids: Vec<String>,
    },

    #[error("entry {entry}: no label_entity_id recorded for atoms of asym id '{asym_id}'")]
    UnresolvedEntity { entry: String, asym_id: String },

    #[error("entry {entry} is not present among the supplied structure files")]
    EntryNotFound { entry: String },

    #[error("entry {entry}: corrected record failed the round-trip check: {details}")]
    Serialization { entry: String, details: String },

    #[error("findings document {path_desc}: {source}", path_desc = PathDisplay(path))]
    Findings {
        path: Option<PathBuf>,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn from_io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { path, source }
    }

    pub fn parse(line_number: usize, details: impl Into<String>) -> Self {
        Self::Parse {
            path: None,
            line_number,
            details: details.into(),
        }
    }

    pub fn serialization(entry: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Serialization {
            entry: entry.into(),
            details: details.into(),
        }
    }

    /// Attach the file a parse error came from.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Parse {
                path: None,
                line_number,
                details,
            } => Self::Parse {
                path: Some(path.into()),
                line_number,
                details,
            },
            Self::Io { path: None, source } => Self::Io {
                path: Some(path.into()),
                source,
            },
            other => other,
        }
    }
}

struct PathDisplay<'a>(&'a Option<PathBuf>);

impl fmt::Display for PathDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(p) => write!(f, "file '{}'", p.display()),
            None => write!(f, "stream source"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_mentions_path_and_line() {
        let err = Error::parse(12, "unterminated text field").with_path("/data/2g10.cif");
        assert_eq!(
            err.to_string(),
            "failed to parse mmCIF file '/data/2g10.cif': unterminated text field (line 12)"
        );
    }

    #[test]
    fn ambiguous_entity_lists_candidates() {
        let err = Error::AmbiguousEntity {
            entry: "1ABC".to_string(),
            asym_id: "C".to_string(),
            entity_ids: vec!["2".to_string(), "3".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "entry 1ABC: asym id 'C' is referenced by several entities (2, 3)"
        );
    }
}
