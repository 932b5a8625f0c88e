//! Reading and writing (optionally gzipped) mmCIF files and walking archive mirrors.

use crate::cif::Document;
use crate::error::Error;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reads a text file, transparently decompressing gzip content.
///
/// Compression is detected from the magic bytes rather than the file name.
pub fn read_text(path: &Path) -> Result<String, Error> {
    let io_err = |e| Error::from_io(e, Some(path.to_path_buf()));
    let bytes = std::fs::read(path).map_err(io_err)?;

    if bytes.starts_with(&GZIP_MAGIC) {
        let mut text = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut text)
            .map_err(io_err)?;
        Ok(text)
    } else {
        String::from_utf8(bytes)
            .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }
}

/// Reads and parses an mmCIF file.
pub fn read_document(path: &Path) -> Result<Document, Error> {
    let text = read_text(path)?;
    Document::parse(text).map_err(|e| e.with_path(path))
}

/// Writes `text` to `path`, gzip-compressed when `gzip` is set. Parent
/// directories are created as needed.
pub fn write_text(path: &Path, text: &str, gzip: bool) -> Result<(), Error> {
    let io_err = |e| Error::from_io(e, Some(path.to_path_buf()));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let file = File::create(path).map_err(io_err)?;
    if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes()).map_err(io_err)?;
        encoder.finish().map_err(io_err)?;
    } else {
        let mut file = file;
        file.write_all(text.as_bytes()).map_err(io_err)?;
    }
    debug!("Wrote {}", path.display());
    Ok(())
}

pub fn is_gzip_name(path: &Path) -> bool {
    path.to_string_lossy().to_ascii_lowercase().ends_with(".gz")
}

/// Matches `*.cif` and `*.cif.gz` (case-insensitive).
pub fn is_cif_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".cif") || name.ends_with(".cif.gz")
}

/// Recursively lists mmCIF files below `root`, sorted by path.
///
/// Unreadable directory entries are logged and skipped.
pub fn enumerate_cif_files(root: &Path) -> Result<Vec<PathBuf>, Error> {
    if !root.is_dir() {
        return Err(Error::from_io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            Some(root.to_path_buf()),
        ));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable mirror entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_cif_path(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Compression of corrected files.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputCompression {
    /// Same as the input file
    #[default]
    Keep,
    /// Always gzip
    Gzip,
    /// Always plain text
    Plain,
}

impl OutputCompression {
    pub fn gzip_for(self, input: &Path) -> bool {
        match self {
            OutputCompression::Keep => is_gzip_name(input),
            OutputCompression::Gzip => true,
            OutputCompression::Plain => false,
        }
    }

    /// File name for the corrected copy of `input`, with the `.gz` suffix
    /// added or removed to match the chosen compression.
    pub fn file_name_for(self, input: &Path) -> PathBuf {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = if is_gzip_name(Path::new(&name)) {
            &name[..name.len() - 3]
        } else {
            name.as_str()
        };
        if self.gzip_for(input) {
            PathBuf::from(format!("{stem}.gz"))
        } else {
            PathBuf::from(stem)
        }
    }
}
