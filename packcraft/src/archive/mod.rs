//! In-memory package archives.
//!
//! An [`Archive`] is the transient artifact that travels through a build:
//! it is assembled from a working directory (or fetched from a repository),
//! rewritten by the namespace transforms and post-processing pipeline,
//! fingerprinted, and finally encoded into the version-info container.
//!
//! # Determinism
//!
//! Entries are kept sorted by name and every zip entry is written with the
//! same timestamp, permissions and compression settings. Encoding the same
//! entries therefore always yields the same bytes, which is what makes the
//! content fingerprint usable as a deduplication key.
//!
//! ```text
//! working dir ──► packager ──► Archive ──► pipeline ──► to_zip_bytes ──► fingerprint
//!                                 ▲
//! repository ──► fetcher ─────────┘
//! ```

mod error;
pub mod fingerprint;
pub mod namespace;
mod packager;

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path};

use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

pub use error::{ArchiveError, ArchiveResult};
pub use fingerprint::Fingerprint;
pub use namespace::{InjectOptions, NamespaceStage};
pub use packager::{
    package_directory, package_files, ArchivePipeline, ArchiveProcessor, CleanMetaXml,
    DirectoryWalker, FileSelector,
};

/// Unix permissions recorded for every entry.
const ENTRY_PERMISSIONS: u32 = 0o644;

/// An ordered, in-memory set of archive entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Archive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), content.into());
    }

    /// Builder-style variant of [`Archive::insert`].
    pub fn with_entry(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(name, content);
        self
    }

    /// Get the content of an entry.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_slice()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild the archive by mapping every entry to a new name and content.
    ///
    /// If two entries map to the same name, the later one (in sorted order)
    /// wins.
    pub fn map_entries<F>(&self, mut f: F) -> Archive
    where
        F: FnMut(&str, &[u8]) -> (String, Vec<u8>),
    {
        let entries = self
            .entries
            .iter()
            .map(|(name, content)| f(name, content))
            .collect();
        Archive { entries }
    }

    /// Return the entries below `prefix`, with the prefix removed from names.
    ///
    /// An empty prefix returns a copy of the whole archive.
    pub fn subtree(&self, prefix: &str) -> Archive {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return self.clone();
        }
        let dir = format!("{}/", prefix);
        let entries = self
            .entries
            .iter()
            .filter_map(|(name, content)| {
                name.strip_prefix(&dir)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_string(), content.clone()))
            })
            .collect();
        Archive { entries }
    }

    /// Encode the archive as deflated zip bytes.
    pub fn to_zip_bytes(&self) -> ArchiveResult<Vec<u8>> {
        let options = entry_options();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for (name, content) in &self.entries {
            writer.start_file(name.as_str(), options)?;
            writer
                .write_all(content)
                .map_err(|e| ArchiveError::Zip(format!("failed to write {}: {}", name, e)))?;
        }

        Ok(writer.finish()?.into_inner())
    }

    /// Decode zip bytes, skipping directory entries.
    pub fn from_zip_bytes(bytes: &[u8]) -> ArchiveResult<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut archive = Archive::new();

        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut content)
                .map_err(|e| ArchiveError::Zip(format!("failed to read {}: {}", name, e)))?;
            archive.insert(name, content);
        }

        Ok(archive)
    }

    /// Write every entry below `dir`, creating parent directories.
    ///
    /// Entry names that are absolute or contain `..` are rejected before
    /// anything is written.
    pub fn extract_to(&self, dir: &Path) -> ArchiveResult<()> {
        for name in self.entries.keys() {
            validate_entry_name(name)?;
        }

        for (name, content) in &self.entries {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| ArchiveError::WriteFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            fs::write(&path, content).map_err(|e| ArchiveError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;
        }

        Ok(())
    }
}

fn entry_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(ENTRY_PERMISSIONS)
}

fn validate_entry_name(name: &str) -> ArchiveResult<()> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || escapes {
        return Err(ArchiveError::InvalidEntryName(name.to_string()));
    }
    Ok(())
}
