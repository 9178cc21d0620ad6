//! Collecting working-directory files into an archive, and the
//! post-processing pipeline applied before an archive is shipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::{Archive, ArchiveError, ArchiveResult};

/// Chooses which files under a working directory belong in a package.
pub trait FileSelector {
    /// Return paths relative to `root`.
    fn select(&self, root: &Path) -> ArchiveResult<Vec<PathBuf>>;
}

/// Selects every regular file below the root.
///
/// Hidden files and directories (names starting with `.`) are skipped
/// unless [`DirectoryWalker::including_hidden`] is used.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    skip_hidden: bool,
}

impl Default for DirectoryWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryWalker {
    /// Create a walker that skips hidden entries.
    pub fn new() -> Self {
        Self { skip_hidden: true }
    }

    /// Create a walker that also selects hidden entries.
    pub fn including_hidden() -> Self {
        Self { skip_hidden: false }
    }
}

impl FileSelector for DirectoryWalker {
    fn select(&self, root: &Path) -> ArchiveResult<Vec<PathBuf>> {
        let skip_hidden = self.skip_hidden;
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                entry.depth() == 0
                    || !skip_hidden
                    || !entry.file_name().to_string_lossy().starts_with('.')
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| ArchiveError::ListFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
        Ok(files)
    }
}

/// Build an archive from an explicit list of files relative to `root`.
///
/// Fails with [`ArchiveError::Filesystem`] if any listed file is missing.
pub fn package_files(root: &Path, files: &[PathBuf]) -> ArchiveResult<Archive> {
    let mut archive = Archive::new();

    for relative in files {
        let path = root.join(relative);
        let content = fs::read(&path).map_err(|e| ArchiveError::Filesystem {
            path: path.clone(),
            source: e,
        })?;
        trace!(file = %relative.display(), bytes = content.len(), "Adding file to package");
        archive.insert(entry_name(relative), content);
    }

    debug!(root = %root.display(), files = archive.len(), "Packaged working directory");
    Ok(archive)
}

/// Select files with `selector` and package them.
pub fn package_directory(root: &Path, selector: &dyn FileSelector) -> ArchiveResult<Archive> {
    let files = selector.select(root)?;
    package_files(root, &files)
}

/// Zip entry name for a relative path, always `/`-separated.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// A single post-processing pass over an archive.
///
/// Implementations must be deterministic: the same input archive always
/// yields the same output archive.
pub trait ArchiveProcessor {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Transform the archive.
    fn process(&self, archive: Archive) -> Archive;
}

/// Ordered list of processors applied to a package archive.
#[derive(Default)]
pub struct ArchivePipeline {
    stages: Vec<Box<dyn ArchiveProcessor>>,
}

impl ArchivePipeline {
    /// Create an empty pipeline (the identity transform).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn push(&mut self, stage: impl ArchiveProcessor + 'static) {
        self.stages.push(Box::new(stage));
    }

    /// Builder-style variant of [`ArchivePipeline::push`].
    pub fn with_stage(mut self, stage: impl ArchiveProcessor + 'static) -> Self {
        self.push(stage);
        self
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order.
    pub fn apply(&self, archive: Archive) -> Archive {
        self.stages.iter().fold(archive, |archive, stage| {
            debug!(stage = stage.name(), entries = archive.len(), "Applying archive stage");
            stage.process(archive)
        })
    }
}

impl std::fmt::Debug for ArchivePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("ArchivePipeline")
            .field("stages", &names)
            .finish()
    }
}

/// Removes `<packageVersions>` blocks from `*-meta.xml` entries.
///
/// Installed-package version pins in metadata files would tie the package
/// to whatever was installed in the developer's org.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanMetaXml;

fn package_versions_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)[ \t]*<packageVersions>.*?</packageVersions>\r?\n?").unwrap()
    })
}

impl ArchiveProcessor for CleanMetaXml {
    fn name(&self) -> &str {
        "clean_meta_xml"
    }

    fn process(&self, archive: Archive) -> Archive {
        let pattern = package_versions_pattern();
        archive.map_entries(|name, content| {
            if !name.ends_with("-meta.xml") {
                return (name.to_string(), content.to_vec());
            }
            match std::str::from_utf8(content) {
                Ok(text) => (
                    name.to_string(),
                    pattern.replace_all(text, "").into_owned().into_bytes(),
                ),
                Err(_) => (name.to_string(), content.to_vec()),
            }
        })
    }
}
