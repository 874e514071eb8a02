//! Resolves which built artifact to inspect
//!
//! The requested path (explicit, or the configured default) is made absolute
//! against the search root. If no file exists there, the whole search root is
//! walked for a file with the artifact's exact name.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::fs::FileSystem;

/// An absolute path that named an existing file when it was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("Could not find {file_name} under {}. Build the project first.", root.display())]
    NotFound { root: PathBuf, file_name: String },
}

pub struct ArtifactLocator<F: FileSystem> {
    fs: F,
    file_name: String,
    default_relative_path: PathBuf,
}

impl<F: FileSystem> ArtifactLocator<F> {
    pub fn new(fs: F, config: &ProbeConfig) -> Self {
        Self {
            fs,
            file_name: config.artifact_file_name.clone(),
            default_relative_path: config.default_relative_path.clone(),
        }
    }

    /// Resolves the artifact, trying `explicit` (or the default path) before searching `search_root`
    pub fn locate(
        &self,
        explicit: Option<&Path>,
        search_root: &Path,
    ) -> Result<ResolvedPath, LocateError> {
        let search_root = normalize_lexically(search_root);
        let requested = explicit.unwrap_or(&self.default_relative_path);
        let primary = normalize_lexically(&search_root.join(requested));

        if self.fs.is_file(&primary) {
            debug!(path = %primary.display(), "Artifact found at requested path");
            return Ok(ResolvedPath(primary));
        }

        debug!(
            path = %primary.display(),
            root = %search_root.display(),
            file_name = %self.file_name,
            "Requested path does not exist, searching"
        );
        let mut candidates = match self.fs.find_files_named(&search_root, &self.file_name) {
            Ok(candidates) => candidates,
            Err(err) => {
                debug!(
                    root = %search_root.display(),
                    error = %err,
                    "Artifact search failed"
                );
                Vec::new()
            }
        };
        candidates.sort();
        debug!(count = candidates.len(), "Search finished");

        match candidates.into_iter().next() {
            Some(found) => Ok(ResolvedPath(normalize_lexically(&found))),
            None => Err(LocateError::NotFound {
                root: search_root,
                file_name: self.file_name.clone(),
            }),
        }
    }
}

/// Collapses `.` and `..` components without touching the filesystem.
///
/// Symlinks are not resolved, so `a/link/..` becomes `a` even if `link` points
/// elsewhere. `..` never climbs above the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    out
}
