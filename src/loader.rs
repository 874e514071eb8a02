//! Loads a located artifact into a private, disposable scope

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::fs::FileSystem;
use crate::locator::ResolvedPath;
use crate::metadata::{Assembly, MetadataError};

#[derive(Debug, Error)]
pub enum LoadError {
    /// The filesystem's error already names the path
    #[error("{cause:#}")]
    Read { path: PathBuf, cause: anyhow::Error },

    #[error("{0}")]
    Metadata(#[from] MetadataError),
}

/// A parsed artifact together with the path it came from.
///
/// The image bytes and everything parsed from them are owned here and nowhere
/// else; dropping the value releases the artifact.
#[derive(Debug)]
pub struct LoadedArtifact {
    path: ResolvedPath,
    assembly: Assembly,
}

impl LoadedArtifact {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }
}

pub struct ArtifactLoader<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> ArtifactLoader<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn load(&self, path: &ResolvedPath) -> Result<LoadedArtifact, LoadError> {
        let bytes = self.fs.read(path.as_path()).map_err(|cause| LoadError::Read {
            path: path.as_path().to_path_buf(),
            cause,
        })?;
        debug!(path = %path, size = bytes.len(), "Read artifact");

        let assembly = Assembly::from_bytes(bytes)?;
        debug!(
            module = assembly.module_name(),
            runtime = assembly.runtime_version(),
            types = assembly.type_count(),
            pe32_plus = assembly.is_pe32_plus(),
            "Parsed assembly metadata"
        );

        Ok(LoadedArtifact {
            path: path.clone(),
            assembly,
        })
    }
}
