//! The discovery pipeline: locate, load, resolve, and the typed outcome

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ProbeConfig;
use crate::fs::FileSystem;
use crate::loader::ArtifactLoader;
use crate::locator::{ArtifactLocator, LocateError};
use crate::resolver::{IdentifierValue, MemberResolver, ResolveError};

/// Process exit codes, one per outcome
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const LOCATOR_FAILURE: i32 = 2;
    pub const LOADER_FAILURE: i32 = 3;
    pub const ENTITY_NOT_FOUND: i32 = 4;
    pub const MEMBER_NOT_FOUND: i32 = 5;
}

/// How a probe run ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        path: PathBuf,
        identifier: IdentifierValue,
    },
    LocatorFailure {
        search_root: PathBuf,
        file_name: String,
    },
    LoaderFailure {
        path: PathBuf,
        message: String,
    },
    EntityNotFound {
        path: PathBuf,
        entity: String,
        candidates: Vec<String>,
    },
    MemberNotFound {
        path: PathBuf,
        entity: String,
        member: String,
    },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success { .. } => exit_code::SUCCESS,
            Outcome::LocatorFailure { .. } => exit_code::LOCATOR_FAILURE,
            Outcome::LoaderFailure { .. } => exit_code::LOADER_FAILURE,
            Outcome::EntityNotFound { .. } => exit_code::ENTITY_NOT_FOUND,
            Outcome::MemberNotFound { .. } => exit_code::MEMBER_NOT_FOUND,
        }
    }

    /// The artifact path, for every outcome past a successful locate
    pub fn artifact_path(&self) -> Option<&Path> {
        match self {
            Outcome::LocatorFailure { .. } => None,
            Outcome::Success { path, .. }
            | Outcome::LoaderFailure { path, .. }
            | Outcome::EntityNotFound { path, .. }
            | Outcome::MemberNotFound { path, .. } => Some(path),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Runs Locate, Load, Resolve-Entity and Resolve-Member in order
pub struct Probe<F: FileSystem + Clone> {
    fs: F,
    config: ProbeConfig,
}

impl<F: FileSystem + Clone> Probe<F> {
    pub fn new(fs: F, config: ProbeConfig) -> Self {
        Self { fs, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Runs the pipeline; `search_root` is normally the working directory
    pub fn run(&self, explicit_path: Option<&Path>, search_root: &Path) -> Outcome {
        let locator = ArtifactLocator::new(self.fs.clone(), &self.config);
        let resolved = match locator.locate(explicit_path, search_root) {
            Ok(resolved) => resolved,
            Err(LocateError::NotFound { root, file_name }) => {
                return Outcome::LocatorFailure {
                    search_root: root,
                    file_name,
                }
            }
        };
        debug!(path = %resolved, "Located artifact");

        let path = resolved.as_path().to_path_buf();
        let artifact = match ArtifactLoader::new(self.fs.clone()).load(&resolved) {
            Ok(artifact) => artifact,
            Err(err) => {
                return Outcome::LoaderFailure {
                    path,
                    message: err.to_string(),
                }
            }
        };

        let outcome = match MemberResolver::new(&self.config).resolve(artifact.assembly()) {
            Ok(identifier) => Outcome::Success { path, identifier },
            Err(ResolveError::EntityNotFound { entity, candidates }) => Outcome::EntityNotFound {
                path,
                entity,
                candidates,
            },
            Err(ResolveError::MemberNotFound { entity, member }) => {
                Outcome::MemberNotFound { path, entity, member }
            }
            Err(err @ (ResolveError::Metadata(_) | ResolveError::Evaluation(_))) => {
                Outcome::LoaderFailure {
                    path,
                    message: err.to_string(),
                }
            }
        };
        drop(artifact);
        debug!(exit_code = outcome.exit_code(), "Probe finished");
        outcome
    }
}
