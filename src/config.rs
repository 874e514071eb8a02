//! Configuration for guidprobe
//!
//! The probe looks for one artifact, one type and one static member. The
//! defaults describe the WinCopyS3 ETW provider; library callers may point the
//! probe at another artifact or member, the CLI always uses the defaults.
//!
//! # Example
//!
//! ```
//! use guidprobe::ProbeConfig;
//!
//! let config = ProbeConfig::default();
//! config.validate().expect("default configuration is valid");
//! assert_eq!(config.entity_name, "WinCopyS3.ETWEvents");
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Default values for configuration
const DEFAULT_ARTIFACT_FILE_NAME: &str = "WinCopyS3.dll";
const DEFAULT_RELATIVE_PATH: &str = "../src/WinCopyS3/bin/Release/net8.0-windows/WinCopyS3.dll";
const DEFAULT_ENTITY_NAME: &str = "WinCopyS3.ETWEvents";
const DEFAULT_MEMBER_NAME: &str = "ProviderGuid";
const DEFAULT_CANDIDATE_LIMIT: usize = 50;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required name is empty
    #[error("Configuration value {0} must not be empty")]
    Empty(&'static str),

    /// The artifact file name contains a directory component
    #[error("Artifact file name must be a bare file name, got {0:?}")]
    NotAFileName(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// What the probe looks for and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// File name searched for when the primary path does not exist
    pub artifact_file_name: String,

    /// Path tried when no explicit path is given, relative to the search root
    pub default_relative_path: PathBuf,

    /// Fully-qualified name of the type that exposes the identifier
    pub entity_name: String,

    /// Name of the public static field or property holding the identifier
    pub member_name: String,

    /// How many type names to list when the entity is missing
    pub candidate_limit: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            artifact_file_name: DEFAULT_ARTIFACT_FILE_NAME.to_string(),
            default_relative_path: PathBuf::from(DEFAULT_RELATIVE_PATH),
            entity_name: DEFAULT_ENTITY_NAME.to_string(),
            member_name: DEFAULT_MEMBER_NAME.to_string(),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }
}

impl ProbeConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - any name is empty
    /// - `artifact_file_name` contains a path separator
    /// - `candidate_limit` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.artifact_file_name.is_empty() {
            return Err(ConfigError::Empty("artifact_file_name"));
        }
        if self.artifact_file_name.contains(['/', '\\']) {
            return Err(ConfigError::NotAFileName(self.artifact_file_name.clone()));
        }
        if self.default_relative_path.as_os_str().is_empty() {
            return Err(ConfigError::Empty("default_relative_path"));
        }
        if self.entity_name.is_empty() {
            return Err(ConfigError::Empty("entity_name"));
        }
        if self.member_name.is_empty() {
            return Err(ConfigError::Empty("member_name"));
        }
        if self.candidate_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "candidate_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
