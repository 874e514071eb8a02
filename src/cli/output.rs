//! Turns a probe [`Outcome`] into the lines printed on stdout and stderr
//!
//! # Example
//!
//! ```
//! use guidprobe::cli::output::Reporter;
//! use guidprobe::Outcome;
//! use std::path::PathBuf;
//!
//! let outcome = Outcome::LocatorFailure {
//!     search_root: PathBuf::from("/work"),
//!     file_name: "WinCopyS3.dll".to_string(),
//! };
//! let report = Reporter::default().report(&outcome);
//! assert_eq!(report.exit_code, 2);
//! assert!(report.stdout.is_empty());
//! ```

use std::io::{self, Write};

use crate::config::ProbeConfig;
use crate::probe::Outcome;

/// Lines to print and the code to exit with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: i32,
}

impl Report {
    /// Writes every line, stdout first, flushing both streams
    pub fn write_to<O: Write, E: Write>(&self, out: &mut O, err: &mut E) -> io::Result<()> {
        for line in &self.stdout {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        for line in &self.stderr {
            writeln!(err, "{}", line)?;
        }
        err.flush()
    }
}

/// Maps outcomes to report lines
#[derive(Debug, Clone)]
pub struct Reporter {
    candidate_limit: usize,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(&ProbeConfig::default())
    }
}

impl Reporter {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            candidate_limit: config.candidate_limit,
        }
    }

    pub fn report(&self, outcome: &Outcome) -> Report {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        if let Some(path) = outcome.artifact_path() {
            stdout.push(format!("Loading assembly: {}", path.display()));
        }

        match outcome {
            Outcome::Success { identifier, .. } => {
                stdout.push(format!(
                    "Provider GUID ({}): {}",
                    identifier.kind,
                    identifier.text()
                ));
            }
            Outcome::LocatorFailure {
                search_root,
                file_name,
            } => {
                stderr.push(format!(
                    "Could not find {} under {}. Build the project first.",
                    file_name,
                    search_root.display()
                ));
            }
            Outcome::LoaderFailure { message, .. } => {
                stderr.push(format!("Failed to load assembly: {}", message));
            }
            Outcome::EntityNotFound {
                entity, candidates, ..
            } => {
                stderr.push(format!(
                    "Type {} not found in assembly. Available types (first {}):",
                    entity, self.candidate_limit
                ));
                stderr.extend(
                    candidates
                        .iter()
                        .take(self.candidate_limit)
                        .map(|name| format!(" - {}", name)),
                );
            }
            Outcome::MemberNotFound { entity, member, .. } => {
                stderr.push(format!(
                    "No static {} field or property found on {}.",
                    member, entity
                ));
            }
        }

        Report {
            stdout,
            stderr,
            exit_code: outcome.exit_code(),
        }
    }
}
