//! guidprobe - reads the ETW provider GUID out of a built .NET assembly
//!
//! The probe finds the built `WinCopyS3.dll`, parses its PE image and ECMA-335
//! metadata, locates `WinCopyS3.ETWEvents` and reads its public static
//! `ProviderGuid` member. The member may be a field or a property; its value
//! is recovered from the Constant table or by symbolically following the
//! type's static constructor and getter IL. Nothing from the assembly runs.
//!
//! # Example Usage
//!
//! ```no_run
//! use guidprobe::{Outcome, Probe, ProbeConfig, RealFileSystem};
//! use std::path::Path;
//!
//! let probe = Probe::new(RealFileSystem::new(), ProbeConfig::default());
//! match probe.run(None, Path::new("/repo/tools")) {
//!     Outcome::Success { identifier, .. } => println!("{}", identifier.text()),
//!     other => eprintln!("exit {}", other.exit_code()),
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`locator`]: picks the artifact path, with a recursive fallback search
//! - [`loader`]: reads and parses the artifact into an owned scope
//! - [`metadata`]: PE, metadata stream, table, signature and IL readers
//! - [`eval`]: static value recovery for literal, readonly and computed members
//! - [`resolver`]: finds the entity and its identifier member
//! - [`probe`]: the pipeline and its [`Outcome`]
//! - [`cli`]: argument parsing and report rendering

pub mod cli;
pub mod config;
pub mod eval;
pub mod fs;
pub mod loader;
pub mod locator;
pub mod metadata;
pub mod probe;
pub mod resolver;
pub mod util;

pub use cli::{Report, Reporter};
pub use config::{ConfigError, ProbeConfig};
pub use eval::{EvalError, StaticValue};
pub use fs::{FileSystem, MockFileSystem, RealFileSystem};
pub use loader::{ArtifactLoader, LoadError, LoadedArtifact};
pub use locator::{ArtifactLocator, LocateError, ResolvedPath};
pub use metadata::{Assembly, MetadataError};
pub use probe::{exit_code, Outcome, Probe};
pub use resolver::{IdentifierValue, MemberKind, MemberResolver, ResolveError, TypeCatalog};
pub use util::{init_default, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
