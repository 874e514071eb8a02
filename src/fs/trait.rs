//! FileSystem trait definition

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only file system operations used while locating and loading artifacts
pub trait FileSystem: Send + Sync {
    /// Check if path is a regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Read the whole file
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Recursively collect every file under `root` whose file name is exactly `file_name`.
    ///
    /// The order of the returned paths is whatever the underlying traversal yields.
    fn find_files_named(&self, root: &Path, file_name: &str) -> Result<Vec<PathBuf>>;
}

impl<T: FileSystem + ?Sized> FileSystem for Arc<T> {
    fn is_file(&self, path: &Path) -> bool {
        (**self).is_file(path)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        (**self).read(path)
    }

    fn find_files_named(&self, root: &Path, file_name: &str) -> Result<Vec<PathBuf>> {
        (**self).find_files_named(root, file_name)
    }
}
