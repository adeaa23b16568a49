//! Filesystem access for the partitioned data directory.
//!
//! All directory listing, manifest reading and existence probing used by the
//! resolvers goes through this module so that failures carry the path they
//! happened on. Only the local filesystem is supported, but callers work with
//! [`DataLocation`] rather than raw roots so another backend can be slotted in
//! without touching the resolvers.

mod error;

use std::{
    io,
    path::{Path, PathBuf},
};

use snafu::IntoError;
use tokio::fs;

pub use error::{BackendError, StorageError};
use error::{NotFoundSnafu, PermissionDeniedSnafu, UnreadableSnafu};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root of the `<database>/<measurement>/date=.../hour=...` tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataLocation {
    /// A data directory on the local filesystem.
    Local(PathBuf),
}

impl DataLocation {
    /// Creates a new `DataLocation` for a local filesystem path.
    ///
    /// Relative roots are made absolute against the current directory so that
    /// every resolved file path handed to the engine is absolute.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        DataLocation::Local(root)
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        match self {
            DataLocation::Local(root) => root,
        }
    }

    /// Join a path relative to the data root.
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        match self {
            DataLocation::Local(root) => root.join(rel),
        }
    }
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// File name of the entry.
    pub name: String,
    /// Full path of the entry.
    pub path: PathBuf,
    /// True for directories, including symbolic links that point at one.
    pub is_dir: bool,
    /// True for regular files, including symbolic links that point at one.
    pub is_file: bool,
}

fn map_io(path: &Path, e: io::Error) -> StorageError {
    let path = path.display().to_string();
    match e.kind() {
        io::ErrorKind::NotFound => NotFoundSnafu { path }.into_error(BackendError::Local(e)),
        io::ErrorKind::PermissionDenied => {
            PermissionDeniedSnafu { path }.into_error(BackendError::Local(e))
        }
        _ => UnreadableSnafu { path }.into_error(BackendError::Local(e)),
    }
}

/// Read the whole file at `path` as UTF-8 text.
pub async fn read_to_string(path: &Path) -> StorageResult<String> {
    fs::read_to_string(path).await.map_err(|e| map_io(path, e))
}

/// List the immediate children of `dir`, sorted by name.
///
/// Symbolic links are followed when classifying entries; links that cannot be
/// followed are reported as neither file nor directory.
pub async fn list_dir(dir: &Path) -> StorageResult<Vec<DirEntryInfo>> {
    let mut rd = fs::read_dir(dir).await.map_err(|e| map_io(dir, e))?;
    let mut out = Vec::new();

    while let Some(entry) = rd.next_entry().await.map_err(|e| map_io(dir, e))? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let (is_dir, is_file) = match fs::metadata(&path).await {
            Ok(meta) => (meta.is_dir(), meta.is_file()),
            Err(_) => (false, false),
        };
        out.push(DirEntryInfo {
            name,
            path,
            is_dir,
            is_file,
        });
    }

    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

/// Returns `Ok(true)` when `path` exists and is a regular file.
///
/// A missing path is `Ok(false)`; any other failure is surfaced.
pub async fn is_file(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(map_io(path, e)),
    }
}

/// Returns `Ok(true)` when `path` exists and is a directory.
pub async fn is_dir(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(map_io(path, e)),
    }
}

/// Resolve symbolic links and relative components of `path`.
pub async fn canonicalize(path: &Path) -> StorageResult<PathBuf> {
    fs::canonicalize(path).await.map_err(|e| map_io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn read_to_string_returns_file_contents() -> TestResult {
        let tmp = TempDir::new()?;
        let abs = tmp.path().join("readable.txt");
        tokio::fs::write(&abs, "file contents").await?;

        let result = read_to_string(&abs).await?;
        assert_eq!(result, "file contents");
        Ok(())
    }

    #[tokio::test]
    async fn read_to_string_returns_not_found_for_missing_file() -> TestResult {
        let tmp = TempDir::new()?;
        let abs = tmp.path().join("does_not_exist.txt");

        let err = read_to_string(&abs).await.expect_err("expected NotFound error");
        assert!(err.is_not_found());
        assert!(err.path().ends_with("does_not_exist.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn list_dir_sorts_and_classifies_entries() -> TestResult {
        let tmp = TempDir::new()?;
        tokio::fs::create_dir(tmp.path().join("b_dir")).await?;
        tokio::fs::write(tmp.path().join("a.parquet"), b"x").await?;

        let entries = list_dir(tmp.path()).await?;
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.parquet", "b_dir"]);
        assert!(entries[0].is_file && !entries[0].is_dir);
        assert!(entries[1].is_dir && !entries[1].is_file);
        Ok(())
    }

    #[tokio::test]
    async fn list_dir_missing_directory_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let err = list_dir(&tmp.path().join("nope"))
            .await
            .expect_err("expected NotFound error");
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn is_file_distinguishes_missing_and_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let file = tmp.path().join("f.parquet");
        tokio::fs::write(&file, b"x").await?;

        assert!(is_file(&file).await?);
        assert!(!is_file(tmp.path()).await?);
        assert!(!is_file(&tmp.path().join("missing")).await?);
        assert!(is_dir(tmp.path()).await?);
        Ok(())
    }

    #[test]
    fn data_location_joins_relative_paths() {
        let loc = DataLocation::local("/data/root");
        assert_eq!(loc.join("db/m"), PathBuf::from("/data/root/db/m"));
        assert_eq!(loc.root(), Path::new("/data/root"));
    }
}
