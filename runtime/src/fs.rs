//! # Filesystem
//!
//! Async file I/O over `tokio::fs`, following the async-request lifecycle
//! of spec.md §3: each operation is tagged with the syscall name it failed
//! under so the resulting [`FileError`] carries `path`/`syscall` context —
//! grounded in `original_source/core/tjs/src/fs.c`, the largest single file
//! in the original and the clearest real exerciser of that pattern.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{FileError, TransportError};

fn wrap(err: std::io::Error, path: &Path, syscall: &'static str) -> FileError {
    FileError {
        transport: TransportError::from_io(&err),
        path: Some(path.to_string_lossy().into_owned()),
        syscall,
    }
}

/// `fs.open`/`fs.read` combined into one call, since `tokio::fs::read`
/// already does both under the hood the way the host surface exposes them
/// as a single awaited operation.
pub async fn read(path: impl AsRef<Path>) -> Result<Vec<u8>, FileError> {
    let path = path.as_ref();
    fs::read(path).await.map_err(|e| wrap(e, path, "read"))
}

/// Writes `data` to `path`, creating or truncating it.
pub async fn write(path: impl AsRef<Path>, data: &[u8]) -> Result<(), FileError> {
    let path = path.as_ref();
    fs::write(path, data).await.map_err(|e| wrap(e, path, "write"))
}

/// Metadata the way `fs.stat` marshals it to JS: size, modified time (as
/// Unix seconds), and whether the path is a directory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Stat {
    /// File size in bytes.
    pub size: u64,
    /// Last modified time, Unix seconds, when the platform reports one.
    pub mtime: Option<i64>,
    /// Whether `path` names a directory.
    pub is_directory: bool,
    /// Whether `path` names a regular file.
    pub is_file: bool,
}

/// `fs.stat(path)`.
pub async fn stat(path: impl AsRef<Path>) -> Result<Stat, FileError> {
    let path = path.as_ref();
    let meta = fs::metadata(path).await.map_err(|e| wrap(e, path, "stat"))?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);
    Ok(Stat {
        size: meta.len(),
        mtime,
        is_directory: meta.is_dir(),
        is_file: meta.is_file(),
    })
}

/// `fs.readdir(path)`: entry names only, sorted for deterministic output.
pub async fn readdir(path: impl AsRef<Path>) -> Result<Vec<String>, FileError> {
    let path = path.as_ref();
    let mut entries = fs::read_dir(path).await.map_err(|e| wrap(e, path, "readdir"))?;
    let mut names = Vec::new();
    loop {
        let next = entries.next_entry().await.map_err(|e| wrap(e, path, "readdir"))?;
        match next {
            Some(entry) => names.push(entry.file_name().to_string_lossy().into_owned()),
            None => break,
        }
    }
    names.sort();
    Ok(names)
}

/// `fs.realpath(path)`.
pub async fn realpath(path: impl AsRef<Path>) -> Result<PathBuf, FileError> {
    let path = path.as_ref();
    fs::canonicalize(path).await.map_err(|e| wrap(e, path, "realpath"))
}

/// `fs.mkdir(path)`; non-recursive, matching a single `mkdir` syscall.
pub async fn mkdir(path: impl AsRef<Path>) -> Result<(), FileError> {
    let path = path.as_ref();
    fs::create_dir(path).await.map_err(|e| wrap(e, path, "mkdir"))
}

/// `fs.rmdir(path)`.
pub async fn rmdir(path: impl AsRef<Path>) -> Result<(), FileError> {
    let path = path.as_ref();
    fs::remove_dir(path).await.map_err(|e| wrap(e, path, "rmdir"))
}

/// `fs.rename(from, to)`.
pub async fn rename(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<(), FileError> {
    let from = from.as_ref();
    fs::rename(from, to.as_ref())
        .await
        .map_err(|e| wrap(e, from, "rename"))
}

/// `fs.unlink(path)`.
pub async fn unlink(path: impl AsRef<Path>) -> Result<(), FileError> {
    let path = path.as_ref();
    fs::remove_file(path).await.map_err(|e| wrap(e, path, "unlink"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        write(&path, b"hello").await.unwrap();
        assert_eq!(read(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn stat_reports_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        write(&path, b"12345").await.unwrap();
        let meta = stat(&path).await.unwrap();
        assert_eq!(meta.size, 5);
        assert!(meta.is_file);
    }

    #[tokio::test]
    async fn readdir_lists_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path().join("b.txt"), b"").await.unwrap();
        write(dir.path().join("a.txt"), b"").await.unwrap();
        let names = readdir(dir.path()).await.unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn missing_file_read_reports_path_and_syscall() {
        let err = read("/nonexistent/path/definitely").await.unwrap_err();
        assert_eq!(err.syscall, "read");
        assert!(err.path.is_some());
    }

    #[tokio::test]
    async fn mkdir_rmdir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("child");
        mkdir(&sub).await.unwrap();
        assert!(stat(&sub).await.unwrap().is_directory);
        rmdir(&sub).await.unwrap();
        assert!(stat(&sub).await.is_err());
    }

    #[tokio::test]
    async fn rename_then_unlink() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        write(&a, b"x").await.unwrap();
        rename(&a, &b).await.unwrap();
        assert!(read(&a).await.is_err());
        unlink(&b).await.unwrap();
        assert!(read(&b).await.is_err());
    }
}
