//! Filesystem abstraction the content store is written against.
//!
//! The store only talks to [`FileSystem`]; [`LocalFileSystem`] is the
//! `tokio::fs` implementation used outside of tests.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};

/// Readable byte stream handed out by a [`FileSystem`]
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable byte stream handed out by a [`FileSystem`]
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Size and modification time of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileStats {
    /// Size in bytes
    pub size: u64,

    /// Last modification time, if the platform reports one
    pub modified: Option<DateTime<Utc>>,

    /// False for directories and other non-regular entries
    pub is_file: bool,
}

/// Storage operations the content store depends on
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Whether anything exists at `path`
    async fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Whether `path` is a directory; false when nothing is there
    async fn is_dir(&self, path: &Path) -> io::Result<bool>;

    /// Create `path` and all missing parents
    async fn ensure_dir(&self, path: &Path) -> io::Result<()>;

    /// Serialize a JSON document to `path`, replacing any existing file
    async fn write_document(&self, path: &Path, document: &Value) -> io::Result<()>;

    /// Parse the JSON document at `path`
    async fn read_document(&self, path: &Path) -> io::Result<Value>;

    async fn open_read(&self, path: &Path) -> io::Result<ByteReader>;

    /// Open `path` for writing, truncating an existing file
    async fn open_write(&self, path: &Path) -> io::Result<ByteWriter>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything below it
    async fn remove_recursive(&self, path: &Path) -> io::Result<()>;

    /// Every regular file below `dir`, relative to `dir`.
    ///
    /// Files whose relative path matches one of `excludes` are skipped.
    /// A missing `dir` yields an empty list.
    async fn list_files(&self, dir: &Path, excludes: &[Pattern]) -> io::Result<Vec<PathBuf>>;

    /// Names of the immediate subdirectories of `dir`
    async fn list_dirs(&self, dir: &Path) -> io::Result<Vec<String>>;

    async fn file_stats(&self, path: &Path) -> io::Result<FileStats>;
}

/// Options for matching exclude patterns: `*` never crosses a `/`
pub fn exclude_match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// [`FileSystem`] backed by the local disk through `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        fs::try_exists(path).await
    }

    async fn is_dir(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn write_document(&self, path: &Path, document: &Value) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        fs::write(path, bytes).await
    }

    async fn read_document(&self, path: &Path) -> io::Result<Value> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn open_read(&self, path: &Path) -> io::Result<ByteReader> {
        let file = fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &Path) -> io::Result<ByteWriter> {
        let file = fs::File::create(path).await?;
        Ok(Box::new(file))
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn remove_recursive(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path).await
    }

    async fn list_files(&self, dir: &Path, excludes: &[Pattern]) -> io::Result<Vec<PathBuf>> {
        let dir = dir.to_path_buf();
        let excludes = excludes.to_vec();

        // glob walks the tree synchronously
        tokio::task::spawn_blocking(move || walk_files(&dir, &excludes))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    async fn list_dirs(&self, dir: &Path) -> io::Result<Vec<String>> {
        if !fs::try_exists(dir).await? {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }

        Ok(names)
    }

    async fn file_stats(&self, path: &Path) -> io::Result<FileStats> {
        let metadata = fs::metadata(path).await?;
        Ok(FileStats {
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            is_file: metadata.is_file(),
        })
    }
}

fn walk_files(dir: &Path, excludes: &[Pattern]) -> io::Result<Vec<PathBuf>> {
    let dir_str = dir.to_str().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Directory is not valid UTF-8: {}", dir.display()),
        )
    })?;
    let pattern = format!("{}/**/*", Pattern::escape(dir_str));
    let options = exclude_match_options();

    let entries = glob::glob(&pattern)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(io::Error::from)?;
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        if excludes
            .iter()
            .any(|pattern| pattern.matches_path_with(relative, options))
        {
            continue;
        }
        files.push(relative.to_path_buf());
    }

    Ok(files)
}
