//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use content_store::store::{ByteReader, ByteWriter, FileStats};
use content_store::{FileSystem, LocalFileSystem, User};
use glob::Pattern;
use serde_json::Value;

/// Faults to inject into an [`InstrumentedFileSystem`]
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Fail `write_document` for any path with this file name
    pub fail_document_named: Option<String>,

    /// Never complete `write_document` for any path with this file name
    pub hang_document_named: Option<String>,

    /// Fail every `remove_recursive` call
    pub fail_remove_recursive: bool,

    /// Fail every `rename` call
    pub fail_rename: bool,
}

/// Local filesystem that counts calls and injects faults
#[derive(Default)]
pub struct InstrumentedFileSystem {
    inner: LocalFileSystem,
    faults: Faults,
    exists_calls: AtomicUsize,
    mutations: AtomicUsize,
}

impl InstrumentedFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Number of `exists` and `is_dir` calls so far
    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    /// Number of calls that create, write, move or remove anything
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.exists_calls.store(0, Ordering::SeqCst);
        self.mutations.store(0, Ordering::SeqCst);
    }

    fn mutate(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected fault: {}", what))
}

#[async_trait]
impl FileSystem for InstrumentedFileSystem {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(path).await
    }

    async fn is_dir(&self, path: &Path) -> io::Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.is_dir(path).await
    }

    async fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        self.mutate();
        self.inner.ensure_dir(path).await
    }

    async fn write_document(&self, path: &Path, document: &Value) -> io::Result<()> {
        self.mutate();
        if let Some(ref name) = self.faults.fail_document_named {
            if path.file_name().and_then(|n| n.to_str()) == Some(name.as_str()) {
                return Err(injected("write_document"));
            }
        }
        if let Some(ref name) = self.faults.hang_document_named {
            if path.file_name().and_then(|n| n.to_str()) == Some(name.as_str()) {
                std::future::pending::<()>().await;
            }
        }
        self.inner.write_document(path, document).await
    }

    async fn read_document(&self, path: &Path) -> io::Result<Value> {
        self.inner.read_document(path).await
    }

    async fn open_read(&self, path: &Path) -> io::Result<ByteReader> {
        self.inner.open_read(path).await
    }

    async fn open_write(&self, path: &Path) -> io::Result<ByteWriter> {
        self.mutate();
        self.inner.open_write(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.mutate();
        if self.faults.fail_rename {
            return Err(injected("rename"));
        }
        self.inner.rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.mutate();
        self.inner.remove_file(path).await
    }

    async fn remove_recursive(&self, path: &Path) -> io::Result<()> {
        self.mutate();
        if self.faults.fail_remove_recursive {
            return Err(injected("remove_recursive"));
        }
        self.inner.remove_recursive(path).await
    }

    async fn list_files(&self, dir: &Path, excludes: &[Pattern]) -> io::Result<Vec<PathBuf>> {
        self.inner.list_files(dir, excludes).await
    }

    async fn list_dirs(&self, dir: &Path) -> io::Result<Vec<String>> {
        self.inner.list_dirs(dir).await
    }

    async fn file_stats(&self, path: &Path) -> io::Result<FileStats> {
        self.inner.file_stats(path).await
    }
}

pub fn test_user() -> User {
    User::new("1", "Test User")
}

/// Every file below `dir`, relative and sorted
pub fn files_below(dir: &Path) -> Vec<PathBuf> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(base, &path, out);
            } else if let Ok(relative) = path.strip_prefix(base) {
                out.push(relative.to_path_buf());
            }
        }
    }

    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}
