//! Directory-backed store of content objects.
//!
//! Each content id owns one directory under the store root holding the
//! metadata document, the primary content document and any attached
//! files (see [`super::paths`] for the layout).
//!
//! The store assumes a single writer per content id at any instant.
//! Concurrent create/delete/attach calls against the same id race at the
//! filesystem level; callers that need per-id atomicity must serialize
//! those calls themselves.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use glob::Pattern;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::{Result, StoreError};
use super::fs::{ByteReader, FileStats, FileSystem, LocalFileSystem};
use super::paths::{ContentLayout, FilePath, PARAMETERS_FILE, UPLOAD_GLOB};
use super::permissions::{GrantAll, PermissionPolicy};
use crate::config::StoreSettings;
use crate::domain::{ContentId, Permission, User, MAX_CONTENT_ID};

/// Persistent store of content objects under one root directory
pub struct ContentStore {
    layout: ContentLayout,
    fs: Arc<dyn FileSystem>,
    policy: Arc<dyn PermissionPolicy>,
    rng: Mutex<StdRng>,
    max_id_attempts: u32,
    max_id: u64,
    file_excludes: Vec<Pattern>,
}

impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore")
            .field("root", &self.layout.root())
            .field("max_id_attempts", &self.max_id_attempts)
            .field("max_id", &self.max_id)
            .finish_non_exhaustive()
    }
}

impl ContentStore {
    /// Create a store on the local filesystem
    pub fn new(settings: StoreSettings) -> Self {
        Self::with_file_system(settings, Arc::new(LocalFileSystem::new()))
    }

    /// Create a store on top of a custom filesystem implementation
    pub fn with_file_system(settings: StoreSettings, fs: Arc<dyn FileSystem>) -> Self {
        // Both patterns are static and always compile
        let file_excludes = [Pattern::escape(PARAMETERS_FILE), UPLOAD_GLOB.to_string()]
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();

        Self {
            layout: ContentLayout::new(settings.root),
            fs,
            policy: Arc::new(GrantAll),
            rng: Mutex::new(StdRng::from_entropy()),
            max_id_attempts: settings.max_id_attempts.max(1),
            max_id: settings.max_id.clamp(1, MAX_CONTENT_ID),
            file_excludes,
        }
    }

    /// Create a store from the global configuration
    pub fn from_config() -> anyhow::Result<Self> {
        let config = crate::config::config()?;
        Ok(Self::new(config.store.clone()))
    }

    /// Replace the permission policy (defaults to [`GrantAll`])
    pub fn with_permission_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Make id generation deterministic
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Root directory holding one subdirectory per content id
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &ContentLayout {
        &self.layout
    }

    /// Draw a random id that is not in use.
    ///
    /// Fails with [`StoreError::IdExhaustion`] once every attempt has hit
    /// an existing id.
    pub async fn create_content_id(&self) -> Result<ContentId> {
        for attempt in 1..=self.max_id_attempts {
            let candidate = self.random_candidate();
            if !self.content_exists(candidate).await? {
                debug!(id = %candidate, attempt, "Allocated content id");
                return Ok(candidate);
            }
            debug!(id = %candidate, attempt, "Content id already taken");
        }

        warn!(attempts = self.max_id_attempts, "Content id space exhausted");
        Err(StoreError::IdExhaustion {
            attempts: self.max_id_attempts,
        })
    }

    fn random_candidate(&self) -> ContentId {
        let value = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(1..=self.max_id);
        // max_id is clamped to [1, 2^32] at construction
        ContentId::from_raw(value)
    }

    /// Persist a new content object and return its id.
    ///
    /// Without an explicit `id` a free one is drawn with
    /// [`Self::create_content_id`]. A supplied id is not checked for
    /// uniqueness. If any write fails, the directory created for the
    /// record is removed again before [`StoreError::ContentCreation`] is
    /// returned, so a failed call never leaves a half-written record.
    #[instrument(skip(self, metadata, content, user), fields(user = %user.id))]
    pub async fn create_content<M, C>(
        &self,
        metadata: &M,
        content: &C,
        user: &User,
        id: Option<ContentId>,
    ) -> Result<ContentId>
    where
        M: Serialize + Sync + ?Sized,
        C: Serialize + Sync + ?Sized,
    {
        let id = match id {
            Some(id) => id,
            None => self.create_content_id().await?,
        };
        let creation = move |source: StoreError| StoreError::ContentCreation {
            id,
            source: Box::new(source),
        };

        let metadata = to_document(metadata, &self.layout.metadata_path(id)).map_err(creation)?;
        let content = to_document(content, &self.layout.parameters_path(id)).map_err(creation)?;

        let dir = self.layout.content_dir(id);
        let existed = self
            .fs
            .is_dir(&dir)
            .await
            .map_err(|e| creation(StoreError::io(&dir, e)))?;

        // Never roll back a directory this call did not create
        let guard = if existed {
            warn!(%id, "Writing documents into an existing content directory");
            None
        } else {
            Some(RollbackGuard::arm(Arc::clone(&self.fs), dir))
        };

        match self.write_record(id, &metadata, &content).await {
            Ok(()) => {
                if let Some(guard) = guard {
                    guard.disarm();
                }
                info!(%id, "Content created");
                Ok(id)
            }
            Err(cause) => {
                if let Some(guard) = guard {
                    guard.rollback().await;
                }
                Err(creation(cause))
            }
        }
    }

    async fn write_record(&self, id: ContentId, metadata: &Value, content: &Value) -> Result<()> {
        let file_area = self.layout.file_area(id);
        self.fs
            .ensure_dir(&file_area)
            .await
            .map_err(|e| StoreError::io(&file_area, e))?;

        let metadata_path = self.layout.metadata_path(id);
        self.fs
            .write_document(&metadata_path, metadata)
            .await
            .map_err(|e| StoreError::io(&metadata_path, e))?;

        let parameters_path = self.layout.parameters_path(id);
        self.fs
            .write_document(&parameters_path, content)
            .await
            .map_err(|e| StoreError::io(&parameters_path, e))?;

        Ok(())
    }

    /// Whether a content object with this id exists
    pub async fn content_exists(&self, id: ContentId) -> Result<bool> {
        let dir = self.layout.content_dir(id);
        self.fs
            .is_dir(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))
    }

    async fn require_content(&self, id: ContentId) -> Result<()> {
        if self.content_exists(id).await? {
            Ok(())
        } else {
            Err(StoreError::ContentNotFound { id })
        }
    }

    /// Remove a content object and all of its files.
    ///
    /// Removal is not atomic: if it fails halfway the error is returned
    /// and the directory may be left partially deleted.
    #[instrument(skip(self, user), fields(%id))]
    pub async fn delete_content(&self, id: ContentId, user: Option<&User>) -> Result<()> {
        self.require_content(id).await?;

        let dir = self.layout.content_dir(id);
        self.fs
            .remove_recursive(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        info!(user = user.map(|u| u.id.as_str()).unwrap_or("-"), "Content deleted");
        Ok(())
    }

    /// Stream `data` into a file of an existing content object.
    ///
    /// The bytes are copied into a temporary sibling first and renamed
    /// over `path` once the source is fully drained, so an existing file
    /// at `path` is replaced only by a complete copy. Returns the number
    /// of bytes written.
    #[instrument(skip(self, data, user), fields(%id, user = %user.id))]
    pub async fn add_content_file<R>(
        &self,
        id: ContentId,
        path: &str,
        data: &mut R,
        user: &User,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        self.require_content(id).await?;

        let file = FilePath::parse(path)?;
        if file.is_reserved() {
            return Err(StoreError::ReservedPath(file.as_string()));
        }

        let target = self.layout.file_path(id, &file);
        if let Some(parent) = target.parent() {
            self.fs
                .ensure_dir(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let nonce = Uuid::new_v4().simple().to_string();
        let upload = self.layout.upload_path(id, &file, &nonce);

        let written = match self.stream_into(&upload, data).await {
            Ok(written) => written,
            Err(e) => {
                self.discard_upload(&upload).await;
                return Err(e);
            }
        };

        if let Err(e) = self.fs.rename(&upload, &target).await {
            self.discard_upload(&upload).await;
            return Err(StoreError::io(&target, e));
        }

        debug!(path = %file, bytes = written, "Content file stored");
        Ok(written)
    }

    async fn stream_into<R>(&self, path: &Path, data: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut writer = self
            .fs
            .open_write(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;

        let written = tokio::io::copy(data, &mut writer)
            .await
            .map_err(|e| StoreError::io(path, e))?;

        writer
            .shutdown()
            .await
            .map_err(|e| StoreError::io(path, e))?;

        Ok(written)
    }

    async fn discard_upload(&self, path: &Path) {
        match self.fs.remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial upload"),
        }
    }

    /// Relative paths of every attached file.
    ///
    /// The primary content document is never listed. Order follows the
    /// filesystem walk and is not guaranteed.
    pub async fn get_content_files(&self, id: ContentId, _user: &User) -> Result<Vec<String>> {
        self.require_content(id).await?;

        let area = self.layout.file_area(id);
        let files = self
            .fs
            .list_files(&area, &self.file_excludes)
            .await
            .map_err(|e| StoreError::io(&area, e))?;

        Ok(files.iter().map(|p| slash_path(p)).collect())
    }

    /// Open an attached file for reading.
    ///
    /// Dropping the returned stream releases the file handle, whether or
    /// not it was read to the end.
    pub async fn get_content_file_stream(
        &self,
        id: ContentId,
        path: &str,
        _user: &User,
    ) -> Result<ContentFileStream> {
        let file = FilePath::parse(path)?;
        self.require_content(id).await?;

        let target = self.layout.file_path(id, &file);
        let stats = self.stat_file(id, &file, &target).await?;

        let inner = self
            .fs
            .open_read(&target)
            .await
            .map_err(|e| file_error(id, &file, &target, e))?;

        Ok(ContentFileStream {
            inner,
            size: stats.size,
        })
    }

    /// Size and modification time of an attached file
    pub async fn get_content_file_stats(
        &self,
        id: ContentId,
        path: &str,
        _user: &User,
    ) -> Result<FileStats> {
        let file = FilePath::parse(path)?;
        self.require_content(id).await?;

        let target = self.layout.file_path(id, &file);
        self.stat_file(id, &file, &target).await
    }

    async fn stat_file(&self, id: ContentId, file: &FilePath, target: &Path) -> Result<FileStats> {
        let stats = self
            .fs
            .file_stats(target)
            .await
            .map_err(|e| file_error(id, file, target, e))?;

        if !stats.is_file {
            return Err(StoreError::FileNotFound {
                id,
                path: file.as_string(),
            });
        }
        Ok(stats)
    }

    /// Whether an attached file exists. A missing content object is not an error.
    pub async fn content_file_exists(&self, id: ContentId, path: &str) -> Result<bool> {
        let file = FilePath::parse(path)?;
        let target = self.layout.file_path(id, &file);
        self.fs
            .exists(&target)
            .await
            .map_err(|e| StoreError::io(&target, e))
    }

    /// Remove one attached file
    #[instrument(skip(self, user), fields(%id, user = %user.id))]
    pub async fn delete_content_file(&self, id: ContentId, path: &str, user: &User) -> Result<()> {
        let file = FilePath::parse(path)?;
        if file.is_reserved() {
            return Err(StoreError::ReservedPath(file.as_string()));
        }
        self.require_content(id).await?;

        let target = self.layout.file_path(id, &file);
        self.stat_file(id, &file, &target).await?;
        self.fs
            .remove_file(&target)
            .await
            .map_err(|e| file_error(id, &file, &target, e))?;

        debug!(path = %file, "Content file deleted");
        Ok(())
    }

    /// Read the metadata document (`h5p.json`)
    pub async fn get_metadata<T>(&self, id: ContentId, _user: &User) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.require_content(id).await?;
        self.read_document(&self.layout.metadata_path(id)).await
    }

    /// Read the primary content document (`content/content.json`)
    pub async fn get_parameters<T>(&self, id: ContentId, _user: &User) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.require_content(id).await?;
        self.read_document(&self.layout.parameters_path(id)).await
    }

    async fn read_document<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let document = self
            .fs
            .read_document(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;

        serde_json::from_value(document)
            .map_err(|e| StoreError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Ids of every stored content object, ascending
    pub async fn list_content(&self) -> Result<Vec<ContentId>> {
        let root = self.layout.root();
        let names = self
            .fs
            .list_dirs(root)
            .await
            .map_err(|e| StoreError::io(root, e))?;

        let mut ids: Vec<ContentId> = names.iter().filter_map(|n| n.parse().ok()).collect();
        ids.sort();
        Ok(ids)
    }

    /// Capabilities `user` holds over the content, as decided by the policy
    pub async fn get_user_permissions(
        &self,
        id: ContentId,
        user: &User,
    ) -> Result<BTreeSet<Permission>> {
        self.policy.permissions(id, user).await
    }
}

fn to_document<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| StoreError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn file_error(id: ContentId, file: &FilePath, target: &Path, e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::FileNotFound {
            id,
            path: file.as_string(),
        }
    } else {
        StoreError::io(target, e)
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

async fn remove_dir_quietly(fs: &dyn FileSystem, dir: &Path) {
    match fs.remove_recursive(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Rolled back content directory"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            dir = %dir.display(),
            error = %e,
            "Failed to roll back content directory"
        ),
    }
}

/// Removes a freshly created content directory unless disarmed.
///
/// If the creating future is dropped before it finishes, the removal is
/// spawned onto the current tokio runtime.
struct RollbackGuard {
    fs: Arc<dyn FileSystem>,
    dir: Option<PathBuf>,
}

impl RollbackGuard {
    fn arm(fs: Arc<dyn FileSystem>, dir: PathBuf) -> Self {
        Self { fs, dir: Some(dir) }
    }

    fn disarm(mut self) {
        self.dir = None;
    }

    async fn rollback(mut self) {
        if let Some(dir) = self.dir.take() {
            remove_dir_quietly(self.fs.as_ref(), &dir).await;
        }
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let fs = Arc::clone(&self.fs);
                handle.spawn(async move {
                    remove_dir_quietly(fs.as_ref(), &dir).await;
                });
            }
            Err(_) => warn!(
                dir = %dir.display(),
                "No runtime available to roll back abandoned content directory"
            ),
        }
    }
}

/// Readable stream over one attached file
pub struct ContentFileStream {
    inner: ByteReader,
    size: u64,
}

impl ContentFileStream {
    /// File size when the stream was opened
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Debug for ContentFileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentFileStream")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for ContentFileStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
