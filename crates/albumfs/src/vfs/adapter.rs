use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::attr::{AttributeSynthesizer, FileAttr};
use super::dir::{DirEntry, DirectoryEnumerator};
use super::path::{PathInfo, PathResolver, components};
use super::upload::UploadBufferManager;
use crate::config::MountConfig;
use crate::error::{Error, Result};
use crate::logging_impl::LogConfig;
use crate::model::AlbumStore;

/// Access mode requested by `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    /// Decode the access mode from `open(2)` flags.
    pub fn from_flags(flags: i32) -> Self {
        match flags & libc::O_ACCMODE {
            libc::O_RDONLY => OpenMode::Read,
            libc::O_WRONLY => OpenMode::Write,
            _ => OpenMode::ReadWrite,
        }
    }
}

/// The filesystem surface over an [`AlbumStore`].
///
/// Operations take paths relative to the mount root (a leading `/` is
/// optional) and are strictly serialized: each one runs under a single
/// adapter-wide lock, including any network round trips it triggers.
///
/// # Example
///
/// ```rust
/// use albumfs::network::{DEFAULT_MEMORY_URL, HttpTransport, MemoryService, StaticToken};
/// use albumfs::{AlbumStore, FilesystemAdapter, MountConfig, ServiceConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> albumfs::Result<()> {
/// let config = ServiceConfig::new().service_url(DEFAULT_MEMORY_URL);
/// let service = Arc::new(MemoryService::demo());
/// let transport = HttpTransport::with_backend(service, &config, Arc::new(StaticToken::new("t")));
/// let store = Arc::new(AlbumStore::connect(Arc::new(transport), &config)?);
/// let fs = FilesystemAdapter::new(store, MountConfig::default());
///
/// let names: Vec<String> = fs.readdir("/").await?.into_iter().map(|e| e.name).collect();
/// assert!(names.contains(&"Trip".to_string()));
/// # Ok(())
/// # }
/// ```
pub struct FilesystemAdapter {
    store: Arc<AlbumStore>,
    resolver: PathResolver,
    uploads: UploadBufferManager,
    attrs: AttributeSynthesizer,
    dirs: DirectoryEnumerator,
    config: MountConfig,
    lock: Mutex<()>,
    log: LogConfig,
}

impl FilesystemAdapter {
    pub fn new(store: Arc<AlbumStore>, config: MountConfig) -> Self {
        Self {
            resolver: PathResolver::new(store.clone()),
            uploads: UploadBufferManager::new(store.clone()),
            attrs: AttributeSynthesizer::new(config.allow_destructive),
            dirs: DirectoryEnumerator::new(store.clone()),
            store,
            config,
            lock: Mutex::new(()),
            log: LogConfig::default(),
        }
    }

    pub fn store(&self) -> &Arc<AlbumStore> {
        &self.store
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Run one operation: serialize, log, report.
    async fn dispatch<T>(
        &self,
        op: &'static str,
        path: &str,
        f: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let _guard = self.lock.lock().await;
        let shown = self.log.display_name(path);
        tracing::debug!(op, path = %shown);
        let result = f.await;
        if let Err(e) = &result {
            if e.is_remote() || matches!(e, Error::Io(_)) {
                tracing::error!(op, path = %shown, "{}", e);
            } else {
                tracing::debug!(op, path = %shown, errno = e.errno(), "{}", e);
            }
        }
        result
    }

    async fn resolve(&self, path: &str) -> Result<PathInfo> {
        self.resolver.resolve(path, &self.uploads).await
    }

    pub async fn getattr(&self, path: &str) -> Result<FileAttr> {
        self.dispatch("getattr", path, async {
            match self.resolve(path).await? {
                PathInfo::Root => Ok(self.attrs.root(self.store.len().await?)),
                PathInfo::Album(album) => Ok(self.attrs.album(&album)),
                PathInfo::Photo { photo, .. } => Ok(self.attrs.photo(&photo)),
                PathInfo::UploadBuffer => match self.uploads.attr(path).await? {
                    Some((size, modified)) => Ok(self.attrs.upload(size, modified)),
                    None => Err(Error::NotFound(path.to_string())),
                },
                PathInfo::NotFound => Err(Error::NotFound(path.to_string())),
            }
        })
        .await
    }

    pub async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.dispatch("readdir", path, async {
            let info = self.resolve(path).await?;
            self.dirs.list(path, &info).await
        })
        .await
    }

    /// Create an album named after the single path component.
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        self.dispatch("mkdir", path, async {
            if self.resolve(path).await?.exists() {
                return Err(Error::AlreadyExists(path.to_string()));
            }
            match components(path).as_slice() {
                [name] => self.store.add(name).await.map(|_| ()),
                _ => Err(Error::NotPermitted(format!(
                    "{}: albums cannot be nested",
                    path
                ))),
            }
        })
        .await
    }

    /// Delete an empty album.
    pub async fn rmdir(&self, path: &str) -> Result<()> {
        self.dispatch("rmdir", path, async {
            if !self.config.allow_destructive {
                return Err(Error::NotPermitted("destructive operations are disabled".into()));
            }
            match self.resolve(path).await? {
                PathInfo::Album(album) => {
                    if !album.photos().await?.is_empty() {
                        return Err(Error::NotEmpty(path.to_string()));
                    }
                    self.store.remove(album.title()).await
                }
                PathInfo::Root => Err(Error::NotPermitted("cannot remove the root".into())),
                PathInfo::Photo { .. } | PathInfo::UploadBuffer => {
                    Err(Error::NotADirectory(path.to_string()))
                }
                PathInfo::NotFound => Err(Error::NotFound(path.to_string())),
            }
        })
        .await
    }

    /// Open an upload buffer for a new photo.
    pub async fn create(&self, path: &str) -> Result<()> {
        self.dispatch("create", path, self.uploads.create_buffer(path))
            .await
    }

    /// Check that `path` can be opened in `mode`.
    ///
    /// Reads need an existing photo, writes need a buffer from `create`.
    /// Directories give `IsADirectory`; the kernel opens them with
    /// `opendir`, which never reaches this call.
    pub async fn open(&self, path: &str, mode: OpenMode) -> Result<()> {
        self.dispatch("open", path, async {
            match mode {
                OpenMode::Read => match self.resolve(path).await? {
                    PathInfo::Photo { .. } | PathInfo::UploadBuffer => Ok(()),
                    PathInfo::Root | PathInfo::Album(_) => {
                        Err(Error::IsADirectory(path.to_string()))
                    }
                    PathInfo::NotFound => Err(Error::NotFound(path.to_string())),
                },
                OpenMode::Write => {
                    if self.uploads.has_buffer(path).await {
                        Ok(())
                    } else {
                        Err(Error::BufferNotReady(path.to_string()))
                    }
                }
                OpenMode::ReadWrite => Err(Error::AccessDenied(format!(
                    "{}: read-write access is not supported",
                    path
                ))),
            }
        })
        .await
    }

    /// Up to `size` bytes of the image starting at `offset`.
    ///
    /// Once a read reaches the end of the image the cached bytes are
    /// dropped, so the next read downloads them again.
    pub async fn read(&self, path: &str, offset: u64, size: u32) -> Result<Vec<u8>> {
        self.dispatch("read", path, async {
            let photo = match self.resolve(path).await? {
                PathInfo::Photo { photo, .. } => photo,
                PathInfo::UploadBuffer => {
                    let bytes = self.uploads.contents(path).await?;
                    return Ok(slice(&bytes, offset, size).to_vec());
                }
                _ => return Err(Error::NotFound(path.to_string())),
            };
            let image = photo.image().await?;
            let chunk = slice(&image, offset, size).to_vec();
            if offset.saturating_add(u64::from(size)) >= image.len() as u64 {
                photo.cleanup().await;
            }
            Ok(chunk)
        })
        .await
    }

    pub async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        self.dispatch("write", path, self.uploads.write(path, offset, data))
            .await
    }

    /// Upload the buffer behind `path`. A second flush after a successful
    /// one fails with [`Error::BufferNotReady`].
    pub async fn flush(&self, path: &str) -> Result<()> {
        self.dispatch("flush", path, self.uploads.flush(path)).await
    }

    /// Drop any leftover buffer. Never fails.
    pub async fn release(&self, path: &str) -> Result<()> {
        self.dispatch("release", path, async {
            if self.uploads.release(path).await {
                tracing::debug!("discarded unflushed upload buffer");
            }
            Ok(())
        })
        .await
    }

    /// Delete a photo.
    pub async fn unlink(&self, path: &str) -> Result<()> {
        self.dispatch("unlink", path, async {
            if !self.config.allow_destructive {
                return Err(Error::NotPermitted("destructive operations are disabled".into()));
            }
            match self.resolve(path).await? {
                PathInfo::Photo { album, photo } => album.remove_photo(photo.title()).await,
                PathInfo::UploadBuffer => {
                    self.uploads.release(path).await;
                    Ok(())
                }
                PathInfo::Root | PathInfo::Album(_) => Err(Error::IsADirectory(path.to_string())),
                PathInfo::NotFound => Err(Error::NotFound(path.to_string())),
            }
        })
        .await
    }

    /// Drop every cached album, photo list and image.
    pub async fn invalidate(&self) {
        let _guard = self.lock.lock().await;
        self.store.invalidate().await;
    }
}

fn slice(bytes: &[u8], offset: u64, size: u32) -> &[u8] {
    let len = bytes.len() as u64;
    let start = offset.min(len) as usize;
    let end = offset.saturating_add(u64::from(size)).min(len) as usize;
    &bytes[start..end]
}
