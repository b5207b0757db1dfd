//! Staging for files written through the mount.
//!
//! `create` opens a buffer backed by an anonymous temporary file, `write`
//! lands bytes at any offset, and `flush` uploads the whole file as one
//! photo. A failed upload keeps the buffer so the flush can be retried.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::path::{PathResolver, components, normalize, split_path};
use crate::error::{Error, Result};
use crate::model::AlbumStore;

struct UploadBuffer {
    file: File,
}

impl UploadBuffer {
    fn new() -> Result<Self> {
        let file = tempfile::tempfile()?;
        Ok(Self {
            file: File::from_std(file),
        })
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        self.file.flush().await?;
        Ok(())
    }

    async fn contents(&mut self) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0)).await?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }

    async fn stat(&self) -> Result<(u64, SystemTime)> {
        let metadata = self.file.metadata().await?;
        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        Ok((metadata.len(), modified))
    }
}

/// Path → staging buffer table. At most one buffer per path.
pub struct UploadBufferManager {
    store: Arc<AlbumStore>,
    resolver: PathResolver,
    buffers: Mutex<HashMap<String, UploadBuffer>>,
}

impl UploadBufferManager {
    pub fn new(store: Arc<AlbumStore>) -> Self {
        Self {
            resolver: PathResolver::new(store.clone()),
            store,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn has_buffer(&self, path: &str) -> bool {
        self.buffers.lock().await.contains_key(normalize(path))
    }

    /// Number of open buffers.
    pub async fn len(&self) -> usize {
        self.buffers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Open a buffer for a new photo at `album/name`.
    pub async fn create_buffer(&self, path: &str) -> Result<()> {
        let key = normalize(path);
        if self.resolver.resolve(key, self).await?.exists() {
            return Err(Error::AlreadyExists(key.to_string()));
        }
        match components(key).len() {
            0 | 1 => return Err(Error::NotPermitted(format!("{}: files live inside albums", key))),
            2 => {}
            _ => return Err(Error::NotFound(key.to_string())),
        }
        let Some((album_name, title)) = split_path(key) else {
            return Err(Error::NotFound(key.to_string()));
        };
        let Some(album) = self.store.get(album_name).await? else {
            return Err(Error::NotFound(album_name.to_string()));
        };
        album.check_photo_name(title)?;

        let mut buffers = self.buffers.lock().await;
        if buffers.contains_key(key) {
            return Err(Error::AlreadyExists(key.to_string()));
        }
        buffers.insert(key.to_string(), UploadBuffer::new()?);
        tracing::debug!(open = buffers.len(), "upload buffer created");
        Ok(())
    }

    /// Write `data` at `offset`. Gaps read back as zeros.
    pub async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let key = normalize(path);
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers
            .get_mut(key)
            .ok_or_else(|| Error::BufferNotReady(key.to_string()))?;
        buffer.write_at(offset, data).await?;
        Ok(data.len())
    }

    /// Upload the buffered bytes as a photo and drop the buffer.
    pub async fn flush(&self, path: &str) -> Result<()> {
        let key = normalize(path);
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers
            .get_mut(key)
            .ok_or_else(|| Error::BufferNotReady(key.to_string()))?;
        let bytes = buffer.contents().await?;

        let (album_name, title) =
            split_path(key).ok_or_else(|| Error::NotFound(key.to_string()))?;
        let album = self
            .store
            .get(album_name)
            .await?
            .ok_or_else(|| Error::NotFound(album_name.to_string()))?;

        if let Err(e) = album.add_photo(title, bytes).await {
            tracing::warn!("upload failed, keeping buffer for retry: {}", e);
            return Err(e);
        }
        buffers.remove(key);
        Ok(())
    }

    /// Drop the buffer without uploading. Returns whether one existed.
    pub async fn release(&self, path: &str) -> bool {
        self.buffers.lock().await.remove(normalize(path)).is_some()
    }

    /// Live size and modification time of the staged file.
    pub async fn attr(&self, path: &str) -> Result<Option<(u64, SystemTime)>> {
        let buffers = self.buffers.lock().await;
        match buffers.get(normalize(path)) {
            Some(buffer) => Ok(Some(buffer.stat().await?)),
            None => Ok(None),
        }
    }

    /// Buffered bytes, for reads of a file that is still being written.
    pub async fn contents(&self, path: &str) -> Result<Vec<u8>> {
        let key = normalize(path);
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers
            .get_mut(key)
            .ok_or_else(|| Error::BufferNotReady(key.to_string()))?;
        buffer.contents().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::network::{DEFAULT_MEMORY_URL, HttpTransport, MemoryService, StaticToken};
    use std::time::Duration;

    fn setup() -> (Arc<MemoryService>, UploadBufferManager) {
        let service = Arc::new(MemoryService::new());
        let trip = service.add_album("Trip");
        service.add_photo(trip, "old.jpg", vec![1]);
        let config = ServiceConfig::new()
            .service_url(DEFAULT_MEMORY_URL)
            .max_retries(0)
            .retry_delay(Duration::from_millis(1));
        let transport = HttpTransport::with_backend(
            service.clone(),
            &config,
            Arc::new(StaticToken::new("t")),
        );
        let store = Arc::new(AlbumStore::connect(Arc::new(transport), &config).unwrap());
        (service, UploadBufferManager::new(store))
    }

    #[tokio::test]
    async fn test_create_write_flush() {
        let (service, uploads) = setup();
        uploads.create_buffer("/Trip/new.jpg").await.unwrap();
        assert!(uploads.has_buffer("/Trip/new.jpg").await);

        assert_eq!(uploads.write("/Trip/new.jpg", 0, b"hello").await.unwrap(), 5);
        let (size, _) = uploads.attr("/Trip/new.jpg").await.unwrap().unwrap();
        assert_eq!(size, 5);

        uploads.flush("/Trip/new.jpg").await.unwrap();
        assert!(!uploads.has_buffer("/Trip/new.jpg").await);
        assert_eq!(
            service.photo_bytes("Trip", "new.jpg"),
            Some(b"hello".to_vec())
        );
    }

    #[tokio::test]
    async fn test_gaps_read_as_zeros() {
        let (_, uploads) = setup();
        uploads.create_buffer("Trip/gap.jpg").await.unwrap();
        uploads.write("Trip/gap.jpg", 4, b"xy").await.unwrap();
        assert_eq!(
            uploads.contents("Trip/gap.jpg").await.unwrap(),
            vec![0, 0, 0, 0, b'x', b'y']
        );
    }

    #[tokio::test]
    async fn test_create_conflicts() {
        let (_, uploads) = setup();
        assert!(matches!(
            uploads.create_buffer("/Trip/old.jpg").await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            uploads.create_buffer("/Trip").await,
            Err(Error::AlreadyExists(_))
        ));
        uploads.create_buffer("/Trip/a.jpg").await.unwrap();
        assert!(matches!(
            uploads.create_buffer("/Trip/a.jpg").await,
            Err(Error::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_create_outside_album() {
        let (_, uploads) = setup();
        assert!(matches!(
            uploads.create_buffer("/loose.jpg").await,
            Err(Error::NotPermitted(_))
        ));
        assert!(matches!(
            uploads.create_buffer("/Nowhere/a.jpg").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            uploads.create_buffer("/Trip/x/a.jpg").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_refuses_names_a_reload_would_change() {
        let (_, uploads) = setup();
        for path in ["/Trip/a.jpg ", "/Trip/ a.jpg", "/Trip/Untitled", "/Trip/.."] {
            assert!(
                matches!(uploads.create_buffer(path).await, Err(Error::NotPermitted(_))),
                "{:?}",
                path
            );
        }
        assert!(uploads.is_empty().await);
    }

    #[tokio::test]
    async fn test_write_and_flush_without_buffer() {
        let (_, uploads) = setup();
        assert!(matches!(
            uploads.write("/Trip/none.jpg", 0, b"x").await,
            Err(Error::BufferNotReady(_))
        ));
        assert!(matches!(
            uploads.flush("/Trip/none.jpg").await,
            Err(Error::BufferNotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_buffer() {
        let (service, uploads) = setup();
        uploads.create_buffer("/Trip/retry.jpg").await.unwrap();
        uploads.write("/Trip/retry.jpg", 0, b"data").await.unwrap();

        service.fail_next(1, 500);
        assert!(matches!(
            uploads.flush("/Trip/retry.jpg").await,
            Err(Error::TransportFailure(_))
        ));
        assert!(uploads.has_buffer("/Trip/retry.jpg").await);

        uploads.flush("/Trip/retry.jpg").await.unwrap();
        assert_eq!(service.photo_bytes("Trip", "retry.jpg"), Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn test_release_never_uploads() {
        let (service, uploads) = setup();
        uploads.create_buffer("/Trip/tmp.jpg").await.unwrap();
        uploads.write("/Trip/tmp.jpg", 0, b"data").await.unwrap();
        assert!(uploads.release("/Trip/tmp.jpg").await);
        assert!(!uploads.release("/Trip/tmp.jpg").await);
        assert!(uploads.is_empty().await);
        assert_eq!(service.photo_bytes("Trip", "tmp.jpg"), None);
    }
}
