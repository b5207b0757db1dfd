use indexmap::IndexMap;
use std::sync::Arc;

use super::{Album, AlbumMap, album_dir_name, is_stable_album_name, md5_hex, unique_name};
use crate::cache::Cached;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::logging_impl::sanitize_for_log;
use crate::network::Transport;
use crate::resource::{Resource, ResourceClient, rel};

/// Root of the album cache.
///
/// Built once per mount and shared as `Arc<AlbumStore>`. The album
/// collection is resolved and listed on first access; after that the map is
/// kept in sync by [`add`](Self::add) and [`remove`](Self::remove) until
/// [`invalidate`](Self::invalidate).
pub struct AlbumStore {
    client: ResourceClient,
    collection_id: String,
    placeholder: String,
    collection: Cached<Arc<Resource>>,
    albums: Cached<AlbumMap>,
}

impl AlbumStore {
    pub fn new(client: ResourceClient, config: &ServiceConfig) -> Self {
        Self {
            client,
            collection_id: config.collection_id.clone(),
            placeholder: config.placeholder_title.clone(),
            collection: Cached::new(),
            albums: Cached::new(),
        }
    }

    /// Store over `transport` for the service at `config.service_url`.
    pub fn connect(transport: Arc<dyn Transport>, config: &ServiceConfig) -> Result<Self> {
        let client = ResourceClient::new(transport, &config.service_url)?;
        Ok(Self::new(client, config))
    }

    pub fn client(&self) -> &ResourceClient {
        &self.client
    }

    async fn collection(&self) -> Result<Arc<Resource>> {
        self.collection
            .get_or_load(|| async {
                let collection = self.client.resolve(&self.collection_id).await?;
                Ok(Arc::new(collection))
            })
            .await
    }

    fn album(&self, resource: Resource, name: String) -> Arc<Album> {
        Arc::new(Album::new(
            self.client.clone(),
            resource,
            name,
            self.placeholder.clone(),
        ))
    }

    /// Albums keyed by directory name, in listing order.
    pub async fn albums(&self) -> Result<AlbumMap> {
        self.albums
            .get_or_load(|| async {
                let collection = self.collection().await?;
                let entries = self.client.children(&collection, rel::SELF).await?;
                let mut map = IndexMap::with_capacity(entries.len());
                for entry in entries {
                    let name = album_dir_name(&entry.title, &entry.id);
                    let Some(name) = unique_name(&map, name, || md5_hex(&entry.id)) else {
                        tracing::warn!(album = %entry.id, "skipping album with colliding name");
                        continue;
                    };
                    map.insert(name.clone(), self.album(entry, name));
                }
                tracing::debug!(albums = map.len(), "albums loaded");
                Ok(Arc::new(map))
            })
            .await
    }

    pub async fn get(&self, title: &str) -> Result<Option<Arc<Album>>> {
        Ok(self.albums().await?.get(title).cloned())
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.albums().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Create a remote album titled `title`.
    pub async fn add(&self, title: &str) -> Result<Arc<Album>> {
        if !is_stable_album_name(title) {
            return Err(Error::NotPermitted(format!(
                "{}: name would not survive a reload",
                title
            )));
        }
        if self.albums().await?.contains_key(title) {
            return Err(Error::AlreadyExists(title.to_string()));
        }
        let collection = self.collection().await?;
        let resource = self.client.create_entry(&collection, title).await?;
        let album = self.album(resource, title.to_string());
        self.albums
            .update_if_loaded(|map| {
                Arc::make_mut(map).insert(title.to_string(), album.clone());
            })
            .await;
        tracing::info!(album = %sanitize_for_log(title), "album created");
        Ok(album)
    }

    /// Delete the album titled `title` remotely and locally.
    pub async fn remove(&self, title: &str) -> Result<()> {
        let album = self
            .get(title)
            .await?
            .ok_or_else(|| Error::NotFound(title.to_string()))?;
        self.client.delete(album.resource()).await?;
        self.albums
            .update_if_loaded(|map| {
                Arc::make_mut(map).shift_remove(title);
            })
            .await;
        tracing::info!(album = %sanitize_for_log(title), "album deleted");
        Ok(())
    }

    /// Forget everything loaded; the next access starts from the service
    /// document again.
    pub async fn invalidate(&self) {
        self.albums.invalidate().await;
        self.collection.invalidate().await;
    }
}
