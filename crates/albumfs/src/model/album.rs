use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    Photo, PhotoMap, hashed_photo_name, is_stable_photo_name, photo_file_name, unique_name,
};
use crate::cache::Cached;
use crate::error::{Error, Result};
use crate::logging_impl::sanitize_for_log;
use crate::resource::{Resource, ResourceClient, rel};

/// A remote album.
///
/// `photo_count` comes from the listing and is valid before the photos are
/// loaded. Local uploads and deletes adjust it, so it can briefly disagree
/// with the service until the next reload.
pub struct Album {
    name: String,
    resource: Resource,
    client: ResourceClient,
    placeholder: String,
    photo_count: AtomicU64,
    photos: Cached<PhotoMap>,
}

impl Album {
    pub(crate) fn new(
        client: ResourceClient,
        resource: Resource,
        name: String,
        placeholder: String,
    ) -> Self {
        Self {
            name,
            photo_count: AtomicU64::new(resource.image_count.unwrap_or(0)),
            resource,
            client,
            placeholder,
            photos: Cached::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.resource.id
    }

    /// Directory name.
    pub fn title(&self) -> &str {
        &self.name
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.resource.published
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.resource.updated
    }

    pub fn photo_count(&self) -> u64 {
        self.photo_count.load(Ordering::SeqCst)
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Photos keyed by file name, loading every page on first access.
    pub async fn photos(&self) -> Result<PhotoMap> {
        self.photos
            .get_or_load(|| async {
                let entries = self.client.children(&self.resource, rel::PHOTOS).await?;
                let mut map = IndexMap::with_capacity(entries.len());
                for entry in entries {
                    let name = photo_file_name(&entry.title, &entry.id, &self.placeholder);
                    let Some(name) = unique_name(&map, name, || hashed_photo_name(&entry.id))
                    else {
                        tracing::warn!(photo = %entry.id, "skipping photo with colliding name");
                        continue;
                    };
                    let photo = Photo::new(self.client.clone(), entry, name.clone());
                    map.insert(name, Arc::new(photo));
                }
                self.photo_count.store(map.len() as u64, Ordering::SeqCst);
                tracing::debug!(album = %self.resource.id, photos = map.len(), "photos loaded");
                Ok(Arc::new(map))
            })
            .await
    }

    pub async fn photo(&self, name: &str) -> Result<Option<Arc<Photo>>> {
        Ok(self.photos().await?.get(name).cloned())
    }

    /// Refuse names a reload would list differently (surrounding
    /// whitespace, the placeholder title, `.`/`..`).
    pub fn check_photo_name(&self, name: &str) -> Result<()> {
        if is_stable_photo_name(name, &self.placeholder) {
            Ok(())
        } else {
            Err(Error::NotPermitted(format!(
                "{}/{}: name would not survive a reload",
                self.name, name
            )))
        }
    }

    /// Upload `bytes` as a new photo named `name`.
    ///
    /// The local map (if loaded) gains the photo under `name` and the photo
    /// count goes up by one.
    pub async fn add_photo(&self, name: &str, bytes: Vec<u8>) -> Result<Arc<Photo>> {
        self.check_photo_name(name)?;
        if let Some(photos) = self.photos.peek().await {
            if photos.contains_key(name) {
                return Err(Error::AlreadyExists(format!("{}/{}", self.name, name)));
            }
        }
        let len = bytes.len() as u64;
        let mut resource = self
            .client
            .upload(&self.resource, rel::PHOTOS, name, bytes)
            .await?;
        resource.byte_size.get_or_insert(len);

        let photo = Arc::new(Photo::new(self.client.clone(), resource, name.to_string()));
        self.photos
            .update_if_loaded(|map| {
                Arc::make_mut(map).insert(name.to_string(), photo.clone());
            })
            .await;
        self.photo_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            album = %sanitize_for_log(&self.name),
            photo = %sanitize_for_log(name),
            bytes = len,
            "photo uploaded"
        );
        Ok(photo)
    }

    /// Delete the photo named `name` remotely and locally.
    pub async fn remove_photo(&self, name: &str) -> Result<()> {
        let photo = self
            .photo(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{}", self.name, name)))?;
        self.client.delete(photo.resource()).await?;
        self.photos
            .update_if_loaded(|map| {
                Arc::make_mut(map).shift_remove(name);
            })
            .await;
        let _ = self
            .photo_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
        tracing::info!(
            album = %sanitize_for_log(&self.name),
            photo = %sanitize_for_log(name),
            "photo deleted"
        );
        Ok(())
    }

    /// Forget the loaded photos; the next access reloads them.
    pub async fn invalidate(&self) {
        self.photos.invalidate().await;
    }
}

impl std::fmt::Debug for Album {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Album")
            .field("id", &self.resource.id)
            .field("name", &self.name)
            .field("photo_count", &self.photo_count())
            .finish()
    }
}
