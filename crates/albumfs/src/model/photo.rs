use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::cache::Cached;
use crate::error::Result;
use crate::resource::{Resource, ResourceClient};

/// A remote photo. Metadata comes from the album listing; the image bytes
/// are fetched on first [`image`](Photo::image) and kept until
/// [`cleanup`](Photo::cleanup).
pub struct Photo {
    name: String,
    size: u64,
    resource: Resource,
    client: ResourceClient,
    image: Cached<Arc<Vec<u8>>>,
}

impl Photo {
    pub(crate) fn new(client: ResourceClient, resource: Resource, name: String) -> Self {
        Self {
            name,
            size: resource.byte_size.unwrap_or(0),
            resource,
            client,
            image: Cached::new(),
        }
    }

    /// Remote identifier.
    pub fn id(&self) -> &str {
        &self.resource.id
    }

    /// File name within the album.
    pub fn title(&self) -> &str {
        &self.name
    }

    /// Size of the original image in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.resource.published
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.resource.updated
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Image bytes, downloading them if not cached.
    pub async fn image(&self) -> Result<Arc<Vec<u8>>> {
        self.image
            .get_or_load(|| async {
                tracing::debug!(photo = %self.resource.id, "downloading image");
                Ok(Arc::new(self.client.media(&self.resource).await?))
            })
            .await
    }

    /// Drop the cached bytes; the next [`image`](Self::image) downloads again.
    pub async fn cleanup(&self) {
        self.image.invalidate().await;
    }

    pub async fn is_image_loaded(&self) -> bool {
        self.image.is_loaded().await
    }
}

impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("id", &self.resource.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}
