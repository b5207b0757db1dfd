//! Path classification.

use std::sync::Arc;

use super::upload::UploadBufferManager;
use crate::error::Result;
use crate::model::{Album, AlbumStore, Photo};

/// What a filesystem path refers to.
#[derive(Debug, Clone)]
pub enum PathInfo {
    Root,
    Album(Arc<Album>),
    Photo { album: Arc<Album>, photo: Arc<Photo> },
    /// A file created but not yet flushed.
    UploadBuffer,
    NotFound,
}

impl PathInfo {
    pub fn is_dir(&self) -> bool {
        matches!(self, PathInfo::Root | PathInfo::Album(_))
    }

    pub fn exists(&self) -> bool {
        !matches!(self, PathInfo::NotFound)
    }
}

/// Strip leading and trailing separators: `/Trip/a.jpg` → `Trip/a.jpg`.
pub fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// Components of a normalized path. The root has none.
pub fn components(path: &str) -> Vec<&str> {
    let path = normalize(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

/// `(album, leaf)` for a two-component path.
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    match components(path).as_slice() {
        [album, leaf] if !album.is_empty() && !leaf.is_empty() => Some((*album, *leaf)),
        _ => None,
    }
}

/// Maps paths onto the album cache.
///
/// The resolver itself never talks to the network; the store and album
/// accessors it calls load lazily.
#[derive(Clone)]
pub struct PathResolver {
    store: Arc<AlbumStore>,
}

impl PathResolver {
    pub fn new(store: Arc<AlbumStore>) -> Self {
        Self { store }
    }

    /// Classify `path`.
    ///
    /// A pending upload buffer wins over everything else. Paths deeper than
    /// `album/photo` never exist.
    pub async fn resolve(&self, path: &str, uploads: &UploadBufferManager) -> Result<PathInfo> {
        let path = normalize(path);
        if path.is_empty() {
            return Ok(PathInfo::Root);
        }
        if uploads.has_buffer(path).await {
            return Ok(PathInfo::UploadBuffer);
        }
        match components(path).as_slice() {
            [name] => Ok(match self.store.get(name).await? {
                Some(album) => PathInfo::Album(album),
                None => PathInfo::NotFound,
            }),
            [album_name, leaf] => {
                let Some(album) = self.store.get(album_name).await? else {
                    return Ok(PathInfo::NotFound);
                };
                Ok(match album.photo(leaf).await? {
                    Some(photo) => PathInfo::Photo { album, photo },
                    None => PathInfo::NotFound,
                })
            }
            _ => Ok(PathInfo::NotFound),
        }
    }
}
