//! Directory listings for the root and for albums.

use std::sync::Arc;

use super::attr::FileKind;
use super::path::PathInfo;
use crate::error::{Error, Result};
use crate::model::AlbumStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

impl DirEntry {
    fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::Directory,
        }
    }

    fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::RegularFile,
        }
    }
}

#[derive(Clone)]
pub struct DirectoryEnumerator {
    store: Arc<AlbumStore>,
}

impl DirectoryEnumerator {
    pub fn new(store: Arc<AlbumStore>) -> Self {
        Self { store }
    }

    /// `.`, `..`, then albums (root) or photos (album) in load order.
    pub async fn list(&self, path: &str, info: &PathInfo) -> Result<Vec<DirEntry>> {
        let mut entries = vec![DirEntry::dir("."), DirEntry::dir("..")];
        match info {
            PathInfo::Root => {
                let albums = self.store.albums().await?;
                entries.extend(albums.keys().map(DirEntry::dir));
            }
            PathInfo::Album(album) => {
                let photos = album.photos().await?;
                entries.extend(photos.keys().map(DirEntry::file));
            }
            PathInfo::Photo { .. } | PathInfo::UploadBuffer => {
                return Err(Error::NotADirectory(path.to_string()));
            }
            PathInfo::NotFound => return Err(Error::NotFound(path.to_string())),
        }
        Ok(entries)
    }
}
