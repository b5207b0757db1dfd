//! albumfs - Remote photo albums as a filesystem
//!
//! Top-level directories are albums, the files inside them are photos.
//! Listings and image bytes load lazily from an AtomPub service; new files
//! are staged locally and uploaded as one photo when flushed.
//!
//! # Example
//!
//! ```rust
//! use albumfs::network::{DEFAULT_MEMORY_URL, HttpTransport, MemoryService, StaticToken};
//! use albumfs::{AlbumStore, FilesystemAdapter, MountConfig, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> albumfs::Result<()> {
//!     let config = ServiceConfig::new().service_url(DEFAULT_MEMORY_URL);
//!     let service = Arc::new(MemoryService::demo());
//!     let token = Arc::new(StaticToken::new("token"));
//!     let transport = HttpTransport::with_backend(service, &config, token);
//!     let store = Arc::new(AlbumStore::connect(Arc::new(transport), &config)?);
//!     let fs = FilesystemAdapter::new(store, MountConfig::default());
//!
//!     fs.mkdir("/Holiday").await?;
//!     fs.create("/Holiday/a.jpg").await?;
//!     fs.write("/Holiday/a.jpg", 0, b"\xff\xd8\xff\xd9").await?;
//!     fs.flush("/Holiday/a.jpg").await?;
//!     assert_eq!(fs.getattr("/Holiday/a.jpg").await?.size, 4);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
mod error;
pub mod logging_impl;
pub mod model;
pub mod network;
pub mod resource;
pub mod vfs;

pub use config::{MountConfig, ServiceConfig};
pub use error::{Error, Result};
pub use model::{Album, AlbumStore, Photo};
pub use vfs::{DirEntry, FileAttr, FileKind, FilesystemAdapter, OpenMode};
