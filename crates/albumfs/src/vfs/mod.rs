//! Filesystem surface over the album cache.
//!
//! ```text
//! FilesystemAdapter::dispatch
//!   ├── PathResolver          path → Root | Album | Photo | UploadBuffer | NotFound
//!   ├── AttributeSynthesizer  PathInfo → FileAttr
//!   ├── DirectoryEnumerator   PathInfo → [DirEntry]
//!   └── UploadBufferManager   create / write / flush / release
//! ```

mod adapter;
pub mod attr;
mod dir;
pub mod path;
mod upload;

pub use adapter::{FilesystemAdapter, OpenMode};
pub use attr::{AttributeSynthesizer, FileAttr, FileKind};
pub use dir::{DirEntry, DirectoryEnumerator};
pub use path::{PathInfo, PathResolver};
pub use upload::UploadBufferManager;
