//! POSIX attributes for classified paths.
//!
//! | Kind | nlink | size | mtime / ctime |
//! |------|-------|------|---------------|
//! | root | 2 + albums | album count | now |
//! | album | 2 | photo count | updated / published |
//! | photo | 1 | image bytes | updated / published |
//! | upload buffer | 1 | staged bytes | staging file |

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::{Album, Photo};

/// Read bits for directories (r--r--r--)
pub const DIR_READ_MODE: u16 = 0o444;
/// Owner write and search bits for directories, added when destructive
/// operations are enabled
pub const DIR_OWNER_WRITE: u16 = 0o300;
/// Read bits for files (r--r--r--)
pub const FILE_READ_MODE: u16 = 0o444;
/// Owner write bit, added when destructive operations are enabled
pub const OWNER_WRITE: u16 = 0o200;
/// Upload buffers are always writable by their owner
pub const UPLOAD_MODE: u16 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// File attributes without ownership; the mount layer fills in uid/gid.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttr {
    pub kind: FileKind,
    pub size: u64,
    pub nlink: u32,
    pub perm: u16,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

fn system_time(t: Option<DateTime<Utc>>) -> SystemTime {
    t.map(SystemTime::from).unwrap_or(UNIX_EPOCH)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeSynthesizer {
    allow_destructive: bool,
}

impl AttributeSynthesizer {
    pub fn new(allow_destructive: bool) -> Self {
        Self { allow_destructive }
    }

    fn write_bits(&self) -> u16 {
        if self.allow_destructive { OWNER_WRITE } else { 0 }
    }

    fn dir_write_bits(&self) -> u16 {
        if self.allow_destructive { DIR_OWNER_WRITE } else { 0 }
    }

    pub fn root(&self, album_count: usize) -> FileAttr {
        let now = SystemTime::now();
        FileAttr {
            kind: FileKind::Directory,
            size: album_count as u64,
            nlink: 2 + album_count as u32,
            perm: DIR_READ_MODE | self.dir_write_bits(),
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    pub fn album(&self, album: &Album) -> FileAttr {
        FileAttr {
            kind: FileKind::Directory,
            size: album.photo_count(),
            nlink: 2,
            perm: DIR_READ_MODE | self.dir_write_bits(),
            atime: SystemTime::now(),
            mtime: system_time(album.updated()),
            ctime: system_time(album.published()),
        }
    }

    pub fn photo(&self, photo: &Photo) -> FileAttr {
        FileAttr {
            kind: FileKind::RegularFile,
            size: photo.size(),
            nlink: 1,
            perm: FILE_READ_MODE | self.write_bits(),
            atime: SystemTime::now(),
            mtime: system_time(photo.updated()),
            ctime: system_time(photo.published()),
        }
    }

    pub fn upload(&self, size: u64, modified: SystemTime) -> FileAttr {
        FileAttr {
            kind: FileKind::RegularFile,
            size,
            nlink: 1,
            perm: UPLOAD_MODE,
            atime: SystemTime::now(),
            mtime: modified,
            ctime: modified,
        }
    }
}
