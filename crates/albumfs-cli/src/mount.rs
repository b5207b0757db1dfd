//! FUSE glue: inode bookkeeping and callback dispatch onto the adapter.
//!
//! The adapter works on paths. The kernel works on inode numbers, so this
//! layer keeps an inode ↔ path table (root is inode 1) and a table of open
//! file handles. Every callback blocks on the runtime until the adapter
//! call finishes.

use albumfs::{FileKind, FilesystemAdapter, OpenMode};
use fuser::{
    FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Runtime;

/// Attribute cache lifetime handed to the kernel. Remote albums can change
/// underneath us, so keep it short.
const TTL: Duration = Duration::from_secs(1);

const ROOT_INO: u64 = 1;
const BLOCK_SIZE: u32 = 512;

struct Inode {
    path: String,
    /// Entries handed to the kernel and not yet forgotten
    lookups: u64,
}

/// Inode numbers for known paths. Numbers are never reused.
///
/// An inode is dropped once the kernel forgets every lookup of it, or when
/// its file is removed. Paths only ever listed by `readdir` carry no
/// lookups and stay until removed, which bounds the table by the remote
/// tree rather than by mount lifetime.
struct InodeTable {
    by_ino: HashMap<u64, Inode>,
    by_path: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut table = Self {
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
            next: ROOT_INO + 1,
        };
        table.by_ino.insert(
            ROOT_INO,
            Inode {
                path: "/".to_string(),
                lookups: 0,
            },
        );
        table.by_path.insert("/".to_string(), ROOT_INO);
        table
    }

    fn path(&self, ino: u64) -> Option<String> {
        self.by_ino.get(&ino).map(|inode| inode.path.clone())
    }

    /// Inode for `path`, allocating one on first sight.
    fn ino(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.by_path.get(path) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_ino.insert(
            ino,
            Inode {
                path: path.to_string(),
                lookups: 0,
            },
        );
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    /// Count an entry reply for `ino`.
    fn looked_up(&mut self, ino: u64) {
        if let Some(inode) = self.by_ino.get_mut(&ino) {
            inode.lookups += 1;
        }
    }

    /// Drop `nlookup` lookups of `ino`, and the inode once none remain.
    /// The root is never dropped.
    fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(inode) = self.by_ino.get_mut(&ino) else {
            return;
        };
        inode.lookups = inode.lookups.saturating_sub(nlookup);
        if inode.lookups == 0 {
            let path = inode.path.clone();
            self.by_ino.remove(&ino);
            self.by_path.remove(&path);
        }
    }

    /// Drop the inode of a removed file. Later forgets of its number are
    /// ignored.
    fn remove(&mut self, path: &str) {
        if let Some(ino) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_ino.len()
    }
}

/// An open file. Write handles come from `create` or a write-mode `open`.
struct Handle {
    path: String,
    write: bool,
    flushed: bool,
}

/// Upload the staged file at this path, or nothing.
#[derive(Debug, PartialEq, Eq)]
enum FlushAction {
    Upload(String),
    Skip,
}

/// Only the first flush of a write handle uploads. `close(2)` flushes every
/// handle, including read-only ones and duplicated descriptors.
fn flush_action(handles: &HashMap<u64, Handle>, fh: u64) -> Result<FlushAction, i32> {
    match handles.get(&fh) {
        Some(handle) if handle.write && !handle.flushed => {
            Ok(FlushAction::Upload(handle.path.clone()))
        }
        Some(_) => Ok(FlushAction::Skip),
        None => Err(libc::EBADF),
    }
}

fn mark_flushed(handles: &mut HashMap<u64, Handle>, fh: u64) {
    if let Some(handle) = handles.get_mut(&fh) {
        handle.flushed = true;
    }
}

fn child_path(parent: &str, name: &OsStr) -> Option<String> {
    let name = name.to_str()?;
    if parent == "/" {
        Some(format!("/{}", name))
    } else {
        Some(format!("{}/{}", parent, name))
    }
}

fn parent_path(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::RegularFile => FileType::RegularFile,
    }
}

fn file_attr(attr: &albumfs::FileAttr, ino: u64, uid: u32, gid: u32) -> fuser::FileAttr {
    fuser::FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(u64::from(BLOCK_SIZE)),
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: UNIX_EPOCH,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid,
        gid,
        rdev: 0,
        flags: 0,
        blksize: BLOCK_SIZE,
    }
}

struct AlbumFuse {
    fs: Arc<FilesystemAdapter>,
    runtime: Runtime,
    inodes: Mutex<InodeTable>,
    handles: Mutex<HashMap<u64, Handle>>,
    next_fh: AtomicU64,
    uid: u32,
    gid: u32,
}

impl AlbumFuse {
    fn new(fs: Arc<FilesystemAdapter>, runtime: Runtime, uid: u32, gid: u32) -> Self {
        Self {
            fs,
            runtime,
            inodes: Mutex::new(InodeTable::new()),
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
            uid,
            gid,
        }
    }

    fn path(&self, ino: u64) -> Option<String> {
        self.inodes.lock().path(ino)
    }

    fn lookup_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent = self.path(parent)?;
        child_path(&parent, name)
    }

    fn open_handle(&self, path: String, write: bool) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.handles.lock().insert(
            fh,
            Handle {
                path,
                write,
                flushed: false,
            },
        );
        fh
    }

    fn handle_path(&self, fh: u64, ino: u64) -> Option<String> {
        match self.handles.lock().get(&fh) {
            Some(handle) => Some(handle.path.clone()),
            None => self.path(ino),
        }
    }

    /// Stat `path` and register its inode.
    fn stat(&self, path: &str) -> Result<fuser::FileAttr, i32> {
        let attr = self
            .runtime
            .block_on(self.fs.getattr(path))
            .map_err(|e| e.errno())?;
        let ino = self.inodes.lock().ino(path);
        Ok(file_attr(&attr, ino, self.uid, self.gid))
    }

    /// Stat `path` for an entry reply, which the kernel will later forget.
    fn entry(&self, path: &str) -> Result<fuser::FileAttr, i32> {
        let attr = self.stat(path)?;
        self.inodes.lock().looked_up(attr.ino);
        Ok(attr)
    }
}

impl Filesystem for AlbumFuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.lookup_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.entry(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.inodes.lock().forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.stat(&path) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    /// Attribute changes are accepted and ignored; the remote side owns them.
    fn setattr(
        &mut self,
        req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        self.getattr(req, ino, None, reply);
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.runtime.block_on(self.fs.readdir(&path)) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        let mut inodes = self.inodes.lock();
        for (i, entry) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            let entry_ino = match entry.name.as_str() {
                "." => ino,
                ".." => inodes.ino(parent_path(&path)),
                name => inodes.ino(&child_path(&path, OsStr::new(name)).unwrap_or_default()),
            };
            if reply.add(entry_ino, (i + 1) as i64, file_type(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.lookup_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Err(e) = self.runtime.block_on(self.fs.mkdir(&path)) {
            reply.error(e.errno());
            return;
        }
        match self.entry(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.lookup_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.runtime.block_on(self.fs.rmdir(&path)) {
            Ok(()) => {
                self.inodes.lock().remove(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.lookup_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.runtime.block_on(self.fs.unlink(&path)) {
            Ok(()) => {
                self.inodes.lock().remove(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.lookup_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Err(e) = self.runtime.block_on(self.fs.create(&path)) {
            reply.error(e.errno());
            return;
        }
        let attr = match self.entry(&path) {
            Ok(attr) => attr,
            Err(errno) => {
                let _ = self.runtime.block_on(self.fs.release(&path));
                reply.error(errno);
                return;
            }
        };
        let fh = self.open_handle(path, true);
        reply.created(&TTL, &attr, 0, fh, 0);
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mode = OpenMode::from_flags(flags);
        match self.runtime.block_on(self.fs.open(&path, mode)) {
            Ok(()) => {
                let fh = self.open_handle(path, mode != OpenMode::Read);
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.handle_path(fh, ino) else {
            reply.error(libc::EBADF);
            return;
        };
        let offset = offset.max(0) as u64;
        match self.runtime.block_on(self.fs.read(&path, offset, size)) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.handle_path(fh, ino) else {
            reply.error(libc::EBADF);
            return;
        };
        let offset = offset.max(0) as u64;
        match self.runtime.block_on(self.fs.write(&path, offset, data)) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let action = flush_action(&self.handles.lock(), fh);
        let path = match action {
            Ok(FlushAction::Upload(path)) => path,
            Ok(FlushAction::Skip) => {
                reply.ok();
                return;
            }
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.runtime.block_on(self.fs.flush(&path)) {
            Ok(()) => {
                mark_flushed(&mut self.handles.lock(), fh);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let handle = self.handles.lock().remove(&fh);
        if let Some(handle) = handle {
            if handle.write {
                let _ = self.runtime.block_on(self.fs.release(&handle.path));
            }
        }
        reply.ok();
    }
}

/// Mount `fs` on `mountpoint` and serve requests until unmounted.
pub fn mount(fs: Arc<FilesystemAdapter>, runtime: Runtime, mountpoint: &Path) -> anyhow::Result<()> {
    // Report the mounting user as owner of every file.
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };

    let fs = AlbumFuse::new(fs, runtime, uid, gid);
    let options = [
        MountOption::FSName("albumfs".to_string()),
        MountOption::AutoUnmount,
    ];
    fuser::mount2(fs, mountpoint, &options)?;
    Ok(())
}
