//! fuser operation table
//!
//! Translates inode-addressed kernel requests into path-addressed
//! [`DriveFs`] calls. Reads and releases can wait on the network, so they are
//! handed to the runtime's blocking pool together with their reply instead of
//! holding up the session loop.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use tokio::runtime::Handle;

use common::{path, EntryKind};

use super::drive_fs::{Attributes, DriveFs, ReleaseOutcome};
use super::inode_table::InodeTable;
use super::quota::BLOCK_SIZE;

/// Attribute and entry timeout. Zero makes the kernel ask again every time.
const TTL: Duration = Duration::ZERO;

/// FUSE filesystem backed by a [`DriveFs`]
pub struct FuseFs {
    fs: Arc<DriveFs>,
    inodes: InodeTable,
    runtime: Handle,
    uid: u32,
    gid: u32,
}

impl FuseFs {
    pub fn new(fs: Arc<DriveFs>, runtime: Handle) -> Self {
        // SAFETY: getuid/getgid have no preconditions and cannot fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            fs,
            inodes: InodeTable::new(),
            runtime,
            uid,
            gid,
        }
    }

    fn to_file_attr(&self, ino: u64, attrs: &Attributes) -> FileAttr {
        let kind = match attrs.kind {
            EntryKind::Folder => FileType::Directory,
            EntryKind::File => FileType::RegularFile,
        };

        FileAttr {
            ino,
            size: attrs.size,
            blocks: attrs.size.div_ceil(512),
            atime: attrs.modified,
            mtime: attrs.modified,
            ctime: attrs.modified,
            crtime: attrs.modified,
            kind,
            perm: attrs.perm,
            nlink: attrs.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, i32> {
        self.inodes
            .get_path(ino)
            .map(str::to_string)
            .ok_or(libc::ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, i32> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        self.inodes.child_path(parent, name).ok_or(libc::ENOENT)
    }

    fn attr_for(&mut self, path: &str) -> Result<FileAttr, i32> {
        let attrs = self.fs.get_attributes(path).map_err(|e| e.errno())?;
        let ino = self.inodes.get_or_create(path);
        Ok(self.to_file_attr(ino, &attrs))
    }
}

impl Filesystem for FuseFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        tracing::info!(indexed = self.fs.indexed_paths(), "FUSE session started");
        Ok(())
    }

    fn destroy(&mut self) {
        let stats = self.fs.cache_stats();
        tracing::info!(
            entries = stats.entry_count,
            hits = stats.hits,
            misses = stats.misses,
            open_handles = self.fs.open_handles(),
            "FUSE session ended"
        );
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let result = self
            .child_of(parent, name)
            .and_then(|path| self.attr_for(&path));
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let result = self.path_of(ino).and_then(|path| {
            let attrs = self.fs.get_attributes(&path).map_err(|e| e.errno())?;
            Ok(self.to_file_attr(ino, &attrs))
        });
        match result {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        let result = (|| {
            if let Some(size) = size {
                self.fs.truncate(&path, size, fh)?;
            }
            if let Some(mode) = mode {
                self.fs.chmod(&path, mode)?;
            }
            if uid.is_some() || gid.is_some() {
                self.fs.chown(&path, uid, gid)?;
            }
            if atime.is_some() || mtime.is_some() {
                self.fs.set_times(&path)?;
            }
            self.fs.get_attributes(&path)
        })();

        match result {
            Ok(attrs) => reply.attr(&TTL, &self.to_file_attr(ino, &attrs)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.list_directory(&path).map_err(|e| e.errno()));
        match result {
            Ok(_) => reply.opened(0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let dir = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let entries = match self.fs.list_directory(&dir) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.errno()),
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            let entry_ino = match entry.name.as_str() {
                "." => ino,
                ".." => self.inodes.get_or_create(path::parent(&dir)),
                name => self.inodes.get_or_create(&path::join(&dir, name)),
            };
            let kind = match entry.kind {
                EntryKind::Folder => FileType::Directory,
                EntryKind::File => FileType::RegularFile,
            };
            // offset of the next entry; a full buffer stops the listing
            if reply.add(entry_ino, (i + 1) as i64, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let result = self.path_of(ino).and_then(|path| {
            let fh = self.fs.open(&path).map_err(|e| e.errno())?;
            let flags = if self.fs.needs_direct_io(&path) {
                fuser::consts::FOPEN_DIRECT_IO
            } else {
                0
            };
            Ok((fh, flags))
        });
        match result {
            Ok((fh, flags)) => reply.opened(fh, flags),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(libc::EINVAL);
        };

        let fs = Arc::clone(&self.fs);
        self.runtime.spawn_blocking(move || {
            let mut buf = vec![0u8; size as usize];
            match fs.read(&path, &mut buf, offset) {
                Ok(n) => reply.data(&buf[..n]),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        let result = self.fs.create(&path).and_then(|fh| {
            let attrs = self.fs.get_attributes(&path)?;
            Ok((fh, attrs))
        });
        match result {
            Ok((fh, attrs)) => {
                let ino = self.inodes.get_or_create(&path);
                reply.created(&TTL, &self.to_file_attr(ino, &attrs), 0, fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = self.inodes.get_path(ino).unwrap_or_default().to_string();
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(libc::EINVAL);
        };

        match self.fs.write(&path, data, offset, fh) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        self.fs.flush(self.inodes.get_path(ino).unwrap_or_default(), fh);
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        self.fs.flush(self.inodes.get_path(ino).unwrap_or_default(), fh);
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        // read-only opens carry the null handle and need no round trip
        if fh == 0 {
            return reply.ok();
        }

        let path = self.inodes.get_path(ino).unwrap_or_default().to_string();
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn_blocking(move || {
            // upload failures are already logged; the kernel ignores release errors
            if let ReleaseOutcome::NotOpen = fs.release(&path, fh) {
                tracing::debug!(path = %path, fh, "release of unknown handle");
            }
            reply.ok();
        });
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let paths = self
            .child_of(parent, name)
            .and_then(|old| Ok((old, self.child_of(newparent, newname)?)));
        let (old, new) = match paths {
            Ok(paths) => paths,
            Err(errno) => return reply.error(errno),
        };

        match self.fs.rename(&old, &new) {
            Ok(_) => {
                self.inodes.rename(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stats = self.fs.statfs();
        reply.statfs(
            stats.blocks,
            stats.bfree,
            stats.bavail,
            stats.files,
            stats.ffree,
            stats.bsize,
            stats.namelen,
            stats.frsize,
        );
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        tracing::debug!(?name, "mkdir not supported");
        reply.error(libc::ENOSYS);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, name: &OsStr, reply: ReplyEmpty) {
        tracing::debug!(?name, "rmdir not supported");
        reply.error(libc::ENOSYS);
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, name: &OsStr, reply: ReplyEmpty) {
        tracing::debug!(?name, "unlink not supported");
        reply.error(libc::ENOSYS);
    }
}
