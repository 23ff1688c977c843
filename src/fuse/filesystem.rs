use std::ffi::OsStr;
use std::os::raw::c_int;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    Request,
};
use tracing::{debug, trace, warn};

use crate::consts::{InodePointer, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::fs::FS;
use crate::ops;
use crate::ops::meta::Metadata;
use crate::structure::directory::{DirEntry, Directory};
use crate::structure::Image;
use crate::util::error::{display_name, Error, Result};
use crate::util::mode::{FileType as EntryType, ModeBitsHelper};

const TTL: Duration = Duration::from_secs(1);
const FUSE_ROOT: u64 = 1;

fn to_ext2(ino: u64) -> InodePointer {
    if ino == FUSE_ROOT {
        ROOT_INODE
    } else {
        ino as InodePointer
    }
}

fn to_fuse(inode: InodePointer) -> u64 {
    if inode == ROOT_INODE {
        FUSE_ROOT
    } else {
        inode as u64
    }
}

fn to_fuser_file_type(file_type: EntryType) -> FileType {
    match file_type {
        EntryType::Directory => FileType::Directory,
        EntryType::SymbolicLink => FileType::Symlink,
        EntryType::CharacterDevice => FileType::CharDevice,
        EntryType::BlockDevice => FileType::BlockDevice,
        EntryType::Fifo => FileType::NamedPipe,
        EntryType::Socket => FileType::Socket,
        EntryType::RegularFile | EntryType::Unknown => FileType::RegularFile,
    }
}

fn errno(operation: &'static str, ino: u64, error: &Error) -> c_int {
    let code = error.to_errno();
    if code == libc::ENOENT {
        trace!(op = operation, ino, %error, "request failed");
    } else {
        warn!(op = operation, ino, errno = code, %error, "request failed");
    }
    code
}

/// A mounted image answering kernel requests. Every mutating request is
/// synced to the device before it is answered.
pub struct Ext2Fuse<A: DeviceDriver> {
    fs: FS<A>,
    read_only: bool,
}

impl<A: DeviceDriver> Ext2Fuse<A> {
    pub fn new(fs: FS<A>, read_only: bool) -> Ext2Fuse<A> {
        Ext2Fuse { fs, read_only }
    }

    fn attr(&self, inode: InodePointer) -> Result<FileAttr> {
        let meta = Metadata::read(self.fs.image(), inode)?;
        Ok(FileAttr {
            ino: to_fuse(inode),
            size: meta.size,
            blocks: meta.blocks,
            atime: meta.accessed_at,
            mtime: meta.modified_at,
            ctime: meta.changed_at,
            crtime: meta.changed_at,
            kind: to_fuser_file_type(meta.inode_type),
            perm: meta.permissions,
            nlink: meta.nlinks,
            uid: meta.user_id,
            gid: meta.group_id,
            rdev: 0,
            blksize: self.fs.image().block_size() as u32,
            flags: meta.flags,
        })
    }

    /// Runs `change` and syncs whatever it wrote, even when it failed part
    /// way through.
    fn mutate<T>(&mut self, change: impl FnOnce(&mut Image) -> Result<T>) -> Result<T> {
        if self.read_only {
            return Err(Error::Io(std::io::Error::from_raw_os_error(libc::EROFS)));
        }
        let result = change(self.fs.image_mut());
        self.fs.sync()?;
        result
    }

    fn lookup_entry(&self, parent: u64, name: &[u8]) -> Result<FileAttr> {
        let directory = Directory::open(self.fs.image(), to_ext2(parent))?;
        let entry = directory
            .find(self.fs.image(), name)?
            .ok_or_else(|| Error::NotFound(display_name(name)))?;
        self.attr(entry.inode)
    }

    fn list(&self, ino: u64) -> Result<Vec<DirEntry>> {
        Directory::open(self.fs.image(), to_ext2(ino))?.entries(self.fs.image())
    }

    fn read_file(&self, ino: u64, offset: u64, size: usize) -> Result<Vec<u8>> {
        let inode = self.fs.image().read_inode(to_ext2(ino))?;
        if inode.is_directory() {
            return Err(Error::IsDirectory(format!("inode {}", to_ext2(ino))));
        }
        ops::file::read(self.fs.image(), &inode, offset, size)
    }

    fn read_symlink(&self, ino: u64) -> Result<Vec<u8>> {
        let inode = self.fs.image().read_inode(to_ext2(ino))?;
        if inode.file_type() != EntryType::SymbolicLink {
            return Err(Error::InvalidPath(format!("inode {} is not a symbolic link", to_ext2(ino))));
        }
        ops::file::read_link(self.fs.image(), &inode)
    }

    fn make_directory(&mut self, parent: u64, name: &[u8], mode: u16, uid: u32, gid: u32) -> Result<FileAttr> {
        let number = self.mutate(|image| {
            let mut directory = open_for_insert(image, parent, name)?;
            let number = ops::directory::make_directory(image, &mut directory, name)?;
            let mut inode = image.read_inode(number)?;
            inode.mode = (inode.mode & !0o7777) | mode.get_permissions();
            inode.uid = uid as u16;
            inode.gid = gid as u16;
            image.write_inode(number, &inode)?;
            Ok(number)
        })?;
        self.attr(number)
    }

    fn remove_entry(&mut self, parent: u64, name: &[u8]) -> Result<()> {
        self.mutate(|image| {
            Directory::open(image, to_ext2(parent))?.remove(image, name)?;
            Ok(())
        })
    }

    fn make_symlink(&mut self, parent: u64, name: &[u8], target: &[u8]) -> Result<FileAttr> {
        let number = self.mutate(|image| {
            let mut directory = open_for_insert(image, parent, name)?;
            ops::directory::symbolic_link(image, &mut directory, name, target)
        })?;
        self.attr(number)
    }

    fn make_hard_link(&mut self, ino: u64, parent: u64, name: &[u8]) -> Result<FileAttr> {
        let target = to_ext2(ino);
        self.mutate(|image| {
            let mut directory = open_for_insert(image, parent, name)?;
            ops::directory::hard_link(image, target, &mut directory, name)
        })?;
        self.attr(target)
    }
}

fn open_for_insert(image: &Image, parent: u64, name: &[u8]) -> Result<Directory> {
    let directory = Directory::open(image, to_ext2(parent))?;
    if directory.find(image, name)?.is_some() {
        return Err(Error::Exists(display_name(name)));
    }
    Ok(directory)
}

impl<A: DeviceDriver> Filesystem for Ext2Fuse<A> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        debug!(blocks = self.fs.image().block_count(), read_only = self.read_only, "serving image");
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(error) = self.fs.sync() {
            warn!(%error, "final sync failed");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_entry(parent, name.as_bytes()) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(error) => reply.error(errno("lookup", parent, &error)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr(to_ext2(ino)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(error) => reply.error(errno("getattr", ino, &error)),
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
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.read_file(ino, offset, size as usize) {
            Ok(data) => reply.data(&data),
            Err(error) => reply.error(errno("read", ino, &error)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let entries = match self.list(ino) {
            Ok(entries) => entries,
            Err(error) => return reply.error(errno("readdir", ino, &error)),
        };
        let skip = usize::try_from(offset).unwrap_or(0);
        for (index, entry) in entries.iter().enumerate().skip(skip) {
            let full = reply.add(
                to_fuse(entry.inode),
                (index + 1) as i64,
                to_fuser_file_type(entry.file_type),
                OsStr::from_bytes(&entry.name),
            );
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        match self.read_symlink(ino) {
            Ok(target) => reply.data(&target),
            Err(error) => reply.error(errno("readlink", ino, &error)),
        }
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: ReplyEntry) {
        if self.read_only {
            return reply.error(libc::EROFS);
        }
        let mode = (mode & !umask) as u16;
        match self.make_directory(parent, name.as_bytes(), mode, req.uid(), req.gid()) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(error) => reply.error(errno("mkdir", parent, &error)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if self.read_only {
            return reply.error(libc::EROFS);
        }
        match self.remove_entry(parent, name.as_bytes()) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(errno("unlink", parent, &error)),
        }
    }

    fn symlink(&mut self, _req: &Request<'_>, parent: u64, link_name: &OsStr, target: &Path, reply: ReplyEntry) {
        if self.read_only {
            return reply.error(libc::EROFS);
        }
        match self.make_symlink(parent, link_name.as_bytes(), target.as_os_str().as_bytes()) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(error) => reply.error(errno("symlink", parent, &error)),
        }
    }

    fn link(&mut self, _req: &Request<'_>, ino: u64, newparent: u64, newname: &OsStr, reply: ReplyEntry) {
        if self.read_only {
            return reply.error(libc::EROFS);
        }
        match self.make_hard_link(ino, newparent, newname.as_bytes()) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(error) => reply.error(errno("link", newparent, &error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory_drive::MemoryDrive;
    use crate::fs::FormatOptions;

    fn mounted() -> Ext2Fuse<MemoryDrive> {
        let fs = FS::format(MemoryDrive::new(128 * 1024, 512), &FormatOptions::default()).unwrap();
        Ext2Fuse::new(fs, false)
    }

    #[test]
    fn root_is_inode_one() {
        let fuse = mounted();
        assert_eq!(to_ext2(FUSE_ROOT), ROOT_INODE);
        assert_eq!(to_fuse(ROOT_INODE), FUSE_ROOT);
        let attr = fuse.attr(ROOT_INODE).unwrap();
        assert_eq!(attr.ino, FUSE_ROOT);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.nlink, 3);
        assert_eq!(attr.blksize, 1024);
    }

    #[test]
    fn listing_maps_parent_of_root() {
        let fuse = mounted();
        let entries = fuse.list(FUSE_ROOT).unwrap();
        let names: Vec<&[u8]> = entries.iter().map(|entry| entry.name.as_slice()).collect();
        assert_eq!(names, vec![&b"."[..], b"..", b"lost+found"]);
        assert_eq!(to_fuse(entries[1].inode), FUSE_ROOT);
        assert_eq!(fuse.lookup_entry(FUSE_ROOT, b"lost+found").unwrap().ino, 11);
        assert!(matches!(fuse.lookup_entry(FUSE_ROOT, b"missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn mutations_reach_the_device() {
        let mut fuse = mounted();
        let dir = fuse.make_directory(FUSE_ROOT, b"docs", 0o750, 1000, 100).unwrap();
        assert_eq!(dir.perm, 0o750);
        assert_eq!(dir.uid, 1000);
        assert!(matches!(fuse.make_directory(FUSE_ROOT, b"docs", 0o755, 0, 0), Err(Error::Exists(_))));

        let link = fuse.make_symlink(dir.ino, b"up", b"/lost+found").unwrap();
        assert_eq!(fuse.read_symlink(link.ino).unwrap(), b"/lost+found".to_vec());
        assert!(matches!(fuse.read_file(dir.ino, 0, 10), Err(Error::IsDirectory(_))));

        let hard = fuse.make_hard_link(link.ino, FUSE_ROOT, b"again").unwrap();
        assert_eq!(hard.nlink, 2);
        assert!(matches!(fuse.remove_entry(FUSE_ROOT, b"again"), Err(Error::MultiLinked { .. })));

        let remounted = FS::mount(fuse.fs.into_device()).unwrap();
        let root = Directory::open(remounted.image(), ROOT_INODE).unwrap();
        assert!(root.find(remounted.image(), b"docs").unwrap().is_some());
        assert!(root.find(remounted.image(), b"again").unwrap().is_some());
    }

    #[test]
    fn read_only_refuses_changes() {
        let fs = FS::format(MemoryDrive::new(128 * 1024, 512), &FormatOptions::default()).unwrap();
        let mut fuse = Ext2Fuse::new(fs, true);
        assert!(fuse.make_directory(FUSE_ROOT, b"docs", 0o755, 0, 0).is_err());
        assert!(fuse.lookup_entry(FUSE_ROOT, b"docs").is_err());
    }
}
