//! The user-facing operations, addressed by absolute paths inside the image.
//!
//! None of them roll back on failure: an operation that fails after
//! allocating an inode or block leaves that allocation in place.

use tracing::info;

use crate::consts::{InodePointer, DIRECT_POINTERS, ROOT_INODE};
use crate::path::{is_absolute, resolve, split, SEPARATOR};
use crate::structure::directory::{check_name, Directory};
use crate::structure::Image;
use crate::util::error::{display_name, Error, Result};

pub mod directory;
pub mod file;
pub mod meta;

/// Parent directory and final name of `path`. The parent must resolve to a
/// directory.
fn parent_of<'a>(image: &Image, parent: &[u8], name: &'a [u8]) -> Result<(Directory, &'a [u8])> {
    check_name(name)?;
    let number = resolve(image, ROOT_INODE, parent)?
        .ok_or_else(|| Error::InvalidPath(display_name(parent)))?;
    let directory = Directory::open(image, number).map_err(|error| match error {
        Error::NotDirectory(_) => Error::InvalidPath(display_name(parent)),
        other => other,
    })?;
    Ok((directory, name))
}

/// Parent directory and name for a new entry at `path`.
fn target_of<'a>(image: &Image, path: &'a [u8]) -> Result<(Directory, &'a [u8])> {
    if !is_absolute(path) {
        return Err(Error::InvalidPath(display_name(path)));
    }
    let (parent, name) = split(path);
    parent_of(image, parent, name)
}

/// Like [`target_of`], except that a destination ending in a separator names
/// a directory and the entry takes the final component of `source`.
fn destination_of<'a>(image: &Image, source: &'a [u8], destination: &'a [u8]) -> Result<(Directory, &'a [u8])> {
    if !is_absolute(destination) {
        return Err(Error::InvalidPath(display_name(destination)));
    }
    if destination.last() == Some(&SEPARATOR) {
        let (_, name) = split(source);
        return parent_of(image, destination, name);
    }
    target_of(image, destination)
}

fn ensure_absent(image: &Image, directory: &Directory, name: &[u8]) -> Result<()> {
    if directory.find(image, name)?.is_some() {
        return Err(Error::Exists(display_name(name)));
    }
    Ok(())
}

/// Copies `data` into a new regular file. `source_name` supplies the file
/// name when `destination` ends in a separator.
pub fn copy_in(image: &mut Image, data: &[u8], source_name: &[u8], destination: &[u8]) -> Result<InodePointer> {
    let block_size = image.block_size();
    let data_blocks = data.len().div_ceil(block_size);
    if data_blocks > DIRECT_POINTERS + image.pointers_per_block() {
        return Err(Error::NoSpace);
    }
    let needed = data_blocks + usize::from(data_blocks > DIRECT_POINTERS);
    if needed as u64 > image.superblock().free_blocks_count as u64 {
        return Err(Error::NoSpace);
    }

    let (mut parent, name) = destination_of(image, source_name, destination)?;
    ensure_absent(image, &parent, name)?;
    let number = file::create_file(image, &mut parent, name, data)?;
    info!(inode = number, bytes = data.len(), path = %display_name(destination), "copied file into image");
    Ok(number)
}

/// Adds `destination` as another name for the file at `source`.
pub fn link(image: &mut Image, source: &[u8], destination: &[u8]) -> Result<InodePointer> {
    if !is_absolute(source) {
        return Err(Error::InvalidPath(display_name(source)));
    }
    let target = resolve(image, ROOT_INODE, source)?.ok_or_else(|| Error::NotFound(display_name(source)))?;
    let (mut parent, name) = destination_of(image, source, destination)?;
    ensure_absent(image, &parent, name)?;
    directory::hard_link(image, target, &mut parent, name)?;
    info!(inode = target, source = %display_name(source), path = %display_name(destination), "created hard link");
    Ok(target)
}

/// Creates a symbolic link at `destination` pointing at `source`, which must
/// exist.
pub fn symlink(image: &mut Image, source: &[u8], destination: &[u8]) -> Result<InodePointer> {
    if !is_absolute(source) {
        return Err(Error::InvalidPath(display_name(source)));
    }
    resolve(image, ROOT_INODE, source)?.ok_or_else(|| Error::NotFound(display_name(source)))?;
    let (mut parent, name) = destination_of(image, source, destination)?;
    ensure_absent(image, &parent, name)?;
    let number = directory::symbolic_link(image, &mut parent, name, source)?;
    info!(inode = number, source = %display_name(source), path = %display_name(destination), "created symbolic link");
    Ok(number)
}

pub fn mkdir(image: &mut Image, path: &[u8]) -> Result<InodePointer> {
    let (mut parent, name) = target_of(image, path)?;
    ensure_absent(image, &parent, name)?;
    let number = directory::make_directory(image, &mut parent, name)?;
    info!(inode = number, path = %display_name(path), "created directory");
    Ok(number)
}

/// Removes a single-link file or link. Directories are refused.
pub fn remove(image: &mut Image, path: &[u8]) -> Result<InodePointer> {
    let (mut parent, name) = target_of(image, path)?;
    let number = parent.remove(image, name)?;
    info!(inode = number, path = %display_name(path), "removed entry");
    Ok(number)
}

/// Restores an entry previously removed from its parent directory.
pub fn undelete(image: &mut Image, path: &[u8]) -> Result<InodePointer> {
    let (mut parent, name) = target_of(image, path)?;
    let number = parent.restore(image, name)?;
    info!(inode = number, path = %display_name(path), "restored entry");
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{format_image, FormatOptions};
    use crate::ops::file::{read, read_link};
    use crate::util::mode::FileType;

    fn image() -> Image {
        format_image(&FormatOptions::default()).unwrap()
    }

    #[test]
    fn copy_in_and_read_back() {
        let mut image = image();
        let number = copy_in(&mut image, b"hello world", b"/tmp/greeting.txt", b"/hello.txt").unwrap();
        assert_eq!(resolve(&image, ROOT_INODE, b"/hello.txt").unwrap(), Some(number));
        let inode = image.read_inode(number).unwrap();
        assert_eq!(read(&image, &inode, 0, 100).unwrap(), b"hello world".to_vec());
    }

    #[test]
    fn copy_in_to_directory_takes_source_name() {
        let mut image = image();
        let number = copy_in(&mut image, b"x", b"/home/me/notes.txt", b"/lost+found/").unwrap();
        assert_eq!(resolve(&image, ROOT_INODE, b"/lost+found/notes.txt").unwrap(), Some(number));
    }

    #[test]
    fn copy_in_errors() {
        let mut image = image();
        assert!(matches!(copy_in(&mut image, b"x", b"a", b"relative"), Err(Error::InvalidPath(_))));
        assert!(matches!(copy_in(&mut image, b"x", b"a", b"/missing/a"), Err(Error::InvalidPath(_))));
        copy_in(&mut image, b"x", b"a", b"/a").unwrap();
        assert!(matches!(copy_in(&mut image, b"y", b"a", b"/a"), Err(Error::Exists(_))));
        assert!(matches!(copy_in(&mut image, b"y", b"a", b"/a/b"), Err(Error::InvalidPath(_))));

        let too_large = vec![0u8; (12 + 256 + 1) * 1024];
        assert!(matches!(copy_in(&mut image, &too_large, b"big", b"/big"), Err(Error::NoSpace)));
        let larger_than_free = vec![0u8; 120 * 1024];
        assert!(matches!(copy_in(&mut image, &larger_than_free, b"big", b"/big"), Err(Error::NoSpace)));
        assert!(resolve(&image, ROOT_INODE, b"/big").unwrap().is_none());
    }

    #[test]
    fn copy_in_uses_indirect_block() {
        let mut image = image();
        let data = vec![7u8; 20 * 1024 + 5];
        let free = image.superblock().free_blocks_count;
        let number = copy_in(&mut image, &data, b"f", b"/f").unwrap();
        let inode = image.read_inode(number).unwrap();
        assert_ne!(inode.indirect(), 0);
        assert_eq!(image.superblock().free_blocks_count, free - 22);
        assert_eq!(read(&image, &inode, 0, data.len()).unwrap(), data);
    }

    #[test]
    fn hard_and_symbolic_links() {
        let mut image = image();
        let number = copy_in(&mut image, b"body", b"f", b"/file").unwrap();

        assert_eq!(link(&mut image, b"/file", b"/lost+found/").unwrap(), number);
        assert_eq!(resolve(&image, ROOT_INODE, b"/lost+found/file").unwrap(), Some(number));
        assert_eq!(image.read_inode(number).unwrap().links_count, 2);

        let symlink_number = symlink(&mut image, b"/file", b"/soft").unwrap();
        let inode = image.read_inode(symlink_number).unwrap();
        assert_eq!(inode.file_type(), FileType::SymbolicLink);
        assert_eq!(read_link(&image, &inode).unwrap(), b"/file".to_vec());

        assert!(matches!(link(&mut image, b"/nothing", b"/x"), Err(Error::NotFound(_))));
        assert!(matches!(symlink(&mut image, b"/nothing", b"/x"), Err(Error::NotFound(_))));
        assert!(matches!(link(&mut image, b"/file", b"/soft"), Err(Error::Exists(_))));
        assert!(matches!(link(&mut image, b"/lost+found", b"/lf"), Err(Error::IsDirectory(_))));
    }

    #[test]
    fn mkdir_remove_undelete() {
        let mut image = image();
        let dir = mkdir(&mut image, b"/projects").unwrap();
        assert!(matches!(mkdir(&mut image, b"/projects"), Err(Error::Exists(_))));
        assert!(matches!(mkdir(&mut image, b"/"), Err(Error::InvalidPath(_))));
        assert!(matches!(mkdir(&mut image, b"/nope/inner"), Err(Error::InvalidPath(_))));

        copy_in(&mut image, b"first", b"a", b"/projects/a").unwrap();
        let b = copy_in(&mut image, b"second", b"b", b"/projects/b").unwrap();
        assert_eq!(remove(&mut image, b"/projects/b").unwrap(), b);
        assert!(resolve(&image, ROOT_INODE, b"/projects/b").unwrap().is_none());
        assert!(matches!(remove(&mut image, b"/projects/b"), Err(Error::NotFound(_))));
        assert!(matches!(remove(&mut image, b"/projects"), Err(Error::IsDirectory(_))));

        assert_eq!(undelete(&mut image, b"/projects/b").unwrap(), b);
        assert_eq!(resolve(&image, ROOT_INODE, b"/projects/b").unwrap(), Some(b));
        assert!(matches!(undelete(&mut image, b"/projects/b"), Err(Error::Exists(_))));
        assert!(matches!(undelete(&mut image, b"/projects/zzz"), Err(Error::NotFound(_))));
        assert_eq!(resolve(&image, ROOT_INODE, b"/projects").unwrap(), Some(dir));
    }

    #[test]
    fn remove_refuses_multi_linked_files() {
        let mut image = image();
        copy_in(&mut image, b"body", b"f", b"/file").unwrap();
        link(&mut image, b"/file", b"/other").unwrap();
        assert!(matches!(remove(&mut image, b"/other"), Err(Error::MultiLinked { links: 2, .. })));
    }
}
