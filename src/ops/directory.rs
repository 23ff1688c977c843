use tracing::debug;

use crate::consts::{InodePointer, PARENT_NAME, SELF_NAME};
use crate::ops::file::write_data;
use crate::structure::directory::{packed_size, DirBlock, DirRecord, Directory};
use crate::structure::Image;
use crate::util::error::{display_name, Error, Result};
use crate::util::mode::FileType;

/// Creates an empty directory named `name` inside `parent`.
///
/// The new directory starts with two links (its entry and its own "."),
/// and the parent gains one for the child's "..".
pub fn make_directory(image: &mut Image, parent: &mut Directory, name: &[u8]) -> Result<InodePointer> {
    let number = image.allocate_inode()?;
    let mut inode = image.initialize_inode(number, FileType::Directory)?;
    parent.insert(image, number, name, FileType::Directory)?;

    let block = inode.push_block(image)?;
    let block_size = image.block_size();
    let self_len = packed_size(SELF_NAME.len());
    DirBlock {
        records: vec![
            DirRecord::new(number, SELF_NAME, FileType::Directory, self_len),
            DirRecord::new(parent.number, PARENT_NAME, FileType::Directory, block_size - self_len),
        ],
    }
    .write(image, block)?;
    inode.size = block_size as u32;
    inode.links_count = 2;
    image.write_inode(number, &inode)?;

    parent.inode.links_count += 1;
    image.write_inode(parent.number, &parent.inode)?;
    let mut group = image.group()?;
    group.used_dirs_count += 1;
    image.set_group(&group)?;

    debug!(parent = parent.number, inode = number, block, "created directory");
    Ok(number)
}

/// Adds another name for `target` in `parent`. Directories cannot be hard
/// linked.
pub fn hard_link(image: &mut Image, target: InodePointer, parent: &mut Directory, name: &[u8]) -> Result<()> {
    let mut inode = image.read_inode(target)?;
    if inode.is_directory() {
        return Err(Error::IsDirectory(format!("inode {}", target)));
    }
    parent.insert(image, target, name, inode.file_type())?;
    inode.links_count += 1;
    image.write_inode(target, &inode)
}

/// Creates a symbolic link whose target path is kept in one data block.
pub fn symbolic_link(image: &mut Image, parent: &mut Directory, name: &[u8], target: &[u8]) -> Result<InodePointer> {
    if target.len() > image.block_size() {
        return Err(Error::NameTooLong { len: target.len(), limit: image.block_size() });
    }
    let number = image.allocate_inode()?;
    let mut inode = image.initialize_inode(number, FileType::SymbolicLink)?;
    write_data(image, &mut inode, target)?;
    image.write_inode(number, &inode)?;
    parent.insert(image, number, name, FileType::SymbolicLink)?;
    debug!(inode = number, target = %display_name(target), "created symbolic link");
    Ok(number)
}
