use tracing::debug;

use crate::consts::{InodePointer, BLOCK_POINTERS};
use crate::structure::directory::Directory;
use crate::structure::inode::Inode;
use crate::structure::Image;
use crate::util::error::Result;
use crate::util::mode::FileType;

/// Largest symlink target stored in the block pointers themselves.
const FAST_SYMLINK_LIMIT: usize = BLOCK_POINTERS * 4;

/// Creates a regular file holding `data` and links it into `parent`.
pub fn create_file(image: &mut Image, parent: &mut Directory, name: &[u8], data: &[u8]) -> Result<InodePointer> {
    let number = image.allocate_inode()?;
    let mut inode = image.initialize_inode(number, FileType::RegularFile)?;
    write_data(image, &mut inode, data)?;
    image.write_inode(number, &inode)?;
    parent.insert(image, number, name, FileType::RegularFile)?;
    Ok(number)
}

/// Appends `data` to an inode that has no blocks yet, one block at a time.
pub(crate) fn write_data(image: &mut Image, inode: &mut Inode, data: &[u8]) -> Result<()> {
    for chunk in data.chunks(image.block_size()) {
        let block = inode.push_block(image)?;
        image.block_mut(block)?[..chunk.len()].copy_from_slice(chunk);
        inode.size += chunk.len() as u32;
    }
    debug!(bytes = data.len(), blocks = inode.blocks_used(image), "wrote file data");
    Ok(())
}

/// Reads up to `size` bytes starting at `offset`, stopping at the end of file.
pub fn read(image: &Image, inode: &Inode, offset: u64, size: usize) -> Result<Vec<u8>> {
    let file_size = inode.size as u64;
    if offset >= file_size {
        return Ok(Vec::new());
    }
    let end = file_size.min(offset + size as u64);
    let block_size = image.block_size() as u64;

    let mut result = Vec::with_capacity((end - offset) as usize);
    let blocks = inode.data_blocks(image)?;
    let mut position = offset;
    while position < end {
        let index = (position / block_size) as usize;
        let within = (position % block_size) as usize;
        let take = ((block_size - within as u64).min(end - position)) as usize;
        match blocks.get(index) {
            Some(block) => result.extend_from_slice(&image.block(*block)?[within..within + take]),
            None => result.resize(result.len() + take, 0),
        }
        position += take as u64;
    }
    Ok(result)
}

/// The target path of a symbolic link.
pub fn read_link(image: &Image, inode: &Inode) -> Result<Vec<u8>> {
    if inode.blocks == 0 && (inode.size as usize) <= FAST_SYMLINK_LIMIT {
        let inline: Vec<u8> = inode.block.iter().flat_map(|pointer| pointer.to_le_bytes()).collect();
        return Ok(inline[..inode.size as usize].to_vec());
    }
    read(image, inode, 0, inode.size as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ROOT_INODE;
    use crate::fs::{format_image, FormatOptions};

    #[test]
    fn write_then_read() {
        let mut image = format_image(&FormatOptions::default()).unwrap();
        let mut root = Directory::open(&image, ROOT_INODE).unwrap();
        let data: Vec<u8> = (0..14_000u32).map(|i| (i % 251) as u8).collect();

        let number = create_file(&mut image, &mut root, b"data.bin", &data).unwrap();
        let inode = image.read_inode(number).unwrap();
        assert_eq!(inode.size, 14_000);
        assert_eq!(inode.blocks_used(&image), 14 + 1);
        assert_eq!(read(&image, &inode, 0, 20_000).unwrap(), data);
        assert_eq!(read(&image, &inode, 1020, 10).unwrap(), data[1020..1030].to_vec());
        assert_eq!(read(&image, &inode, 13_990, 100).unwrap(), data[13_990..].to_vec());
        assert!(read(&image, &inode, 14_000, 1).unwrap().is_empty());
    }

    #[test]
    fn empty_file_has_no_blocks() {
        let mut image = format_image(&FormatOptions::default()).unwrap();
        let mut root = Directory::open(&image, ROOT_INODE).unwrap();
        let number = create_file(&mut image, &mut root, b"empty", b"").unwrap();
        let inode = image.read_inode(number).unwrap();
        assert_eq!(inode.size, 0);
        assert_eq!(inode.blocks, 0);
    }

    #[test]
    fn inline_symlink_target() {
        let image = format_image(&FormatOptions::default()).unwrap();
        let mut inode = Inode::new(FileType::SymbolicLink);
        let target = b"/some/where";
        let mut inline = [0u8; FAST_SYMLINK_LIMIT];
        inline[..target.len()].copy_from_slice(target);
        for (slot, bytes) in inode.block.iter_mut().zip(inline.chunks(4)) {
            *slot = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        inode.size = target.len() as u32;
        assert_eq!(read_link(&image, &inode).unwrap(), target.to_vec());
    }
}
