use tracing::{debug, info};

use crate::consts::{
    BlockPointer, BASE_BLOCK_SIZE, GOOD_OLD_FIRST_INO, GOOD_OLD_INODE_SIZE, LOST_AND_FOUND_NAME,
    MAGIC, PARENT_NAME, ROOT_INODE, SELF_NAME, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE,
};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::directory::{packed_size, DirBlock, DirRecord};
use crate::structure::group::GroupDescriptor;
use crate::structure::inode::{timestamp, Inode};
use crate::structure::superblock::{Superblock, ERRORS_CONTINUE, FEATURE_INCOMPAT_FILETYPE, STATE_VALID};
use crate::structure::Image;
use crate::util::error::{Error, Result};
use crate::util::mode::{FileType, S_IFDIR};
use crate::util::serializable::{ByteSerializable, KnownSize};

const LOST_AND_FOUND_INODE: u32 = GOOD_OLD_FIRST_INO;
const DYNAMIC_REV: u32 = 1;
const DEFAULT_MAX_MOUNT_COUNT: u16 = 20;

/// Geometry of a freshly formatted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub block_count: u32,
    pub inode_count: u32,
    pub block_size: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions { block_count: 128, inode_count: 32, block_size: BASE_BLOCK_SIZE }
    }
}

impl FormatOptions {
    pub fn image_size(&self) -> u64 {
        self.block_count as u64 * self.block_size as u64
    }
}

/// Builds a single-group ext2 image holding only the root directory and
/// `lost+found`.
pub fn format_image(options: &FormatOptions) -> Result<Image> {
    let block_size = options.block_size;
    if !block_size.is_power_of_two() || !(BASE_BLOCK_SIZE..=32 * BASE_BLOCK_SIZE).contains(&block_size) {
        return Err(Error::Format(format!("unsupported block size {}", block_size)));
    }
    let bits_per_block = (block_size * 8) as u32;
    // The group descriptor keeps 16-bit free counters.
    let group_limit = bits_per_block.min(u16::MAX as u32);
    if options.inode_count <= LOST_AND_FOUND_INODE || options.inode_count > group_limit {
        return Err(Error::Format(format!("unsupported inode count {}", options.inode_count)));
    }

    let first_data_block: BlockPointer = if block_size == BASE_BLOCK_SIZE { 1 } else { 0 };
    let log_block_size = (block_size / BASE_BLOCK_SIZE).trailing_zeros();
    let table_blocks = (options.inode_count as usize * GOOD_OLD_INODE_SIZE).div_ceil(block_size) as u32;

    let group_table = first_data_block + 1;
    let block_bitmap = group_table + 1;
    let inode_bitmap = block_bitmap + 1;
    let inode_table = inode_bitmap + 1;
    let root_block = inode_table + table_blocks;
    let lost_and_found_block = root_block + 1;
    let used_blocks = lost_and_found_block + 1 - first_data_block;

    if options.block_count <= lost_and_found_block
        || options.block_count - first_data_block > group_limit
    {
        return Err(Error::Format(format!("unsupported block count {}", options.block_count)));
    }
    let data_bits = options.block_count - first_data_block;

    let mut bytes = vec![0u8; block_size * options.block_count as usize];

    let superblock = Superblock {
        inodes_count: options.inode_count,
        blocks_count: options.block_count,
        free_blocks_count: data_bits - used_blocks,
        free_inodes_count: options.inode_count - LOST_AND_FOUND_INODE,
        first_data_block,
        log_block_size,
        log_frag_size: log_block_size,
        blocks_per_group: bits_per_block,
        frags_per_group: bits_per_block,
        inodes_per_group: options.inode_count,
        wtime: timestamp(),
        max_mnt_count: DEFAULT_MAX_MOUNT_COUNT,
        magic: MAGIC,
        state: STATE_VALID,
        errors: ERRORS_CONTINUE,
        lastcheck: timestamp(),
        rev_level: DYNAMIC_REV,
        first_ino: GOOD_OLD_FIRST_INO,
        inode_size: GOOD_OLD_INODE_SIZE as u16,
        feature_incompat: FEATURE_INCOMPAT_FILETYPE,
        ..Default::default()
    };
    superblock.write_bytes(&mut bytes[SUPERBLOCK_OFFSET..SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE]);

    let group = GroupDescriptor {
        block_bitmap,
        inode_bitmap,
        inode_table,
        free_blocks_count: (data_bits - used_blocks) as u16,
        free_inodes_count: (options.inode_count - LOST_AND_FOUND_INODE) as u16,
        used_dirs_count: 2,
    };
    let group_offset = group_table as usize * block_size;
    group.write_bytes(&mut bytes[group_offset..group_offset + GroupDescriptor::size_on_disk()]);

    let block_bits = block_bitmap as usize * block_size;
    mark_bits(&mut bytes[block_bits..block_bits + block_size], 0..used_blocks as usize);
    mark_bits(&mut bytes[block_bits..block_bits + block_size], data_bits as usize..block_size * 8);
    let inode_bits = inode_bitmap as usize * block_size;
    mark_bits(&mut bytes[inode_bits..inode_bits + block_size], 0..LOST_AND_FOUND_INODE as usize);
    mark_bits(
        &mut bytes[inode_bits..inode_bits + block_size],
        options.inode_count as usize..block_size * 8,
    );

    let mut image = Image::open(bytes)?;
    let sectors = image.sectors_per_block();

    let mut root = Inode::new(FileType::Directory);
    root.links_count = 3;
    root.size = block_size as u32;
    root.blocks = sectors;
    root.block[0] = root_block;
    image.write_inode(ROOT_INODE, &root)?;

    let mut lost_and_found = Inode::new(FileType::Directory);
    lost_and_found.mode = S_IFDIR | 0o700;
    lost_and_found.links_count = 2;
    lost_and_found.size = block_size as u32;
    lost_and_found.blocks = sectors;
    lost_and_found.block[0] = lost_and_found_block;
    image.write_inode(LOST_AND_FOUND_INODE, &lost_and_found)?;

    let self_len = packed_size(SELF_NAME.len());
    DirBlock {
        records: vec![
            DirRecord::new(ROOT_INODE, SELF_NAME, FileType::Directory, self_len),
            DirRecord::new(ROOT_INODE, PARENT_NAME, FileType::Directory, packed_size(PARENT_NAME.len())),
            DirRecord::new(LOST_AND_FOUND_INODE, LOST_AND_FOUND_NAME, FileType::Directory, block_size - 2 * self_len),
        ],
    }
    .write(&mut image, root_block)?;
    DirBlock {
        records: vec![
            DirRecord::new(LOST_AND_FOUND_INODE, SELF_NAME, FileType::Directory, self_len),
            DirRecord::new(ROOT_INODE, PARENT_NAME, FileType::Directory, block_size - self_len),
        ],
    }
    .write(&mut image, lost_and_found_block)?;

    debug!(block_count = options.block_count, inode_count = options.inode_count, block_size, "formatted image");
    Ok(image)
}

fn mark_bits(bitmap: &mut [u8], bits: std::ops::Range<usize>) {
    for bit in bits {
        bitmap[bit / 8] |= 1 << (bit % 8);
    }
}

/// An ext2 image loaded from a device. Changes made through [`FS::image_mut`]
/// stay in memory until [`FS::sync`] writes the modified blocks back.
pub struct FS<A: DeviceDriver> {
    io: IO<A>,
    image: Image,
}

impl<A: DeviceDriver> FS<A> {
    /// Formats the device and mounts the result.
    pub fn format(device: A, options: &FormatOptions) -> Result<FS<A>> {
        if device.get_size() < options.image_size() {
            return Err(Error::Format(format!(
                "device holds {} bytes, image needs {}",
                device.get_size(),
                options.image_size()
            )));
        }
        let mut image = format_image(options)?;
        image.take_dirty();

        let mut io = IO::new(device);
        for block in 0..image.block_count() {
            io.write_block(image.block_size(), block, image.block(block)?)?;
        }
        io.flush()?;
        info!(blocks = image.block_count(), inodes = image.inode_count(), "formatted device");
        Ok(FS { io, image })
    }

    pub fn mount(device: A) -> Result<FS<A>> {
        let io = IO::new(device);
        let image = Image::open(io.read_image()?)?;
        Ok(FS { io, image })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut Image {
        &mut self.image
    }

    /// Writes every block modified since the last sync back to the device.
    pub fn sync(&mut self) -> Result<()> {
        let dirty = self.image.take_dirty();
        if dirty.is_empty() {
            return Ok(());
        }
        for block in &dirty {
            self.io.write_block(self.image.block_size(), *block, self.image.block(*block)?)?;
        }
        self.io.flush()?;
        debug!(blocks = dirty.len(), "synced image");
        Ok(())
    }

    pub fn into_device(self) -> A {
        self.io.device
    }
}
