use std::collections::BTreeSet;

use tracing::debug;

use crate::consts::{
    BlockPointer, InodePointer, BASE_BLOCK_SIZE, GOOD_OLD_INODE_SIZE, GOOD_OLD_REV, MAGIC,
    SECTOR_SIZE, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE,
};
use crate::structure::group::GroupDescriptor;
use crate::structure::superblock::Superblock;
use crate::util::error::{Error, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

pub mod blockmap;
pub mod directory;
pub mod group;
pub mod inode;
pub mod inode_table;
pub mod superblock;

const MAX_LOG_BLOCK_SIZE: u32 = 5;

/// An ext2 image with exactly one block group, held in memory.
///
/// Every access to on-disk structures goes through this value. Block
/// accessors are bounds-checked against the superblock's block count, and
/// mutable accessors record which blocks changed so that only those are
/// written back to the device.
#[derive(Debug, Clone)]
pub struct Image {
    bytes: Vec<u8>,
    block_size: usize,
    block_count: u32,
    first_data_block: BlockPointer,
    inode_count: u32,
    inode_size: usize,
    dirty: BTreeSet<BlockPointer>,
}

impl Image {
    /// Validates `bytes` as a single-group ext2 image and takes ownership of it.
    pub fn open(bytes: Vec<u8>) -> Result<Image> {
        if bytes.len() < SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE {
            return Err(Error::Format(format!("image is only {} bytes long", bytes.len())));
        }

        let superblock =
            Superblock::from_bytes(&bytes[SUPERBLOCK_OFFSET..SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE]);
        if superblock.magic != MAGIC {
            return Err(Error::Format(format!("bad magic number {:#06x}", superblock.magic)));
        }
        if superblock.log_block_size > MAX_LOG_BLOCK_SIZE {
            return Err(Error::Format(format!(
                "unsupported block size shift {}",
                superblock.log_block_size
            )));
        }

        let block_size = BASE_BLOCK_SIZE << superblock.log_block_size;
        let block_count = superblock.blocks_count;
        if (bytes.len() as u64) < block_size as u64 * block_count as u64 {
            return Err(Error::Format(format!(
                "image holds {} bytes but the superblock describes {} blocks of {} bytes",
                bytes.len(),
                block_count,
                block_size
            )));
        }
        if superblock.first_data_block >= block_count {
            return Err(Error::Format("first data block lies past the end of the image".into()));
        }
        if block_count - superblock.first_data_block > superblock.blocks_per_group
            || superblock.inodes_count != superblock.inodes_per_group
        {
            return Err(Error::Format("only single block group images are supported".into()));
        }
        if block_count - superblock.first_data_block > (block_size * 8) as u32
            || superblock.inodes_count > (block_size * 8) as u32
        {
            return Err(Error::Format("bitmaps do not fit in a single block".into()));
        }
        if block_count - superblock.first_data_block > u16::MAX as u32 || superblock.inodes_count > u16::MAX as u32 {
            return Err(Error::Format("group counters cannot describe more than 65535 blocks or inodes".into()));
        }

        let inode_size = if superblock.rev_level == GOOD_OLD_REV {
            GOOD_OLD_INODE_SIZE
        } else {
            superblock.inode_size as usize
        };
        if inode_size < GOOD_OLD_INODE_SIZE || !inode_size.is_power_of_two() || inode_size > block_size {
            return Err(Error::Format(format!("unsupported inode size {}", inode_size)));
        }

        let image = Image {
            bytes,
            block_size,
            block_count,
            first_data_block: superblock.first_data_block,
            inode_count: superblock.inodes_count,
            inode_size,
            dirty: BTreeSet::new(),
        };

        let group = image.group()?;
        let table_blocks = image.inode_table_blocks();
        for (what, block) in [
            ("block bitmap", group.block_bitmap),
            ("inode bitmap", group.inode_bitmap),
            ("inode table", group.inode_table),
        ] {
            image.check_block(block).map_err(|_| {
                Error::Format(format!("{} at block {} lies outside the image", what, block))
            })?;
        }
        if group.inode_table as u64 + table_blocks as u64 > block_count as u64 {
            return Err(Error::Format("inode table runs past the end of the image".into()));
        }

        debug!(block_size, block_count, inode_count = image.inode_count, "opened image");
        Ok(image)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn first_data_block(&self) -> BlockPointer {
        self.first_data_block
    }

    pub fn inode_count(&self) -> u32 {
        self.inode_count
    }

    pub fn inode_size(&self) -> usize {
        self.inode_size
    }

    /// Unit of `Inode::blocks`, which counts 512-byte sectors.
    pub fn sectors_per_block(&self) -> u32 {
        (self.block_size / SECTOR_SIZE) as u32
    }

    pub fn pointers_per_block(&self) -> usize {
        self.block_size / std::mem::size_of::<BlockPointer>()
    }

    pub(crate) fn inode_table_blocks(&self) -> u32 {
        let bytes = self.inode_count as usize * self.inode_size;
        bytes.div_ceil(self.block_size) as u32
    }

    pub(crate) fn check_block(&self, block: BlockPointer) -> Result<()> {
        if block >= self.block_count {
            return Err(Error::BlockOutOfRange { block, count: self.block_count });
        }
        Ok(())
    }

    pub(crate) fn check_inode(&self, inode: InodePointer) -> Result<()> {
        if inode == 0 || inode > self.inode_count {
            return Err(Error::InodeOutOfRange { inode, count: self.inode_count });
        }
        Ok(())
    }

    pub fn block(&self, block: BlockPointer) -> Result<&[u8]> {
        self.check_block(block)?;
        let start = block as usize * self.block_size;
        Ok(&self.bytes[start..start + self.block_size])
    }

    pub fn block_mut(&mut self, block: BlockPointer) -> Result<&mut [u8]> {
        self.check_block(block)?;
        self.dirty.insert(block);
        let start = block as usize * self.block_size;
        Ok(&mut self.bytes[start..start + self.block_size])
    }

    pub fn zero_block(&mut self, block: BlockPointer) -> Result<()> {
        self.block_mut(block)?.fill(0);
        Ok(())
    }

    /// Every slot of an indirect block, zero slots included.
    pub fn read_pointers(&self, block: BlockPointer) -> Result<Vec<BlockPointer>> {
        Ok(self
            .block(block)?
            .chunks_exact(4)
            .map(|slot| BlockPointer::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]))
            .collect())
    }

    pub fn write_pointer(&mut self, block: BlockPointer, slot: usize, value: BlockPointer) -> Result<()> {
        if slot >= self.pointers_per_block() {
            return Err(Error::corruption(block, format!("indirect slot {} out of range", slot)));
        }
        self.block_mut(block)?[slot * 4..slot * 4 + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn superblock(&self) -> Superblock {
        Superblock::from_bytes(&self.bytes[SUPERBLOCK_OFFSET..SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE])
    }

    pub fn set_superblock(&mut self, superblock: &Superblock) {
        superblock
            .write_bytes(&mut self.bytes[SUPERBLOCK_OFFSET..SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE]);
        let first = (SUPERBLOCK_OFFSET / self.block_size) as BlockPointer;
        let last = ((SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE - 1) / self.block_size) as BlockPointer;
        self.dirty.extend(first..=last);
    }

    fn group_table_block(&self) -> BlockPointer {
        self.first_data_block + 1
    }

    pub fn group(&self) -> Result<GroupDescriptor> {
        let block = self.block(self.group_table_block())?;
        Ok(GroupDescriptor::from_bytes(&block[..GroupDescriptor::size_on_disk()]))
    }

    pub fn set_group(&mut self, group: &GroupDescriptor) -> Result<()> {
        let block = self.block_mut(self.group_table_block())?;
        group.write_bytes(&mut block[..GroupDescriptor::size_on_disk()]);
        Ok(())
    }

    /// Blocks modified since the last call, in ascending order.
    pub fn take_dirty(&mut self) -> Vec<BlockPointer> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
