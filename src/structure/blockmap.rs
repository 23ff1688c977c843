use tracing::debug;

use crate::consts::{BlockPointer, InodePointer};
use crate::structure::Image;
use crate::util::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Block,
    Inode,
}

/// One of the two allocation bitmaps of the group.
///
/// Bit `n` describes resource number `first + n`: blocks are numbered from
/// the first data block, inodes from 1. Only the first `count` bits name
/// real resources; the rest of the bitmap block is padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMap {
    pub resource: Resource,
    block: BlockPointer,
    first: u32,
    count: u32,
}

/// Index of the first unset bit below `count`, scanning bytes in ascending
/// order and bits from least to most significant.
pub fn first_clear_bit(bitmap: &[u8], count: usize) -> Option<usize> {
    for (byte_index, byte) in bitmap.iter().enumerate() {
        if *byte == 0xff {
            continue;
        }
        for bit in 0..8 {
            let index = byte_index * 8 + bit;
            if index >= count {
                return None;
            }
            if byte & (1 << bit) == 0 {
                return Some(index);
            }
        }
    }
    None
}

pub(crate) fn bit_is_set(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

pub(crate) fn count_set_bits(bitmap: &[u8], count: usize) -> u32 {
    (0..count).filter(|index| bit_is_set(bitmap, *index)).count() as u32
}

impl BlockMap {
    pub fn blocks(image: &Image) -> Result<BlockMap> {
        let group = image.group()?;
        Ok(BlockMap {
            resource: Resource::Block,
            block: group.block_bitmap,
            first: image.first_data_block(),
            count: image.block_count() - image.first_data_block(),
        })
    }

    pub fn inodes(image: &Image) -> Result<BlockMap> {
        let group = image.group()?;
        Ok(BlockMap {
            resource: Resource::Inode,
            block: group.inode_bitmap,
            first: 1,
            count: image.inode_count(),
        })
    }

    pub fn of(image: &Image, resource: Resource) -> Result<BlockMap> {
        match resource {
            Resource::Block => BlockMap::blocks(image),
            Resource::Inode => BlockMap::inodes(image),
        }
    }

    /// Number of real resources the bitmap describes.
    pub fn capacity(&self) -> u32 {
        self.count
    }

    fn bit(&self, number: u32) -> Result<usize> {
        if number < self.first || number - self.first >= self.count {
            return Err(match self.resource {
                Resource::Block => Error::BlockOutOfRange {
                    block: number,
                    count: self.first + self.count,
                },
                Resource::Inode => Error::InodeOutOfRange { inode: number, count: self.count },
            });
        }
        Ok((number - self.first) as usize)
    }

    /// First free resource number, or `None` when the bitmap is full.
    pub fn find_available(&self, image: &Image) -> Result<Option<u32>> {
        let bitmap = image.block(self.block)?;
        Ok(first_clear_bit(bitmap, self.count as usize).map(|bit| self.first + bit as u32))
    }

    pub fn is_used(&self, image: &Image, number: u32) -> Result<bool> {
        let bit = self.bit(number)?;
        Ok(bit_is_set(image.block(self.block)?, bit))
    }

    pub fn count_used(&self, image: &Image) -> Result<u32> {
        Ok(count_set_bits(image.block(self.block)?, self.count as usize))
    }

    /// Marks `number` in use and takes it off both free counters.
    ///
    /// Counters only move when the bit actually changes, so marking an
    /// already-used resource leaves them untouched.
    pub fn allocate(&self, image: &mut Image, number: u32) -> Result<()> {
        let bit = self.bit(number)?;
        let bitmap = image.block_mut(self.block)?;
        if bit_is_set(bitmap, bit) {
            return Ok(());
        }
        bitmap[bit / 8] |= 1 << (bit % 8);
        debug!(resource = ?self.resource, number, "allocated");
        self.adjust_free(image, false)
    }

    /// Clears `number` and returns it to both free counters. Zero is the
    /// "no block" sentinel and is ignored.
    pub fn deallocate(&self, image: &mut Image, number: u32) -> Result<()> {
        if number == 0 {
            return Ok(());
        }
        let bit = self.bit(number)?;
        let bitmap = image.block_mut(self.block)?;
        if !bit_is_set(bitmap, bit) {
            return Ok(());
        }
        bitmap[bit / 8] &= !(1 << (bit % 8));
        debug!(resource = ?self.resource, number, "deallocated");
        self.adjust_free(image, true)
    }

    fn adjust_free(&self, image: &mut Image, released: bool) -> Result<()> {
        let mut superblock = image.superblock();
        let mut group = image.group()?;
        match self.resource {
            Resource::Block => {
                superblock.free_blocks_count = step_u32(superblock.free_blocks_count, released);
                group.free_blocks_count = step_u16(group.free_blocks_count, released);
            }
            Resource::Inode => {
                superblock.free_inodes_count = step_u32(superblock.free_inodes_count, released);
                group.free_inodes_count = step_u16(group.free_inodes_count, released);
            }
        }
        image.set_superblock(&superblock);
        image.set_group(&group)
    }
}

fn step_u32(value: u32, up: bool) -> u32 {
    if up {
        value.saturating_add(1)
    } else {
        value.saturating_sub(1)
    }
}

fn step_u16(value: u16, up: bool) -> u16 {
    if up {
        value.saturating_add(1)
    } else {
        value.saturating_sub(1)
    }
}

impl Image {
    /// Allocates the first free block, failing with `NoSpace` when none is left.
    pub fn allocate_block(&mut self) -> Result<BlockPointer> {
        let map = BlockMap::blocks(self)?;
        let block = map.find_available(self)?.ok_or(Error::NoSpace)?;
        map.allocate(self, block)?;
        Ok(block)
    }

    pub fn allocate_inode(&mut self) -> Result<InodePointer> {
        let map = BlockMap::inodes(self)?;
        let inode = map.find_available(self)?.ok_or(Error::NoSpace)?;
        map.allocate(self, inode)?;
        Ok(inode)
    }

    pub fn release_block(&mut self, block: BlockPointer) -> Result<()> {
        BlockMap::blocks(self)?.deallocate(self, block)
    }

    pub fn release_inode(&mut self, inode: InodePointer) -> Result<()> {
        BlockMap::inodes(self)?.deallocate(self, inode)
    }
}
