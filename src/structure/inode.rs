use std::time::SystemTime;

use tracing::debug;

use crate::consts::{
    BlockPointer, BlockPointers, BLOCK_POINTERS, DIRECT_POINTERS, GOOD_OLD_INODE_SIZE, INDIRECT_INDEX,
    NULL_POINTER,
};
use crate::structure::Image;
use crate::util::error::{Error, Result};
use crate::util::mode::{FileType, ModeBits, ModeBitsHelper};
use crate::util::serializable::{read_u16, read_u32, write_u16, write_u32, ByteSerializable, KnownSize};

const BLOCK_OFFSET: usize = 40;

/// Seconds since the epoch, as stored in inode timestamps.
pub(crate) fn timestamp() -> u32 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|since| since.as_secs() as u32)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inode {
    pub mode: ModeBits,
    pub uid: u16,
    pub size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub gid: u16,
    pub links_count: u16,
    /// Allocated space in 512-byte sectors, independent of the block size.
    pub blocks: u32,
    pub flags: u32,
    pub block: BlockPointers,
    pub generation: u32,
}

impl KnownSize for Inode {
    fn size_on_disk() -> usize {
        GOOD_OLD_INODE_SIZE
    }
}

impl ByteSerializable for Inode {
    fn from_bytes(bytes: &[u8]) -> Self {
        let mut block = [NULL_POINTER; BLOCK_POINTERS];
        for (i, pointer) in block.iter_mut().enumerate() {
            *pointer = read_u32(bytes, BLOCK_OFFSET + i * 4);
        }
        Inode {
            mode: read_u16(bytes, 0),
            uid: read_u16(bytes, 2),
            size: read_u32(bytes, 4),
            atime: read_u32(bytes, 8),
            ctime: read_u32(bytes, 12),
            mtime: read_u32(bytes, 16),
            dtime: read_u32(bytes, 20),
            gid: read_u16(bytes, 24),
            links_count: read_u16(bytes, 26),
            blocks: read_u32(bytes, 28),
            flags: read_u32(bytes, 32),
            block,
            generation: read_u32(bytes, 100),
        }
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        write_u16(bytes, 0, self.mode);
        write_u16(bytes, 2, self.uid);
        write_u32(bytes, 4, self.size);
        write_u32(bytes, 8, self.atime);
        write_u32(bytes, 12, self.ctime);
        write_u32(bytes, 16, self.mtime);
        write_u32(bytes, 20, self.dtime);
        write_u16(bytes, 24, self.gid);
        write_u16(bytes, 26, self.links_count);
        write_u32(bytes, 28, self.blocks);
        write_u32(bytes, 32, self.flags);
        for (i, pointer) in self.block.iter().enumerate() {
            write_u32(bytes, BLOCK_OFFSET + i * 4, *pointer);
        }
        write_u32(bytes, 100, self.generation);
    }
}

impl Inode {
    /// A fresh, live inode of `file_type` with one link and no blocks.
    pub fn new(file_type: FileType) -> Inode {
        let now = timestamp();
        Inode {
            mode: file_type.default_mode(),
            atime: now,
            ctime: now,
            mtime: now,
            links_count: 1,
            ..Default::default()
        }
    }

    pub fn file_type(&self) -> FileType {
        self.mode.file_type()
    }

    pub fn is_directory(&self) -> bool {
        self.mode.is_directory()
    }

    pub fn indirect(&self) -> BlockPointer {
        self.block[INDIRECT_INDEX]
    }

    /// Number of blocks accounted for by `blocks`, indirect block included.
    pub fn blocks_used(&self, image: &Image) -> u32 {
        self.blocks / image.sectors_per_block()
    }

    /// Data blocks in logical order: direct slots, then the entries of the
    /// single indirect block. Zero slots are skipped.
    pub fn data_blocks(&self, image: &Image) -> Result<Vec<BlockPointer>> {
        if self.blocks == 0 {
            return Ok(Vec::new());
        }
        let mut blocks: Vec<BlockPointer> = self.block[..DIRECT_POINTERS]
            .iter()
            .copied()
            .filter(|pointer| *pointer != NULL_POINTER)
            .collect();
        if self.indirect() != NULL_POINTER {
            blocks.extend(
                image
                    .read_pointers(self.indirect())?
                    .into_iter()
                    .filter(|pointer| *pointer != NULL_POINTER),
            );
        }
        Ok(blocks)
    }

    /// Data blocks plus the indirect block itself.
    pub fn all_blocks(&self, image: &Image) -> Result<Vec<BlockPointer>> {
        let mut blocks = self.data_blocks(image)?;
        if self.blocks != 0 && self.indirect() != NULL_POINTER {
            blocks.push(self.indirect());
        }
        Ok(blocks)
    }

    /// Allocates a zeroed data block and appends it to the block list,
    /// allocating the indirect block on first use. `blocks` grows by one
    /// block's worth of sectors per block allocated; `size` is left to the
    /// caller.
    pub fn push_block(&mut self, image: &mut Image) -> Result<BlockPointer> {
        let sectors = image.sectors_per_block();

        if self.indirect() == NULL_POINTER {
            if let Some(slot) = self.block[..DIRECT_POINTERS].iter().position(|p| *p == NULL_POINTER) {
                let block = image.allocate_block()?;
                image.zero_block(block)?;
                self.block[slot] = block;
                self.blocks += sectors;
                return Ok(block);
            }
        }

        let mut fresh_indirect = false;
        if self.indirect() == NULL_POINTER {
            let indirect = image.allocate_block()?;
            image.zero_block(indirect)?;
            self.block[INDIRECT_INDEX] = indirect;
            self.blocks += sectors;
            fresh_indirect = true;
            debug!(block = indirect, "allocated indirect block");
        }

        let indirect = self.indirect();
        let slot = image
            .read_pointers(indirect)?
            .iter()
            .position(|p| *p == NULL_POINTER)
            .ok_or(Error::NoSpace)?;

        let block = match image.allocate_block() {
            Ok(block) => block,
            Err(error) => {
                if fresh_indirect {
                    image.release_block(indirect)?;
                    self.block[INDIRECT_INDEX] = NULL_POINTER;
                    self.blocks -= sectors;
                }
                return Err(error);
            }
        };
        image.zero_block(block)?;
        image.write_pointer(indirect, slot, block)?;
        self.blocks += sectors;
        Ok(block)
    }

    /// Returns every block the inode references to the allocator. The
    /// pointers themselves are left in place.
    pub fn release_blocks(&self, image: &mut Image) -> Result<()> {
        for block in self.all_blocks(image)? {
            image.release_block(block)?;
        }
        Ok(())
    }
}
