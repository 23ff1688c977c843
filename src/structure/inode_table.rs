use tracing::debug;

use crate::consts::{BlockPointer, InodePointer};
use crate::structure::inode::Inode;
use crate::structure::Image;
use crate::util::error::Result;
use crate::util::mode::FileType;
use crate::util::serializable::{ByteSerializable, KnownSize};

/// The group's inode table: a flat array of fixed-size records indexed by
/// `inode - 1`.
#[derive(Debug, Clone, Copy)]
pub struct InodeTable {
    first_block: BlockPointer,
    inode_size: usize,
    block_size: usize,
}

impl InodeTable {
    pub fn of(image: &Image) -> Result<InodeTable> {
        Ok(InodeTable {
            first_block: image.group()?.inode_table,
            inode_size: image.inode_size(),
            block_size: image.block_size(),
        })
    }

    /// Block holding `inode`, and the record's byte offset inside it.
    pub fn locate(&self, image: &Image, inode: InodePointer) -> Result<(BlockPointer, usize)> {
        image.check_inode(inode)?;
        let index = (inode - 1) as usize;
        let per_block = self.block_size / self.inode_size;
        let block = self.first_block + (index / per_block) as BlockPointer;
        Ok((block, (index % per_block) * self.inode_size))
    }

    pub fn read(&self, image: &Image, inode: InodePointer) -> Result<Inode> {
        let (block, offset) = self.locate(image, inode)?;
        let bytes = image.block(block)?;
        Ok(Inode::from_bytes(&bytes[offset..offset + Inode::size_on_disk()]))
    }

    pub fn write(&self, image: &mut Image, inode: InodePointer, record: &Inode) -> Result<()> {
        let (block, offset) = self.locate(image, inode)?;
        let bytes = image.block_mut(block)?;
        record.write_bytes(&mut bytes[offset..offset + Inode::size_on_disk()]);
        Ok(())
    }

    /// Wipes the whole on-disk record and writes a fresh inode of `file_type`.
    pub fn initialize(&self, image: &mut Image, inode: InodePointer, file_type: FileType) -> Result<Inode> {
        let (block, offset) = self.locate(image, inode)?;
        image.block_mut(block)?[offset..offset + self.inode_size].fill(0);
        let record = Inode::new(file_type);
        self.write(image, inode, &record)?;
        debug!(inode, ?file_type, "initialized inode");
        Ok(record)
    }
}

impl Image {
    pub fn read_inode(&self, inode: InodePointer) -> Result<Inode> {
        InodeTable::of(self)?.read(self, inode)
    }

    pub fn write_inode(&mut self, inode: InodePointer, record: &Inode) -> Result<()> {
        InodeTable::of(self)?.write(self, inode, record)
    }

    pub fn initialize_inode(&mut self, inode: InodePointer, file_type: FileType) -> Result<Inode> {
        InodeTable::of(self)?.initialize(self, inode, file_type)
    }
}
