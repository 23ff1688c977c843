use crate::consts::{BlockPointer, GROUP_DESCRIPTOR_SIZE};
use crate::util::serializable::{read_u16, read_u32, write_u16, write_u32, ByteSerializable, KnownSize};

/// The descriptor of the image's only block group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDescriptor {
    pub block_bitmap: BlockPointer,
    pub inode_bitmap: BlockPointer,
    pub inode_table: BlockPointer,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
}

impl KnownSize for GroupDescriptor {
    fn size_on_disk() -> usize {
        GROUP_DESCRIPTOR_SIZE
    }
}

impl ByteSerializable for GroupDescriptor {
    fn from_bytes(bytes: &[u8]) -> Self {
        GroupDescriptor {
            block_bitmap: read_u32(bytes, 0),
            inode_bitmap: read_u32(bytes, 4),
            inode_table: read_u32(bytes, 8),
            free_blocks_count: read_u16(bytes, 12),
            free_inodes_count: read_u16(bytes, 14),
            used_dirs_count: read_u16(bytes, 16),
        }
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        write_u32(bytes, 0, self.block_bitmap);
        write_u32(bytes, 4, self.inode_bitmap);
        write_u32(bytes, 8, self.inode_table);
        write_u16(bytes, 12, self.free_blocks_count);
        write_u16(bytes, 14, self.free_inodes_count);
        write_u16(bytes, 16, self.used_dirs_count);
    }
}
