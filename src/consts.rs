pub(crate) const SUPERBLOCK_OFFSET: usize = 1024;
pub(crate) const SUPERBLOCK_SIZE: usize = 1024;
pub(crate) const GROUP_DESCRIPTOR_SIZE: usize = 32;
pub(crate) const BASE_BLOCK_SIZE: usize = 1024;
pub const SECTOR_SIZE: usize = 512;

pub(crate) const MAGIC: u16 = 0xef53;
pub(crate) const GOOD_OLD_REV: u32 = 0;
pub(crate) const GOOD_OLD_INODE_SIZE: usize = 128;
pub(crate) const GOOD_OLD_FIRST_INO: InodePointer = 11;

pub(crate) const DIRECT_POINTERS: usize = 12;
pub(crate) const INDIRECT_INDEX: usize = 12;
pub(crate) const BLOCK_POINTERS: usize = 15;

pub(crate) const DIR_ENTRY_HEADER_SIZE: usize = 8;
pub(crate) const MAX_NAME_LENGTH: usize = 255;

pub const ROOT_INODE: InodePointer = 2;
pub const NULL_POINTER: BlockPointer = 0;

pub const SELF_NAME: &[u8] = b".";
pub const PARENT_NAME: &[u8] = b"..";
pub const LOST_AND_FOUND_NAME: &[u8] = b"lost+found";

pub type BlockPointer = u32;
pub type InodePointer = u32;
pub type BlockPointers = [BlockPointer; BLOCK_POINTERS];
