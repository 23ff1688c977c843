use crate::consts::{BlockPointer, InodePointer, SUPERBLOCK_SIZE};
use crate::util::serializable::{read_u16, read_u32, write_u16, write_u32, ByteSerializable, KnownSize};

pub const STATE_VALID: u16 = 1;
pub const ERRORS_CONTINUE: u16 = 1;
pub const FEATURE_INCOMPAT_FILETYPE: u32 = 0x0002;

/// The fields of the ext2 superblock this crate reads or maintains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub r_blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: BlockPointer,
    pub log_block_size: u32,
    pub log_frag_size: u32,
    pub blocks_per_group: u32,
    pub frags_per_group: u32,
    pub inodes_per_group: u32,
    pub mtime: u32,
    pub wtime: u32,
    pub mnt_count: u16,
    pub max_mnt_count: u16,
    pub magic: u16,
    pub state: u16,
    pub errors: u16,
    pub minor_rev_level: u16,
    pub lastcheck: u32,
    pub checkinterval: u32,
    pub creator_os: u32,
    pub rev_level: u32,
    pub def_resuid: u16,
    pub def_resgid: u16,
    pub first_ino: InodePointer,
    pub inode_size: u16,
    pub block_group_nr: u16,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
}

impl KnownSize for Superblock {
    fn size_on_disk() -> usize {
        SUPERBLOCK_SIZE
    }
}

impl ByteSerializable for Superblock {
    fn from_bytes(bytes: &[u8]) -> Self {
        Superblock {
            inodes_count: read_u32(bytes, 0),
            blocks_count: read_u32(bytes, 4),
            r_blocks_count: read_u32(bytes, 8),
            free_blocks_count: read_u32(bytes, 12),
            free_inodes_count: read_u32(bytes, 16),
            first_data_block: read_u32(bytes, 20),
            log_block_size: read_u32(bytes, 24),
            log_frag_size: read_u32(bytes, 28),
            blocks_per_group: read_u32(bytes, 32),
            frags_per_group: read_u32(bytes, 36),
            inodes_per_group: read_u32(bytes, 40),
            mtime: read_u32(bytes, 44),
            wtime: read_u32(bytes, 48),
            mnt_count: read_u16(bytes, 52),
            max_mnt_count: read_u16(bytes, 54),
            magic: read_u16(bytes, 56),
            state: read_u16(bytes, 58),
            errors: read_u16(bytes, 60),
            minor_rev_level: read_u16(bytes, 62),
            lastcheck: read_u32(bytes, 64),
            checkinterval: read_u32(bytes, 68),
            creator_os: read_u32(bytes, 72),
            rev_level: read_u32(bytes, 76),
            def_resuid: read_u16(bytes, 80),
            def_resgid: read_u16(bytes, 82),
            first_ino: read_u32(bytes, 84),
            inode_size: read_u16(bytes, 88),
            block_group_nr: read_u16(bytes, 90),
            feature_compat: read_u32(bytes, 92),
            feature_incompat: read_u32(bytes, 96),
            feature_ro_compat: read_u32(bytes, 100),
        }
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        write_u32(bytes, 0, self.inodes_count);
        write_u32(bytes, 4, self.blocks_count);
        write_u32(bytes, 8, self.r_blocks_count);
        write_u32(bytes, 12, self.free_blocks_count);
        write_u32(bytes, 16, self.free_inodes_count);
        write_u32(bytes, 20, self.first_data_block);
        write_u32(bytes, 24, self.log_block_size);
        write_u32(bytes, 28, self.log_frag_size);
        write_u32(bytes, 32, self.blocks_per_group);
        write_u32(bytes, 36, self.frags_per_group);
        write_u32(bytes, 40, self.inodes_per_group);
        write_u32(bytes, 44, self.mtime);
        write_u32(bytes, 48, self.wtime);
        write_u16(bytes, 52, self.mnt_count);
        write_u16(bytes, 54, self.max_mnt_count);
        write_u16(bytes, 56, self.magic);
        write_u16(bytes, 58, self.state);
        write_u16(bytes, 60, self.errors);
        write_u16(bytes, 62, self.minor_rev_level);
        write_u32(bytes, 64, self.lastcheck);
        write_u32(bytes, 68, self.checkinterval);
        write_u32(bytes, 72, self.creator_os);
        write_u32(bytes, 76, self.rev_level);
        write_u16(bytes, 80, self.def_resuid);
        write_u16(bytes, 82, self.def_resgid);
        write_u32(bytes, 84, self.first_ino);
        write_u16(bytes, 88, self.inode_size);
        write_u16(bytes, 90, self.block_group_nr);
        write_u32(bytes, 92, self.feature_compat);
        write_u32(bytes, 96, self.feature_incompat);
        write_u32(bytes, 100, self.feature_ro_compat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_superblock() {
        let superblock = Superblock {
            inodes_count: 32,
            blocks_count: 128,
            free_blocks_count: 100,
            free_inodes_count: 21,
            first_data_block: 1,
            blocks_per_group: 8192,
            inodes_per_group: 32,
            magic: 0xef53,
            rev_level: 1,
            first_ino: 11,
            inode_size: 128,
            feature_incompat: FEATURE_INCOMPAT_FILETYPE,
            ..Default::default()
        };

        let mut bytes = vec![0xaa; Superblock::size_on_disk()];
        superblock.write_bytes(&mut bytes);
        assert_eq!(Superblock::from_bytes(&bytes), superblock);
        assert_eq!(&bytes[56..58], &[0x53, 0xef]);
        // bytes past the modeled fields are left alone
        assert!(bytes[104..].iter().all(|byte| *byte == 0xaa));
    }
}
