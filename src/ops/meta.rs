use std::time::{Duration, SystemTime};

use crate::consts::InodePointer;
use crate::structure::Image;
use crate::util::error::Result;
use crate::util::mode::{FileType, ModeBitsHelper};

pub type UserId = u32;
pub type GroupId = u32;

/// Attributes of one inode, in the shape file-system front ends expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub inode: InodePointer,
    pub inode_type: FileType,
    pub accessed_at: SystemTime,
    pub modified_at: SystemTime,
    pub changed_at: SystemTime,
    pub permissions: u16,
    pub nlinks: u32,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub size: u64,
    /// 512-byte sectors allocated to the inode.
    pub blocks: u64,
    pub flags: u32,
}

impl Metadata {
    pub fn read(image: &Image, inode: InodePointer) -> Result<Metadata> {
        let record = image.read_inode(inode)?;
        Ok(Metadata {
            inode,
            inode_type: record.file_type(),
            accessed_at: to_system_time(record.atime),
            modified_at: to_system_time(record.mtime),
            changed_at: to_system_time(record.ctime),
            permissions: record.mode.get_permissions(),
            nlinks: record.links_count as u32,
            user_id: record.uid as UserId,
            group_id: record.gid as GroupId,
            size: record.size as u64,
            blocks: record.blocks as u64,
            flags: record.flags,
        })
    }
}

fn to_system_time(seconds: u32) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(seconds as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ROOT_INODE;
    use crate::fs::{format_image, FormatOptions};

    #[test]
    fn root_metadata() {
        let image = format_image(&FormatOptions::default()).unwrap();
        let meta = Metadata::read(&image, ROOT_INODE).unwrap();
        assert_eq!(meta.inode_type, FileType::Directory);
        assert_eq!(meta.permissions, 0o755);
        assert_eq!(meta.nlinks, 3);
        assert_eq!(meta.size, 1024);
        assert_eq!(meta.blocks, 2);
        assert!(meta.modified_at > SystemTime::UNIX_EPOCH);
    }
}
