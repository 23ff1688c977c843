pub type ModeBits = u16;

const PERMISSIONS_MASK: ModeBits = 0o7777;
const FORMAT_MASK: ModeBits = 0xf000;

pub const S_IFIFO: ModeBits = 0x1000;
pub const S_IFCHR: ModeBits = 0x2000;
pub const S_IFDIR: ModeBits = 0x4000;
pub const S_IFBLK: ModeBits = 0x6000;
pub const S_IFREG: ModeBits = 0x8000;
pub const S_IFLNK: ModeBits = 0xa000;
pub const S_IFSOCK: ModeBits = 0xc000;

/// Directory entry file-type tag, as stored in the entry's `file_type` byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown = 0,
    RegularFile = 1,
    Directory = 2,
    CharacterDevice = 3,
    BlockDevice = 4,
    Fifo = 5,
    Socket = 6,
    SymbolicLink = 7,
}

impl FileType {
    pub fn from_tag(tag: u8) -> FileType {
        match tag {
            1 => FileType::RegularFile,
            2 => FileType::Directory,
            3 => FileType::CharacterDevice,
            4 => FileType::BlockDevice,
            5 => FileType::Fifo,
            6 => FileType::Socket,
            7 => FileType::SymbolicLink,
            _ => FileType::Unknown,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Format bits plus the permissions new inodes of this type start with.
    pub fn default_mode(self) -> ModeBits {
        match self {
            FileType::RegularFile => S_IFREG | 0o644,
            FileType::Directory => S_IFDIR | 0o755,
            FileType::SymbolicLink => S_IFLNK | 0o777,
            FileType::CharacterDevice => S_IFCHR | 0o644,
            FileType::BlockDevice => S_IFBLK | 0o644,
            FileType::Fifo => S_IFIFO | 0o644,
            FileType::Socket => S_IFSOCK | 0o644,
            FileType::Unknown => 0,
        }
    }
}

pub trait ModeBitsHelper {
    fn get_permissions(&self) -> u16;
    fn file_type(&self) -> FileType;
    fn is_directory(&self) -> bool;
    fn is_file(&self) -> bool;
    fn is_symlink(&self) -> bool;
}

impl ModeBitsHelper for ModeBits {
    fn get_permissions(&self) -> u16 {
        self & PERMISSIONS_MASK
    }

    fn file_type(&self) -> FileType {
        match self & FORMAT_MASK {
            S_IFREG => FileType::RegularFile,
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::SymbolicLink,
            S_IFCHR => FileType::CharacterDevice,
            S_IFBLK => FileType::BlockDevice,
            S_IFIFO => FileType::Fifo,
            S_IFSOCK => FileType::Socket,
            _ => FileType::Unknown,
        }
    }

    fn is_directory(&self) -> bool {
        self & FORMAT_MASK == S_IFDIR
    }

    fn is_file(&self) -> bool {
        self & FORMAT_MASK == S_IFREG
    }

    fn is_symlink(&self) -> bool {
        self & FORMAT_MASK == S_IFLNK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_to_file_type() {
        assert_eq!((S_IFDIR | 0o755).file_type(), FileType::Directory);
        assert_eq!((S_IFREG | 0o644).file_type(), FileType::RegularFile);
        assert_eq!((S_IFLNK | 0o777).file_type(), FileType::SymbolicLink);
        assert_eq!(0u16.file_type(), FileType::Unknown);
        assert!(S_IFDIR.is_directory());
        assert!(!S_IFLNK.is_file());
        assert_eq!((S_IFREG | 0o4755).get_permissions(), 0o4755);
    }

    #[test]
    fn default_mode_round_trips_type() {
        for file_type in [FileType::RegularFile, FileType::Directory, FileType::SymbolicLink] {
            assert_eq!(file_type.default_mode().file_type(), file_type);
            assert_eq!(FileType::from_tag(file_type.tag()), file_type);
        }
    }
}
