use std::os::raw::c_int;

use thiserror::Error;

use crate::consts::{BlockPointer, InodePointer};

type ErrorNum = c_int;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the metadata engine and its drivers can report.
///
/// Each variant maps to exactly one errno through [`Error::to_errno`]; the
/// command-line drivers use that value as their exit status.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte region is not a single-group ext2 image this crate can handle.
    #[error("invalid on-disk format: {0}")]
    Format(String),

    #[error("corrupt metadata at block {block}: {detail}")]
    Corruption { block: BlockPointer, detail: String },

    #[error("block {block} is outside the image ({count} blocks)")]
    BlockOutOfRange { block: BlockPointer, count: u32 },

    #[error("inode {inode} is outside the inode table ({count} inodes)")]
    InodeOutOfRange { inode: InodePointer, count: u32 },

    /// Non-absolute path, or a parent path that does not resolve to a directory.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not a directory: {0}")]
    NotDirectory(String),

    #[error("file exists: {0}")]
    Exists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("{name} has {links} hard links")]
    MultiLinked { name: String, links: u16 },

    #[error("no space left on device")]
    NoSpace,

    #[error("name too long: {len} bytes (limit {limit})")]
    NameTooLong { len: usize, limit: usize },

    #[error("inode {0} is in use")]
    InodeInUse(InodePointer),

    #[error("block {0} is in use")]
    BlockInUse(BlockPointer),
}

impl Error {
    pub fn to_errno(&self) -> ErrorNum {
        match self {
            Error::Io(_) => libc::EIO,
            Error::Format(_) => libc::EIO,
            Error::Corruption { .. } => libc::EIO,
            Error::BlockOutOfRange { .. } => libc::EIO,
            Error::InodeOutOfRange { .. } => libc::EIO,
            Error::InvalidPath(_) => libc::EINVAL,
            Error::NotDirectory(_) => libc::ENOTDIR,
            Error::Exists(_) => libc::EEXIST,
            Error::NotFound(_) => libc::ENOENT,
            Error::IsDirectory(_) => libc::EISDIR,
            Error::MultiLinked { .. } => libc::EMLINK,
            Error::NoSpace => libc::ENOSPC,
            Error::NameTooLong { .. } => libc::ENAMETOOLONG,
            Error::InodeInUse(_) => libc::EBUSY,
            Error::BlockInUse(_) => libc::EBUSY,
        }
    }

    pub(crate) fn corruption(block: BlockPointer, detail: impl Into<String>) -> Error {
        Error::Corruption { block, detail: detail.into() }
    }
}

/// Lossy rendering of an on-disk name or path for messages.
pub(crate) fn display_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_categories_have_distinct_errnos() {
        let errors = [
            Error::InvalidPath("x".into()),
            Error::Exists("x".into()),
            Error::NotFound("x".into()),
            Error::IsDirectory("x".into()),
            Error::MultiLinked { name: "x".into(), links: 2 },
            Error::NoSpace,
            Error::NameTooLong { len: 2000, limit: 1024 },
            Error::InodeInUse(12),
        ];
        let mut codes: Vec<ErrorNum> = errors.iter().map(Error::to_errno).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|code| *code > 0));
    }

    #[test]
    fn busy_variants_share_ebusy() {
        assert_eq!(Error::InodeInUse(1).to_errno(), libc::EBUSY);
        assert_eq!(Error::BlockInUse(1).to_errno(), libc::EBUSY);
    }
}
