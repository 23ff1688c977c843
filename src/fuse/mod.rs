//! Serves an image through FUSE.

mod filesystem;

use std::path::Path;

use fuser::MountOption;
use tracing::info;

pub use filesystem::Ext2Fuse;

use crate::driver::DeviceDriver;
use crate::fs::FS;
use crate::util::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub read_only: bool,
    pub allow_other: bool,
    pub auto_unmount: bool,
}

fn build_mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::FSName("ext2fs".to_owned()),
        MountOption::Subtype("ext2".to_owned()),
        MountOption::DefaultPermissions,
        MountOption::NoAtime,
    ];
    if options.read_only {
        opts.push(MountOption::RO);
    }
    if options.allow_other {
        opts.push(MountOption::AllowOther);
    }
    if options.auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }
    opts
}

/// Mounts `fs` at `mountpoint` and blocks until it is unmounted.
pub fn mount<A: DeviceDriver>(fs: FS<A>, mountpoint: impl AsRef<Path>, options: &MountOptions) -> Result<()> {
    let mountpoint = mountpoint.as_ref();
    if mountpoint.as_os_str().is_empty() {
        return Err(Error::InvalidPath("mountpoint cannot be empty".to_owned()));
    }
    info!(mountpoint = %mountpoint.display(), read_only = options.read_only, "mounting image");
    fuser::mount2(Ext2Fuse::new(fs, options.read_only), mountpoint, &build_mount_options(options))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory_drive::MemoryDrive;
    use crate::fs::FormatOptions;

    #[test]
    fn read_only_adds_ro() {
        let opts = build_mount_options(&MountOptions { read_only: true, ..Default::default() });
        assert!(opts.contains(&MountOption::RO));
        assert!(!opts.contains(&MountOption::AllowOther));

        let opts = build_mount_options(&MountOptions { allow_other: true, auto_unmount: true, ..Default::default() });
        assert!(!opts.contains(&MountOption::RO));
        assert!(opts.contains(&MountOption::AllowOther));
        assert!(opts.contains(&MountOption::AutoUnmount));
    }

    #[test]
    fn empty_mountpoint_is_rejected() {
        let fs = FS::format(MemoryDrive::new(128 * 1024, 512), &FormatOptions::default()).unwrap();
        assert!(matches!(mount(fs, "", &MountOptions::default()), Err(Error::InvalidPath(_))));
    }
}
