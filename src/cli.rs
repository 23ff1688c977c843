//! Plumbing shared by the command-line tools.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::consts::SECTOR_SIZE;
use crate::driver::file_drive::FileDrive;
use crate::fs::FS;
use crate::structure::Image;
use crate::util::error::Error;

/// Wrong number or shape of command-line arguments.
#[derive(Debug, Error)]
#[error("usage: {0}")]
pub struct Usage(pub String);

/// Installs the stderr log subscriber, filtered by `RUST_LOG` and
/// defaulting to warnings.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Arguments after the program name, as raw bytes.
pub fn args() -> Vec<Vec<u8>> {
    std::env::args_os().skip(1).map(OsString::into_vec).collect()
}

pub fn host_path(bytes: &[u8]) -> &Path {
    Path::new(OsStr::from_bytes(bytes))
}

/// Opens the image file, runs `operation` on it and writes back whatever
/// it changed. Changes are written even when the operation fails.
pub fn with_image<T>(
    path: impl AsRef<Path>,
    operation: impl FnOnce(&mut Image) -> crate::Result<T>,
) -> Result<T> {
    let path = path.as_ref();
    let drive = FileDrive::open(path, SECTOR_SIZE).with_context(|| format!("cannot open {}", path.display()))?;
    let mut fs = FS::mount(drive).with_context(|| format!("cannot read an ext2 image from {}", path.display()))?;
    let result = operation(fs.image_mut());
    fs.sync().with_context(|| format!("cannot write back {}", path.display()))?;
    Ok(result?)
}

/// Exit status for a failed run: the errno of the first library error in
/// the chain, 1 for usage errors and `EIO` for anything else.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<Usage>().is_some() {
        return 1;
    }
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::to_errno)
        .unwrap_or(libc::EIO)
}

/// Reports `result` and exits the process with the matching status.
pub fn finish(result: Result<()>) {
    if let Err(error) = result {
        eprintln!("error: {error:#}");
        std::process::exit(exit_code(&error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FormatOptions;

    fn formatted_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let options = FormatOptions::default();
        let drive = FileDrive::create(&path, options.image_size(), SECTOR_SIZE).unwrap();
        FS::format(drive, &options).unwrap();
        (dir, path)
    }

    #[test]
    fn exit_codes_follow_errno() {
        let error = anyhow::Error::new(Error::Exists("a".into())).context("while linking");
        assert_eq!(exit_code(&error), libc::EEXIST);
        assert_eq!(exit_code(&anyhow::Error::new(Usage("x".into()))), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), libc::EIO);
    }

    #[test]
    fn changes_persist_between_runs() {
        let (_dir, path) = formatted_file();
        with_image(&path, |image| crate::ops::mkdir(image, b"/kept")).unwrap();
        let found = with_image(&path, |image| crate::path::resolve(image, crate::consts::ROOT_INODE, b"/kept")).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn failed_operation_still_writes_back() {
        let (_dir, path) = formatted_file();
        let result: Result<()> = with_image(&path, |image| {
            image.allocate_inode()?;
            Err(Error::NoSpace)
        });
        assert_eq!(exit_code(&result.unwrap_err()), libc::ENOSPC);
        let free = with_image(&path, |image| Ok(image.superblock().free_inodes_count)).unwrap();
        assert_eq!(free, 20);
    }

    #[test]
    fn missing_image_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let error = with_image(dir.path().join("none.img"), |_| Ok(())).unwrap_err();
        assert_eq!(exit_code(&error), libc::EIO);
    }
}
