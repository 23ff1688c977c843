use anyhow::{Context, Result};
use ext2fs::cli::{self, Usage};
use ext2fs::consts::SECTOR_SIZE;
use ext2fs::driver::file_drive::FileDrive;
use ext2fs::fuse::MountOptions;
use ext2fs::FS;

fn main() {
    cli::init_logging();
    cli::finish(run());
}

fn run() -> Result<()> {
    let args = cli::args();
    let [image, mountpoint, flags @ ..] = args.as_slice() else {
        return Err(Usage(
            "ext2_mount <image file name> <mountpoint> [--read-only] [--allow-other] [--auto-unmount]".to_owned(),
        )
        .into());
    };
    let mut options = MountOptions::default();
    for flag in flags {
        match flag.as_slice() {
            b"--read-only" => options.read_only = true,
            b"--allow-other" => options.allow_other = true,
            b"--auto-unmount" => options.auto_unmount = true,
            other => return Err(Usage(format!("unknown flag {}", String::from_utf8_lossy(other))).into()),
        }
    }

    let path = cli::host_path(image);
    let drive = FileDrive::open(path, SECTOR_SIZE).with_context(|| format!("cannot open {}", path.display()))?;
    let fs = FS::mount(drive).with_context(|| format!("cannot read an ext2 image from {}", path.display()))?;
    ext2fs::fuse::mount(fs, cli::host_path(mountpoint), &options)?;
    Ok(())
}
