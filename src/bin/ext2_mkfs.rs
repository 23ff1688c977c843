use anyhow::{Context, Result};
use ext2fs::cli::{self, Usage};
use ext2fs::consts::SECTOR_SIZE;
use ext2fs::driver::file_drive::FileDrive;
use ext2fs::util::format::pretty_size_from_bytes;
use ext2fs::{FormatOptions, FS};

const USAGE: &str = "ext2_mkfs <image file name> [block count] [inode count] [block size]";

fn main() {
    cli::init_logging();
    cli::finish(run());
}

fn number<T: std::str::FromStr>(arg: Option<&Vec<u8>>, default: T) -> Result<T> {
    match arg {
        None => Ok(default),
        Some(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or_else(|| Usage(USAGE.to_owned()).into()),
    }
}

fn run() -> Result<()> {
    let args = cli::args();
    if args.is_empty() || args.len() > 4 {
        return Err(Usage(USAGE.to_owned()).into());
    }
    let defaults = FormatOptions::default();
    let options = FormatOptions {
        block_count: number(args.get(1), defaults.block_count)?,
        inode_count: number(args.get(2), defaults.inode_count)?,
        block_size: number(args.get(3), defaults.block_size)?,
    };

    let path = cli::host_path(&args[0]);
    let drive = FileDrive::create(path, options.image_size(), SECTOR_SIZE)
        .with_context(|| format!("cannot create {}", path.display()))?;
    let fs = FS::format(drive, &options)?;
    let superblock = fs.image().superblock();
    println!(
        "{}: {} blocks of {} bytes ({}), {} inodes, {} blocks and {} inodes free",
        path.display(),
        options.block_count,
        options.block_size,
        pretty_size_from_bytes(options.image_size()),
        options.inode_count,
        superblock.free_blocks_count,
        superblock.free_inodes_count,
    );
    Ok(())
}
