use anyhow::Result;
use ext2fs::cli::{self, Usage};

fn main() {
    cli::init_logging();
    cli::finish(run());
}

fn run() -> Result<()> {
    let args = cli::args();
    let (image, symbolic, source, destination) = match args.as_slice() {
        [image, source, destination] => (image, false, source, destination),
        [image, flag, source, destination] if flag.as_slice() == b"-s" => (image, true, source, destination),
        _ => return Err(Usage("ext2_ln <image file name> [-s] <source path> <dest path>".to_owned()).into()),
    };
    cli::with_image(cli::host_path(image), |image| {
        if symbolic {
            ext2fs::ops::symlink(image, source, destination)
        } else {
            ext2fs::ops::link(image, source, destination)
        }
    })?;
    Ok(())
}
