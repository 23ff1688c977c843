use anyhow::Result;
use ext2fs::cli::{self, Usage};

fn main() {
    cli::init_logging();
    cli::finish(run());
}

fn run() -> Result<()> {
    let args = cli::args();
    let [image, path] = args.as_slice() else {
        return Err(Usage("ext2_restore <image file name> <absolute path>".to_owned()).into());
    };
    cli::with_image(cli::host_path(image), |image| ext2fs::ops::undelete(image, path))?;
    Ok(())
}
