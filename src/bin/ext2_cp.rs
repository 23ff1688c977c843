use anyhow::{Context, Result};
use ext2fs::cli::{self, Usage};

fn main() {
    cli::init_logging();
    cli::finish(run());
}

fn run() -> Result<()> {
    let args = cli::args();
    let [image, source, destination] = args.as_slice() else {
        return Err(Usage("ext2_cp <image file name> <path to source file> <path to dest>".to_owned()).into());
    };
    let source_path = cli::host_path(source);
    let data = std::fs::read(source_path).with_context(|| format!("cannot read {}", source_path.display()))?;
    cli::with_image(cli::host_path(image), |image| ext2fs::ops::copy_in(image, &data, source, destination))?;
    Ok(())
}
