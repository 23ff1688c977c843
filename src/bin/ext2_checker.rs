use anyhow::Result;
use ext2fs::cli::{self, Usage};

fn main() {
    cli::init_logging();
    cli::finish(run());
}

fn run() -> Result<()> {
    let args = cli::args();
    let [image] = args.as_slice() else {
        return Err(Usage("ext2_checker <image file name>".to_owned()).into());
    };
    let report = cli::with_image(cli::host_path(image), ext2fs::checker::check_and_repair)?;
    println!("{}", report);
    Ok(())
}
