//! Metadata engine for single-group ext2 images: allocation bitmaps, the
//! inode table, directory records, path resolution, the user-facing
//! operations built on them, and a consistency checker.

pub mod checker;
pub mod cli;
pub mod consts;
pub mod driver;
pub mod fs;
pub mod fuse;
mod io;
pub mod ops;
pub mod path;
pub mod structure;
pub mod util;

pub use fs::{format_image, FormatOptions, FS};
pub use structure::Image;
pub use util::error::{Error, Result};
