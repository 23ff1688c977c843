use crate::consts::InodePointer;
use crate::structure::directory::Directory;
use crate::structure::Image;
use crate::util::error::Result;

pub const SEPARATOR: u8 = b'/';

/// Splits `path` into its parent and final component after dropping
/// trailing separators. A path without a separator has an empty parent.
///
/// `split(b"/a/b/")` is `(b"/a", b"b")`; `split(b"/a")` is `(b"", b"a")`.
pub fn split(path: &[u8]) -> (&[u8], &[u8]) {
    let end = path.iter().rposition(|byte| *byte != SEPARATOR).map_or(0, |last| last + 1);
    let trimmed = &path[..end];
    match trimmed.iter().rposition(|byte| *byte == SEPARATOR) {
        Some(index) => (&trimmed[..index], &trimmed[index + 1..]),
        None => (&trimmed[..0], trimmed),
    }
}

pub fn components(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|byte| *byte == SEPARATOR).filter(|component| !component.is_empty())
}

pub fn is_absolute(path: &[u8]) -> bool {
    path.first() == Some(&SEPARATOR)
}

/// Walks `path` one component at a time from `start`.
///
/// Returns `None` when a component is missing, or when a component other
/// than the last names something that is not a directory. An empty path
/// resolves to `start`.
pub fn resolve(image: &Image, start: InodePointer, path: &[u8]) -> Result<Option<InodePointer>> {
    let mut current = start;
    for component in components(path) {
        if !image.read_inode(current)?.is_directory() {
            return Ok(None);
        }
        let directory = Directory::open(image, current)?;
        match directory.find(image, component)? {
            Some(entry) => current = entry.inode,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ROOT_INODE;
    use crate::fs::{format_image, FormatOptions};
    use crate::util::mode::FileType;

    #[test]
    fn split_paths() {
        assert_eq!(split(b"/a/b/c"), (&b"/a/b"[..], &b"c"[..]));
        assert_eq!(split(b"/a/b/c///"), (&b"/a/b"[..], &b"c"[..]));
        assert_eq!(split(b"/a"), (&b""[..], &b"a"[..]));
        assert_eq!(split(b"a"), (&b""[..], &b"a"[..]));
        assert_eq!(split(b"/"), (&b""[..], &b""[..]));
        assert_eq!(split(b""), (&b""[..], &b""[..]));
    }

    #[test]
    fn resolve_root_and_children() {
        let image = format_image(&FormatOptions::default()).unwrap();
        assert_eq!(resolve(&image, ROOT_INODE, b"/").unwrap(), Some(ROOT_INODE));
        assert_eq!(resolve(&image, ROOT_INODE, b"").unwrap(), Some(ROOT_INODE));
        assert_eq!(resolve(&image, ROOT_INODE, b"/lost+found").unwrap(), Some(11));
        assert_eq!(resolve(&image, ROOT_INODE, b"//lost+found/").unwrap(), Some(11));
        assert_eq!(resolve(&image, ROOT_INODE, b"/lost+found/..").unwrap(), Some(ROOT_INODE));
        assert_eq!(resolve(&image, ROOT_INODE, b"/missing").unwrap(), None);
        assert_eq!(resolve(&image, 11, b"..").unwrap(), Some(ROOT_INODE));
    }

    #[test]
    fn resolve_through_file_is_not_found() {
        let mut image = format_image(&FormatOptions::default()).unwrap();
        let number = image.allocate_inode().unwrap();
        image.initialize_inode(number, FileType::RegularFile).unwrap();
        let mut root = Directory::open(&image, ROOT_INODE).unwrap();
        root.insert(&mut image, number, b"file", FileType::RegularFile).unwrap();

        assert_eq!(resolve(&image, ROOT_INODE, b"/file").unwrap(), Some(number));
        assert_eq!(resolve(&image, ROOT_INODE, b"/file/").unwrap(), Some(number));
        assert_eq!(resolve(&image, ROOT_INODE, b"/file/more").unwrap(), None);
    }

    #[test]
    fn resolve_searches_every_block() {
        let mut image = format_image(&FormatOptions::default()).unwrap();
        let mut root = Directory::open(&image, ROOT_INODE).unwrap();
        let long = "z".repeat(200);
        for i in 0..30 {
            let name = format!("{}{:02}", long, i).into_bytes();
            root.insert(&mut image, 11, &name, FileType::Directory).unwrap();
        }
        assert!(root.blocks(&image).unwrap().len() > 5);
        let last = format!("/{}29", long).into_bytes();
        assert_eq!(resolve(&image, ROOT_INODE, &last).unwrap(), Some(11));
        let absent = format!("/{}30", long).into_bytes();
        assert_eq!(resolve(&image, ROOT_INODE, &absent).unwrap(), None);
    }
}
