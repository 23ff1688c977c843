use ext2fs::consts::ROOT_INODE;
use ext2fs::driver::memory_drive::MemoryDrive;
use ext2fs::ops::{self, file};
use ext2fs::path::resolve;
use ext2fs::structure::blockmap::BlockMap;
use ext2fs::structure::Image;
use ext2fs::{Error, FormatOptions, FS};

fn fresh() -> FS<MemoryDrive> {
    FS::format(MemoryDrive::new(128 * 1024, 512), &FormatOptions::default()).unwrap()
}

fn remount(mut fs: FS<MemoryDrive>) -> FS<MemoryDrive> {
    fs.sync().unwrap();
    FS::mount(fs.into_device()).unwrap()
}

fn contents(image: &Image, path: &[u8]) -> Vec<u8> {
    let number = resolve(image, ROOT_INODE, path).unwrap().unwrap();
    let inode = image.read_inode(number).unwrap();
    file::read(image, &inode, 0, inode.size as usize).unwrap()
}

fn bitmaps(image: &Image) -> (Vec<u8>, Vec<u8>) {
    let group = image.group().unwrap();
    (
        image.block(group.block_bitmap).unwrap().to_vec(),
        image.block(group.inode_bitmap).unwrap().to_vec(),
    )
}

#[test]
fn session_survives_remount() {
    let mut fs = fresh();
    let body: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 256) as u8).collect();
    {
        let image = fs.image_mut();
        ops::mkdir(image, b"/a").unwrap();
        ops::copy_in(image, &body, b"/home/user/body.bin", b"/a/").unwrap();
        ops::link(image, b"/a/body.bin", b"/alias").unwrap();
        ops::symlink(image, b"/a/body.bin", b"/a/shortcut").unwrap();
    }

    let fs = remount(fs);
    let image = fs.image();
    assert_eq!(contents(image, b"/a/body.bin"), body);
    assert_eq!(contents(image, b"/alias"), body);
    let body_inode = resolve(image, ROOT_INODE, b"/alias").unwrap().unwrap();
    assert_eq!(image.read_inode(body_inode).unwrap().links_count, 2);

    let shortcut = resolve(image, ROOT_INODE, b"/a/shortcut").unwrap().unwrap();
    let inode = image.read_inode(shortcut).unwrap();
    assert_eq!(file::read_link(image, &inode).unwrap(), b"/a/body.bin".to_vec());
    assert_eq!(image.read_inode(ROOT_INODE).unwrap().links_count, 4);
}

#[test]
fn delete_and_restore_round_trip() {
    let mut fs = fresh();
    let image = fs.image_mut();
    ops::mkdir(image, b"/d").unwrap();
    ops::copy_in(image, b"first", b"one", b"/d/one").unwrap();
    let two = vec![2u8; 2500];
    let number = ops::copy_in(image, &two, b"two", b"/d/two").unwrap();
    ops::copy_in(image, b"third", b"three", b"/d/three").unwrap();
    let before = image.superblock();
    let snapshot = bitmaps(image);

    assert_eq!(ops::remove(image, b"/d/two").unwrap(), number);
    let removed = image.superblock();
    assert_eq!(removed.free_blocks_count, before.free_blocks_count + 3);
    assert_eq!(removed.free_inodes_count, before.free_inodes_count + 1);
    assert!(image.read_inode(number).unwrap().dtime != 0);
    assert!(resolve(image, ROOT_INODE, b"/d/two").unwrap().is_none());
    assert_eq!(contents(image, b"/d/three"), b"third".to_vec());

    assert_eq!(ops::undelete(image, b"/d/two").unwrap(), number);
    let restored = image.superblock();
    assert_eq!(restored.free_blocks_count, before.free_blocks_count);
    assert_eq!(restored.free_inodes_count, before.free_inodes_count);
    assert_eq!(bitmaps(image), snapshot);
    let inode = image.read_inode(number).unwrap();
    assert_eq!(inode.dtime, 0);
    assert_eq!(inode.links_count, 1);
    assert_eq!(contents(image, b"/d/two"), two);
    assert_eq!(contents(image, b"/d/one"), b"first".to_vec());

    ops::copy_in(image, b"fourth", b"four", b"/d/four").unwrap();
    assert_eq!(contents(image, b"/d/two"), two);
    let report = ext2fs::checker::check_and_repair(image).unwrap();
    assert_eq!(report.total(), 0);
}

#[test]
fn restore_refuses_reused_inode() {
    let mut fs = fresh();
    let image = fs.image_mut();
    ops::copy_in(image, b"old", b"x", b"/x").unwrap();
    let number = ops::copy_in(image, b"victim", b"y", b"/victim").unwrap();
    ops::copy_in(image, b"after", b"z", b"/after").unwrap();
    ops::remove(image, b"/victim").unwrap();
    assert_eq!(ops::copy_in(image, b"new", b"z", b"/newcomer").unwrap(), number);

    let error = ops::undelete(image, b"/victim").unwrap_err();
    assert!(matches!(error, Error::InodeInUse(inode) if inode == number));
    assert_eq!(error.to_errno(), libc::EBUSY);
}

#[test]
fn path_boundaries() {
    let mut fs = fresh();
    let image = fs.image_mut();

    for path in [&b"relative"[..], b"", b"/"] {
        assert!(matches!(ops::mkdir(image, path), Err(Error::InvalidPath(_))), "{:?}", path);
    }
    ops::copy_in(image, b"data", b"f", b"/file").unwrap();
    assert!(matches!(ops::mkdir(image, b"/file/inner"), Err(Error::InvalidPath(_))));
    assert!(matches!(ops::remove(image, b"/nothing/here"), Err(Error::InvalidPath(_))));

    let longest = [b'n'; 255];
    let mut path = b"/".to_vec();
    path.extend_from_slice(&longest);
    ops::mkdir(image, &path).unwrap();
    path.push(b'n');
    assert!(matches!(ops::mkdir(image, &path), Err(Error::NameTooLong { len: 256, .. })));

    ops::mkdir(image, b"/trailing/").unwrap();
    assert!(resolve(image, ROOT_INODE, b"/trailing").unwrap().is_some());
}

#[test]
fn errors_leave_counters_consistent() {
    let mut fs = fresh();
    let image = fs.image_mut();
    let mut created = 0;
    loop {
        match ops::mkdir(image, format!("/dir{}", created).as_bytes()) {
            Ok(_) => created += 1,
            Err(Error::NoSpace) => break,
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert_eq!(created, 21);

    let blocks = BlockMap::blocks(image).unwrap();
    let inodes = BlockMap::inodes(image).unwrap();
    let superblock = image.superblock();
    assert_eq!(superblock.free_blocks_count, blocks.capacity() - blocks.count_used(image).unwrap());
    assert_eq!(superblock.free_inodes_count, inodes.capacity() - inodes.count_used(image).unwrap());
    assert_eq!(superblock.free_inodes_count, 0);
}
