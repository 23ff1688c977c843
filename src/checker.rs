//! Consistency checking and in-place repair.
//!
//! Two passes run in order. The first reconciles the free counters of the
//! superblock and the group descriptor against the bitmaps. The second walks
//! the directory tree from the root and fixes entry type tags, deletion
//! times and bitmap bits of everything it reaches. Every inconsistency found
//! is repaired; nothing is only reported.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use crate::consts::{BlockPointer, InodePointer, PARENT_NAME, ROOT_INODE, SELF_NAME};
use crate::structure::blockmap::{BlockMap, Resource};
use crate::structure::directory::{DirBlock, Directory};
use crate::structure::Image;
use crate::util::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterLocation {
    Superblock,
    BlockGroup,
}

impl fmt::Display for CounterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterLocation::Superblock => write!(f, "superblock"),
            CounterLocation::BlockGroup => write!(f, "block group"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    FreeCounter { location: CounterLocation, resource: Resource, off_by: u32 },
    EntryType { inode: InodePointer },
    InodeBitmap { inode: InodePointer },
    DeletionTime { inode: InodePointer },
    BlockBitmap { inode: InodePointer, blocks: u32 },
}

impl Repair {
    /// How many inconsistencies this repair accounts for.
    pub fn count(&self) -> u32 {
        match self {
            Repair::BlockBitmap { blocks, .. } => *blocks,
            _ => 1,
        }
    }
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::FreeCounter { location, resource, off_by } => {
                let counter = match resource {
                    Resource::Block => "free blocks",
                    Resource::Inode => "free inodes",
                };
                write!(f, "Fixed: {}'s {} counter was off by {} compared to the bitmap", location, counter, off_by)
            }
            Repair::EntryType { inode } => write!(f, "Fixed: Entry type vs inode mismatch: inode [{}]", inode),
            Repair::InodeBitmap { inode } => write!(f, "Fixed: inode [{}] not marked as in-use", inode),
            Repair::DeletionTime { inode } => write!(f, "Fixed: valid inode marked for deletion: [{}]", inode),
            Repair::BlockBitmap { inode, blocks } => write!(
                f,
                "Fixed: {} in-use data blocks not marked in data bitmap for inode: [{}]",
                blocks, inode
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub repairs: Vec<Repair>,
}

impl Report {
    pub fn total(&self) -> u32 {
        self.repairs.iter().map(Repair::count).sum()
    }

    fn record(&mut self, repair: Repair) {
        debug!(%repair, "repaired");
        self.repairs.push(repair);
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for repair in &self.repairs {
            writeln!(f, "{}", repair)?;
        }
        write!(f, "{} file system inconsistencies repaired!", self.total())
    }
}

/// Runs both passes and returns what was repaired.
pub fn check_and_repair(image: &mut Image) -> Result<Report> {
    let mut report = Report::default();
    reconcile_counters(image, &mut report)?;

    let mut visited = HashSet::from([ROOT_INODE]);
    check_inode(image, ROOT_INODE, &mut report)?;
    walk(image, ROOT_INODE, &mut visited, &mut report)?;
    Ok(report)
}

fn reconcile_counters(image: &mut Image, report: &mut Report) -> Result<()> {
    let blocks = BlockMap::blocks(image)?;
    let inodes = BlockMap::inodes(image)?;
    let free_blocks = blocks.capacity() - blocks.count_used(image)?;
    let free_inodes = inodes.capacity() - inodes.count_used(image)?;

    let mut superblock = image.superblock();
    let mut group = image.group()?;

    if superblock.free_blocks_count != free_blocks {
        report.record(Repair::FreeCounter {
            location: CounterLocation::Superblock,
            resource: Resource::Block,
            off_by: superblock.free_blocks_count.abs_diff(free_blocks),
        });
        superblock.free_blocks_count = free_blocks;
    }
    if group.free_blocks_count as u32 != free_blocks {
        report.record(Repair::FreeCounter {
            location: CounterLocation::BlockGroup,
            resource: Resource::Block,
            off_by: (group.free_blocks_count as u32).abs_diff(free_blocks),
        });
        group.free_blocks_count = free_blocks as u16;
    }
    if superblock.free_inodes_count != free_inodes {
        report.record(Repair::FreeCounter {
            location: CounterLocation::Superblock,
            resource: Resource::Inode,
            off_by: superblock.free_inodes_count.abs_diff(free_inodes),
        });
        superblock.free_inodes_count = free_inodes;
    }
    if group.free_inodes_count as u32 != free_inodes {
        report.record(Repair::FreeCounter {
            location: CounterLocation::BlockGroup,
            resource: Resource::Inode,
            off_by: (group.free_inodes_count as u32).abs_diff(free_inodes),
        });
        group.free_inodes_count = free_inodes as u16;
    }

    image.set_superblock(&superblock);
    image.set_group(&group)
}

/// Fixes the deletion time and bitmap bits of one reachable inode.
fn check_inode(image: &mut Image, number: InodePointer, report: &mut Report) -> Result<()> {
    let mut inode = image.read_inode(number)?;

    if inode.dtime != 0 {
        inode.dtime = 0;
        image.write_inode(number, &inode)?;
        report.record(Repair::DeletionTime { inode: number });
    }

    let inodes = BlockMap::inodes(image)?;
    if !inodes.is_used(image, number)? {
        inodes.allocate(image, number)?;
        report.record(Repair::InodeBitmap { inode: number });
    }

    let referenced = match inode.all_blocks(image) {
        Ok(referenced) => referenced,
        Err(error) => {
            warn!(inode = number, %error, "skipping unreadable block list");
            return Ok(());
        }
    };
    let blocks = BlockMap::blocks(image)?;
    let mut unmarked = 0;
    for block in referenced {
        match blocks.is_used(image, block) {
            Ok(true) => {}
            Ok(false) => {
                blocks.allocate(image, block)?;
                unmarked += 1;
            }
            Err(error) => warn!(inode = number, block, %error, "skipping invalid block pointer"),
        }
    }
    if unmarked > 0 {
        report.record(Repair::BlockBitmap { inode: number, blocks: unmarked });
    }
    Ok(())
}

fn walk(
    image: &mut Image,
    number: InodePointer,
    visited: &mut HashSet<InodePointer>,
    report: &mut Report,
) -> Result<()> {
    let directory = Directory::open(image, number)?;
    let blocks = match directory.blocks(image) {
        Ok(blocks) => blocks,
        Err(error) => {
            warn!(directory = number, %error, "skipping unreadable directory");
            return Ok(());
        }
    };

    for block in blocks {
        for child in check_block(image, number, block, report)? {
            if visited.insert(child) {
                walk(image, child, visited, report)?;
            }
        }
    }
    Ok(())
}

/// Checks every live entry of one directory block, `.` and `..` included,
/// and returns the subdirectories it names in on-disk order.
fn check_block(
    image: &mut Image,
    directory: InodePointer,
    block: BlockPointer,
    report: &mut Report,
) -> Result<Vec<InodePointer>> {
    let mut records = match DirBlock::read(image, block) {
        Ok(records) => records,
        Err(error) => {
            warn!(directory, block, %error, "skipping unreadable directory block");
            return Ok(Vec::new());
        }
    };

    let mut retagged = false;
    let mut children = Vec::new();
    for record in records.records.iter_mut() {
        if !record.is_live() {
            continue;
        }
        let inode = match image.read_inode(record.inode) {
            Ok(inode) => inode,
            Err(error) => {
                warn!(directory, block, %error, "skipping entry with invalid inode");
                continue;
            }
        };

        let tag = inode.file_type().tag();
        if record.file_type != tag {
            record.file_type = tag;
            retagged = true;
            report.record(Repair::EntryType { inode: record.inode });
        }

        check_inode(image, record.inode, report)?;
        if inode.is_directory() && record.name != SELF_NAME && record.name != PARENT_NAME {
            children.push(record.inode);
        }
    }

    if retagged {
        records.write(image, block)?;
    }
    Ok(children)
}
