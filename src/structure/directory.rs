use tracing::debug;

use crate::consts::{BlockPointer, InodePointer, DIR_ENTRY_HEADER_SIZE, MAX_NAME_LENGTH};
use crate::structure::blockmap::BlockMap;
use crate::structure::inode::{timestamp, Inode};
use crate::structure::Image;
use crate::util::error::{display_name, Error, Result};
use crate::util::mode::FileType;
use crate::util::serializable::{read_u16, read_u32, read_u8};

/// Smallest record length that can hold a name of `name_len` bytes.
pub fn packed_size(name_len: usize) -> usize {
    (DIR_ENTRY_HEADER_SIZE + name_len + 3) & !3
}

/// One directory record, including the bytes that follow its name up to
/// `rec_len`. Those bytes are kept verbatim, so any entry that was merged
/// into this one on removal survives a parse/serialize cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    pub inode: InodePointer,
    pub rec_len: usize,
    pub file_type: u8,
    pub name: Vec<u8>,
    tail: Vec<u8>,
}

impl DirRecord {
    pub fn new(inode: InodePointer, name: &[u8], file_type: FileType, rec_len: usize) -> DirRecord {
        DirRecord {
            inode,
            rec_len,
            file_type: file_type.tag(),
            name: name.to_vec(),
            tail: vec![0; rec_len - DIR_ENTRY_HEADER_SIZE - name.len()],
        }
    }

    /// Decodes the record at the start of `region` using its own length field.
    fn decode(region: &[u8]) -> Option<DirRecord> {
        if region.len() < DIR_ENTRY_HEADER_SIZE {
            return None;
        }
        let rec_len = read_u16(region, 4) as usize;
        let name_len = read_u8(region, 6) as usize;
        if rec_len < DIR_ENTRY_HEADER_SIZE
            || rec_len % 4 != 0
            || rec_len > region.len()
            || DIR_ENTRY_HEADER_SIZE + name_len > rec_len
        {
            return None;
        }
        Some(DirRecord::from_region(&region[..rec_len]))
    }

    /// Decodes a record left behind in slack. Its length field may reach past
    /// `region` once an enclosing record has been split, so it is clamped.
    fn decode_hidden(region: &[u8]) -> Option<DirRecord> {
        if region.len() < DIR_ENTRY_HEADER_SIZE {
            return None;
        }
        let rec_len = read_u16(region, 4) as usize;
        let name_len = read_u8(region, 6) as usize;
        let min = packed_size(name_len);
        if name_len == 0 || rec_len % 4 != 0 || rec_len < min || min > region.len() {
            return None;
        }
        Some(DirRecord::from_region(&region[..rec_len.min(region.len())]))
    }

    /// Builds a record spanning all of `region`, whatever its length field says.
    fn from_region(region: &[u8]) -> DirRecord {
        let name_end = DIR_ENTRY_HEADER_SIZE + read_u8(region, 6) as usize;
        DirRecord {
            inode: read_u32(region, 0),
            rec_len: region.len(),
            file_type: read_u8(region, 7),
            name: region[DIR_ENTRY_HEADER_SIZE..name_end].to_vec(),
            tail: region[name_end..].to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.rec_len);
        bytes.extend_from_slice(&self.inode.to_le_bytes());
        bytes.extend_from_slice(&(self.rec_len as u16).to_le_bytes());
        bytes.push(self.name.len() as u8);
        bytes.push(self.file_type);
        bytes.extend_from_slice(&self.name);
        bytes.extend_from_slice(&self.tail);
        bytes
    }

    pub fn min_size(&self) -> usize {
        packed_size(self.name.len())
    }

    pub fn slack(&self) -> usize {
        self.rec_len.saturating_sub(self.min_size())
    }

    pub fn is_live(&self) -> bool {
        self.inode != 0
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_tag(self.file_type)
    }

    /// Records still readable in this record's slack, with their offsets
    /// from the start of this record. Records nested in the slack of a
    /// hidden record are included.
    pub fn hidden_records(&self) -> Vec<(usize, DirRecord)> {
        let bytes = self.encode();
        let mut found = Vec::new();
        let mut regions = vec![(self.min_size(), bytes.len())];
        while let Some((mut offset, end)) = regions.pop() {
            while offset < end {
                let record = match DirRecord::decode_hidden(&bytes[offset..end]) {
                    Some(record) => record,
                    None => break,
                };
                regions.push((offset + record.min_size(), offset + record.rec_len));
                let next = offset + record.rec_len;
                found.push((offset, record));
                offset = next;
            }
        }
        found.sort_by_key(|(offset, _)| *offset);
        found
    }

    fn truncate(&mut self, rec_len: usize) {
        self.tail.truncate(rec_len - DIR_ENTRY_HEADER_SIZE - self.name.len());
        self.rec_len = rec_len;
    }

    /// Cuts the record at `at`, returning the record that starts there and
    /// runs to the end of the original.
    fn split_off(&mut self, at: usize) -> DirRecord {
        let bytes = self.encode();
        let rest = DirRecord::from_region(&bytes[at..]);
        self.truncate(at);
        rest
    }

    fn absorb(&mut self, removed: DirRecord) {
        self.rec_len += removed.rec_len;
        self.tail.extend_from_slice(&removed.encode());
    }
}

/// A directory data block as the ordered chain of its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirBlock {
    pub records: Vec<DirRecord>,
}

impl DirBlock {
    pub fn parse(bytes: &[u8], block: BlockPointer) -> Result<DirBlock> {
        let mut records = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let record = DirRecord::decode(&bytes[offset..]).ok_or_else(|| {
                Error::corruption(block, format!("invalid directory record at offset {}", offset))
            })?;
            offset += record.rec_len;
            records.push(record);
        }
        Ok(DirBlock { records })
    }

    pub fn serialize(&self, block_size: usize, block: BlockPointer) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(block_size);
        for record in &self.records {
            let encoded = record.encode();
            if encoded.len() != record.rec_len {
                return Err(Error::corruption(block, "record length does not match its contents"));
            }
            bytes.extend_from_slice(&encoded);
        }
        if bytes.len() != block_size {
            return Err(Error::corruption(
                block,
                format!("record lengths sum to {} in a {} byte block", bytes.len(), block_size),
            ));
        }
        Ok(bytes)
    }

    pub fn read(image: &Image, block: BlockPointer) -> Result<DirBlock> {
        DirBlock::parse(image.block(block)?, block)
    }

    pub fn write(&self, image: &mut Image, block: BlockPointer) -> Result<()> {
        let bytes = self.serialize(image.block_size(), block)?;
        image.block_mut(block)?.copy_from_slice(&bytes);
        Ok(())
    }

    /// Index of the first record at or after `start` whose slack is at
    /// least `min_extra` bytes.
    pub fn find_oversized(&self, min_extra: usize, start: usize) -> Option<usize> {
        (start..self.records.len()).find(|index| self.records[*index].slack() >= min_extra)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: InodePointer,
    pub file_type: FileType,
    pub name: Vec<u8>,
}

struct Located {
    block: BlockPointer,
    records: DirBlock,
    index: usize,
}

/// A directory inode together with the record operations performed on it.
#[derive(Debug, Clone)]
pub struct Directory {
    pub number: InodePointer,
    pub inode: Inode,
}

impl Directory {
    pub fn open(image: &Image, number: InodePointer) -> Result<Directory> {
        let inode = image.read_inode(number)?;
        if !inode.is_directory() {
            return Err(Error::NotDirectory(format!("inode {}", number)));
        }
        Ok(Directory { number, inode })
    }

    pub fn blocks(&self, image: &Image) -> Result<Vec<BlockPointer>> {
        self.inode.data_blocks(image)
    }

    /// Live entries of every block, in on-disk order.
    pub fn entries(&self, image: &Image) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for block in self.blocks(image)? {
            for record in DirBlock::read(image, block)?.records {
                if record.is_live() {
                    entries.push(DirEntry {
                        inode: record.inode,
                        file_type: record.file_type(),
                        name: record.name,
                    });
                }
            }
        }
        Ok(entries)
    }

    fn locate(&self, image: &Image, name: &[u8]) -> Result<Option<Located>> {
        for block in self.blocks(image)? {
            let records = DirBlock::read(image, block)?;
            if let Some(index) = records
                .records
                .iter()
                .position(|record| record.is_live() && record.name == name)
            {
                return Ok(Some(Located { block, records, index }));
            }
        }
        Ok(None)
    }

    /// The first live entry named exactly `name`.
    pub fn find(&self, image: &Image, name: &[u8]) -> Result<Option<DirEntry>> {
        Ok(self.locate(image, name)?.map(|located| {
            let record = &located.records.records[located.index];
            DirEntry { inode: record.inode, file_type: record.file_type(), name: record.name.clone() }
        }))
    }

    /// Adds an entry after the last record of the last block, or as the sole
    /// record of a newly allocated block when the last record's slack is too
    /// small.
    pub fn insert(&mut self, image: &mut Image, target: InodePointer, name: &[u8], file_type: FileType) -> Result<()> {
        check_name(name)?;
        let needed = packed_size(name.len());

        if let Some(&last) = self.blocks(image)?.last() {
            let mut records = DirBlock::read(image, last)?;
            if let Some(tail) = records.records.last_mut() {
                if tail.slack() >= needed {
                    let at = tail.min_size();
                    let remainder = tail.rec_len - at;
                    tail.truncate(at);
                    records.records.push(DirRecord::new(target, name, file_type, remainder));
                    records.write(image, last)?;
                    debug!(directory = self.number, target, name = %display_name(name), block = last, "inserted entry");
                    return Ok(());
                }
            }
        }

        let block = self.inode.push_block(image)?;
        self.inode.size += image.block_size() as u32;
        DirBlock { records: vec![DirRecord::new(target, name, file_type, image.block_size())] }
            .write(image, block)?;
        image.write_inode(self.number, &self.inode)?;
        debug!(directory = self.number, target, name = %display_name(name), block, "inserted entry in new block");
        Ok(())
    }

    /// Unlinks a single-link, non-directory entry and frees its inode and
    /// blocks. Returns the freed inode number.
    ///
    /// The first record of a block is tombstoned by zeroing its inode;
    /// any other record is merged into its predecessor, leaving its bytes in
    /// the predecessor's slack where [`Directory::restore`] can find them.
    pub fn remove(&mut self, image: &mut Image, name: &[u8]) -> Result<InodePointer> {
        let Located { block, mut records, index } = self
            .locate(image, name)?
            .ok_or_else(|| Error::NotFound(display_name(name)))?;

        let target = records.records[index].inode;
        let mut inode = image.read_inode(target)?;
        if records.records[index].file_type() == FileType::Directory || inode.is_directory() {
            return Err(Error::IsDirectory(display_name(name)));
        }
        if inode.links_count > 1 {
            return Err(Error::MultiLinked { name: display_name(name), links: inode.links_count });
        }

        if index == 0 {
            records.records[0].inode = 0;
        } else {
            let removed = records.records.remove(index);
            records.records[index - 1].absorb(removed);
        }
        records.write(image, block)?;

        inode.dtime = timestamp();
        inode.release_blocks(image)?;
        inode.links_count = inode.links_count.saturating_sub(1);
        image.write_inode(target, &inode)?;
        image.release_inode(target)?;

        debug!(directory = self.number, target, name = %display_name(name), block, "removed entry");
        Ok(target)
    }

    /// Brings back an entry removed by [`Directory::remove`] if its inode
    /// and blocks have not been reused since. Returns the restored inode.
    pub fn restore(&mut self, image: &mut Image, name: &[u8]) -> Result<InodePointer> {
        check_name(name)?;
        if self.locate(image, name)?.is_some() {
            return Err(Error::Exists(display_name(name)));
        }

        for block in self.blocks(image)? {
            let mut records = DirBlock::read(image, block)?;
            let mut start = 0;
            while let Some(index) = records.find_oversized(packed_size(name.len()), start) {
                let hidden = records.records[index]
                    .hidden_records()
                    .into_iter()
                    .find(|(_, record)| {
                        record.name == name && record.is_live() && record.inode <= image.inode_count()
                    });
                if let Some((offset, record)) = hidden {
                    self.revive(image, record.inode)?;
                    let restored = records.records[index].split_off(offset);
                    records.records.insert(index + 1, restored);
                    records.write(image, block)?;
                    debug!(directory = self.number, target = record.inode, name = %display_name(name), block, "restored entry");
                    return Ok(record.inode);
                }
                start = index + 1;
            }
        }
        Err(Error::NotFound(display_name(name)))
    }

    /// Re-marks a deleted inode and all of its blocks as in use.
    fn revive(&self, image: &mut Image, target: InodePointer) -> Result<()> {
        let inode_map = BlockMap::inodes(image)?;
        let block_map = BlockMap::blocks(image)?;
        if inode_map.is_used(image, target)? {
            return Err(Error::InodeInUse(target));
        }
        let mut inode = image.read_inode(target)?;
        let blocks = inode.all_blocks(image)?;
        for block in &blocks {
            if block_map.is_used(image, *block)? {
                return Err(Error::BlockInUse(*block));
            }
        }

        inode_map.allocate(image, target)?;
        for block in blocks {
            block_map.allocate(image, block)?;
        }
        inode.links_count += 1;
        inode.dtime = 0;
        image.write_inode(target, &inode)
    }
}

pub(crate) fn check_name(name: &[u8]) -> Result<()> {
    if name.is_empty() || name.contains(&b'/') {
        return Err(Error::InvalidPath(display_name(name)));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::NameTooLong { len: name.len(), limit: MAX_NAME_LENGTH });
    }
    Ok(())
}
