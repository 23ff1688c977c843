/// An on-disk structure decoded from, and patched back into, a byte region.
///
/// `write_bytes` only touches the fields the type models, so bytes belonging
/// to fields this crate does not understand survive a read-modify-write cycle.
pub trait ByteSerializable: Sized {
    fn from_bytes(bytes: &[u8]) -> Self;
    fn write_bytes(&self, bytes: &mut [u8]);
}

pub trait KnownSize: ByteSerializable {
    fn size_on_disk() -> usize;
}

#[inline]
pub(crate) fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

#[inline]
pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
pub(crate) fn write_u8(bytes: &mut [u8], offset: usize, value: u8) {
    bytes[offset] = value;
}

#[inline]
pub(crate) fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
