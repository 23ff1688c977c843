pub mod file_drive;
pub mod memory_drive;

use crate::util::error::Result;

/// A sector-addressed backing store for a filesystem image.
pub trait DeviceDriver {
    fn get_sector_count(&self) -> u64;
    fn get_sector_size(&self) -> usize;
    fn read_sector(&self, index: u64) -> Result<Vec<u8>>;
    fn write_sector(&mut self, index: u64, data: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn get_size(&self) -> u64 {
        self.get_sector_count() * self.get_sector_size() as u64
    }
}
