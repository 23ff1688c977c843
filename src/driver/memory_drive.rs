use crate::driver::DeviceDriver;
use crate::util::error::{Error, Result};

/// A device held entirely in memory. Used for tests and for formatting
/// images before they are written out.
#[derive(Debug, Clone)]
pub struct MemoryDrive {
    data: Vec<u8>,
    sector_size: usize,
}

impl MemoryDrive {
    pub fn new(bytes: usize, sector_size: usize) -> MemoryDrive {
        MemoryDrive { data: vec![0; bytes], sector_size }
    }

    pub fn from_bytes(data: Vec<u8>, sector_size: usize) -> MemoryDrive {
        MemoryDrive { data, sector_size }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl DeviceDriver for MemoryDrive {
    fn get_sector_count(&self) -> u64 {
        (self.data.len() / self.sector_size) as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> Result<Vec<u8>> {
        let start = index as usize * self.sector_size;
        self.data
            .get(start..start + self.sector_size)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| sector_out_of_range(index))
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> Result<()> {
        let start = index as usize * self.sector_size;
        let sector = self
            .data
            .get_mut(start..start + data.len())
            .ok_or_else(|| sector_out_of_range(index))?;
        sector.copy_from_slice(data);
        Ok(())
    }
}

fn sector_out_of_range(index: u64) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("sector {} is past the end of the drive", index),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write() {
        let mut drive = MemoryDrive::new(4 * 512, 512);
        drive.write_sector(2, &[7; 512]).unwrap();
        assert_eq!(drive.read_sector(2).unwrap(), vec![7; 512]);
        assert_eq!(drive.read_sector(1).unwrap(), vec![0; 512]);
        assert!(drive.read_sector(4).is_err());
        assert_eq!(drive.get_size(), 2048);
    }
}
