use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::driver::DeviceDriver;
use crate::util::error::{Error, Result};

/// An image file accessed with positional reads and writes.
pub struct FileDrive {
    file: File,
    bytes: u64,
    sector_size: usize,
}

impl FileDrive {
    /// Creates a new zero-filled image file; fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>, bytes: u64, sector_size: usize) -> Result<FileDrive> {
        if bytes % sector_size as u64 != 0 {
            return Err(Error::Format(format!(
                "image size {} is not a multiple of the sector size {}",
                bytes, sector_size
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(bytes)?;
        Ok(FileDrive { file, bytes, sector_size })
    }

    pub fn open(path: impl AsRef<Path>, sector_size: usize) -> Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let bytes = file.metadata()?.len();
        if bytes % sector_size as u64 != 0 {
            return Err(Error::Format(format!(
                "image size {} is not a multiple of the sector size {}",
                bytes, sector_size
            )));
        }
        Ok(FileDrive { file, bytes, sector_size })
    }
}

impl DeviceDriver for FileDrive {
    fn get_sector_count(&self) -> u64 {
        self.bytes / self.sector_size as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> Result<Vec<u8>> {
        let mut buffer = vec![0; self.sector_size];
        self.file.read_exact_at(&mut buffer, index * self.sector_size as u64)?;
        Ok(buffer)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> Result<()> {
        if data.len() != self.sector_size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("sector size mismatch - expected {}, got {}", self.sector_size, data.len()),
            )));
        }
        self.file.write_all_at(data, index * self.sector_size as u64)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");

        {
            let mut drive = FileDrive::create(&path, 1024 * 512, 512).unwrap();
            let sector0 = vec![0x42; 512];
            let sector1023 = vec![0x52; 512];
            drive.write_sector(0, &sector0).unwrap();
            drive.write_sector(1023, &sector1023).unwrap();
            drive.flush().unwrap();
        }

        let drive = FileDrive::open(&path, 512).unwrap();
        assert_eq!(drive.get_sector_count(), 1024);
        assert_eq!(drive.get_size(), 1024 * 512);
        assert_eq!(drive.read_sector(0).unwrap(), vec![0x42; 512]);
        assert_eq!(drive.read_sector(1023).unwrap(), vec![0x52; 512]);
        assert_eq!(drive.read_sector(511).unwrap(), vec![0; 512]);
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        FileDrive::create(&path, 4096, 512).unwrap();
        assert!(matches!(FileDrive::create(&path, 4096, 512), Err(Error::Io(_))));
    }

    #[test]
    fn rejects_wrong_sector_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut drive = FileDrive::create(dir.path().join("drive.img"), 4096, 512).unwrap();
        assert!(drive.write_sector(0, &[1, 2, 3]).is_err());
    }
}
