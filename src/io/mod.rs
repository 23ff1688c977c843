use tracing::debug;

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::util::error::{Error, Result};
use raw::{raw_read_block, raw_write_block};

mod raw;

/// Moves whole images between a device and memory, and writes individual
/// blocks back once the image has been modified.
pub(crate) struct IO<A: DeviceDriver> {
    pub(crate) device: A,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A) -> IO<A> {
        IO { device }
    }

    /// Reads every sector of the device into one contiguous buffer.
    pub(crate) fn read_image(&self) -> Result<Vec<u8>> {
        let sector_size = self.device.get_sector_size();
        let sectors = self.device.get_sector_count();
        let mut image = Vec::with_capacity(sectors as usize * sector_size);
        for sector in 0..sectors {
            image.append(&mut self.read_block(sector_size, sector as BlockPointer)?);
        }
        Ok(image)
    }

    pub(crate) fn read_block(&self, block_size: usize, index: BlockPointer) -> Result<Vec<u8>> {
        self.check_geometry(block_size, index)?;
        raw_read_block(&self.device, block_size, index)
    }

    pub(crate) fn write_block(&mut self, block_size: usize, index: BlockPointer, block: &[u8]) -> Result<()> {
        if block.len() != block_size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("block size mismatch - expected {}, got {}", block_size, block.len()),
            )));
        }
        self.check_geometry(block_size, index)?;
        debug!(block = index, "writing block");
        raw_write_block(&mut self.device, block_size, block, index)
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.device.flush()
    }

    fn check_geometry(&self, block_size: usize, index: BlockPointer) -> Result<()> {
        let sector_size = self.device.get_sector_size();
        if block_size < sector_size || block_size % sector_size != 0 {
            return Err(Error::Format(format!(
                "block size {} is not a multiple of the sector size {}",
                block_size, sector_size
            )));
        }
        let block_count = self.device.get_size() / block_size as u64;
        if index as u64 >= block_count {
            return Err(Error::BlockOutOfRange { block: index, count: block_count as u32 });
        }
        Ok(())
    }
}
