//! 内存盘：以一段宿主内存模拟的扇区设备

use block_dev::BlockDevice;
use sector_fs::SECTOR_SIZE;
use spin::Mutex;

pub struct RamDisk {
    sectors: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(num_sectors: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![0; num_sectors * SECTOR_SIZE]),
        }
    }
}

impl BlockDevice for RamDisk {
    fn read_sector(&self, sector_id: usize, buf: &mut [u8]) {
        let sectors = self.sectors.lock();
        let start = sector_id * SECTOR_SIZE;
        buf.copy_from_slice(&sectors[start..start + SECTOR_SIZE]);
    }

    fn write_sector(&self, sector_id: usize, buf: &[u8]) {
        let mut sectors = self.sectors.lock();
        let start = sector_id * SECTOR_SIZE;
        sectors[start..start + SECTOR_SIZE].copy_from_slice(&buf[..SECTOR_SIZE]);
    }
}
