//! 宿主侧的文件系统装配：
//! 把一个宿主文件当作扇区设备（[`SectorFile`]），
//! 供磁盘镜像工具与测试驱动整个文件系统。

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::BlockDevice;
use sector_fs::SECTOR_SIZE;

/// 文件承载的扇区设备
pub struct SectorFile(pub Mutex<File>);

impl BlockDevice for SectorFile {
    fn read_sector(&self, sector_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.read(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }

    fn write_sector(&self, sector_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.write(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }
}
