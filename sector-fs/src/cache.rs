//! # 扇区缓存层
//!
//! 磁盘读写速度慢于内存，因此把即将操作的扇区复制进内存再读写，
//! 并尽量命中已驻留的扇区。缓存管理器属于某一块设备
//! （[`DiskCache`] 持有设备引用），不同磁盘之间互不干扰。
//!
//! 本文件系统里一个扇区只有两种用法：文件/目录的一段数据字节，
//! 或恰好占满整个扇区的一条盘上记录（文件头）。
//! 缓存据此只提供整扇区的字节视图与整扇区的记录视图，
//! 经由可变视图的访问都会把扇区记为脏；写回发生在替换、
//! [`DiskCache::sync_all`] 与缓存释放时。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::SECTOR_SIZE;

/// 某一块设备的扇区缓存管理器
pub struct DiskCache {
    device: Arc<dyn BlockDevice>,
    residents: Mutex<Vec<(usize, Arc<Mutex<SectorCache>>)>>,
}

/// 内存中的单个扇区
// data 居首并对齐到8，记录视图的类型化访问才不会错位
#[repr(C, align(8))]
pub struct SectorCache {
    data: [u8; SECTOR_SIZE],
    sector_id: usize,
    device: Arc<dyn BlockDevice>,
    /// 自上次写回后被改过
    dirty: bool,
}

impl DiskCache {
    /// 同时驻留的扇区个数上限
    const CAPACITY: usize = 16;

    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            device,
            residents: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    /// 取出指定扇区的缓存；不在内存时从磁盘读入，
    /// 驻留已满时先腾走一个没人引用的扇区。
    pub fn get(&self, sector_id: usize) -> Arc<Mutex<SectorCache>> {
        let mut residents = self.residents.lock();

        if let Some((_, resident)) = residents.iter().find(|(id, _)| *id == sector_id) {
            return resident.clone();
        }

        if residents.len() == Self::CAPACITY {
            let idle = residents
                .iter()
                .position(|(_, resident)| Arc::strong_count(resident) == 1)
                .expect("all cached sectors are pinned");
            // 写回由被丢弃缓存的释放完成
            residents.swap_remove(idle);
        }

        let resident = Arc::new(Mutex::new(SectorCache::load(
            sector_id,
            self.device.clone(),
        )));
        residents.push((sector_id, resident.clone()));
        resident
    }

    /// 把所有脏扇区写回磁盘
    pub fn sync_all(&self) {
        for (_, resident) in self.residents.lock().iter() {
            resident.lock().flush();
        }
    }
}

impl SectorCache {
    /// 从磁盘读入一个扇区
    fn load(sector_id: usize, device: Arc<dyn BlockDevice>) -> Self {
        let mut data = [0; SECTOR_SIZE];
        device.read_sector(sector_id, &mut data);

        Self {
            data,
            sector_id,
            device,
            dirty: false,
        }
    }

    /// 扇区的数据字节
    #[inline]
    pub fn bytes(&self) -> &[u8; SECTOR_SIZE] {
        &self.data
    }

    /// 扇区数据字节的可写视图
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8; SECTOR_SIZE] {
        self.dirty = true;
        &mut self.data
    }

    /// 把整个扇区解释为一条盘上记录；
    /// 记录类型必须恰好占满一个扇区
    pub fn record<T: Sized>(&self) -> &T {
        assert_eq!(mem::size_of::<T>(), SECTOR_SIZE);
        unsafe { &*self.data.as_ptr().cast() }
    }

    /// [`SectorCache::record`] 的可写版本
    pub fn record_mut<T: Sized>(&mut self) -> &mut T {
        assert_eq!(mem::size_of::<T>(), SECTOR_SIZE);
        self.dirty = true;
        unsafe { &mut *self.data.as_mut_ptr().cast() }
    }

    /// 脏扇区落盘
    pub fn flush(&mut self) {
        if self.dirty {
            self.dirty = false;
            self.device.write_sector(self.sector_id, &self.data);
        }
    }
}

impl Drop for SectorCache {
    fn drop(&mut self) {
        self.flush();
    }
}
