//! 文件头：文件偏移到扇区号的索引结构（类似Unix的inode，
//! 但不记录权限、属主等信息），盘上大小恰为一个扇区。
//!
//! ## 两级索引
//!
//! - 文件长度不超过 [`MAX_FILE_SIZE`] 时为**直接头**：
//!   `data_sectors[i]` 即第 i 个数据扇区；
//! - 否则为**间接头**：`data_sectors[i]` 存放子文件头的扇区号，
//!   每个子头都是直接头。索引树严格两层，
//!   寻址上限为 [`MAX_FILE_SIZE_W_INDIR`]。

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use crate::cache::DiskCache;
use crate::Bitmap;
use crate::SECTOR_SIZE;

/// 直接索引槽位数，选取后文件头恰好填满一个扇区
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 2 * mem::size_of::<u32>()) / mem::size_of::<u32>();
/// 直接头的最大文件长度
pub const MAX_FILE_SIZE: usize = NUM_DIRECT * SECTOR_SIZE;
/// 带一级间接索引的最大文件长度
pub const MAX_FILE_SIZE_W_INDIR: usize = NUM_DIRECT * MAX_FILE_SIZE;

/// 文件头的盘上形式
#[derive(Debug, Clone, Default)]
#[repr(C)]
pub struct RawFileHeader {
    /// 文件的逻辑长度（字节）
    pub num_bytes: u32,
    /// 引用的扇区个数，数据与间接头都计入
    pub num_sectors: u32,
    /// 直接头存数据扇区号，间接头存子头扇区号
    pub data_sectors: [u32; NUM_DIRECT],
}

/// 内存中的文件头，间接时一并持有子头
#[derive(Debug, Clone, Default)]
pub struct FileHeader {
    raw: RawFileHeader,
    index: Index,
}

/// 索引形态；子头恒为直接头
#[derive(Debug, Clone, Default)]
enum Index {
    #[default]
    Direct,
    Indirect(Vec<FileHeader>),
}

impl FileHeader {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 文件的逻辑长度
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.num_bytes as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.num_bytes == 0
    }

    #[inline]
    pub fn is_direct(&self) -> bool {
        matches!(self.index, Index::Direct)
    }

    #[inline]
    pub fn raw(&self) -> &RawFileHeader {
        &self.raw
    }

    /// 子头们；直接头返回空切片
    pub fn children(&self) -> &[FileHeader] {
        match &self.index {
            Index::Direct => &[],
            Index::Indirect(children) => children,
        }
    }

    /// 为 `size` 字节的新文件预留数据扇区（超长时还包括间接头扇区）。
    /// 对传入位图全有或全无：空间不足时不动任何位并返回假。
    pub fn allocate(&mut self, free_map: &mut Bitmap, size: usize) -> bool {
        if size > MAX_FILE_SIZE_W_INDIR {
            return false;
        }

        let data_sectors = Self::count_data_sectors(size);
        let indirection_sectors = Self::count_indirection_sectors(size);
        if free_map.count_clear() < data_sectors + indirection_sectors {
            return false;
        }

        self.raw.num_bytes = size as u32;
        self.raw.num_sectors = (data_sectors + indirection_sectors) as u32;

        if size <= MAX_FILE_SIZE {
            for slot in &mut self.raw.data_sectors[..data_sectors] {
                *slot = free_map.find().unwrap() as u32;
            }
            self.index = Index::Direct;
        } else {
            let mut children = Vec::with_capacity(indirection_sectors);
            let mut remaining = size;
            for slot in &mut self.raw.data_sectors[..indirection_sectors] {
                *slot = free_map.find().unwrap() as u32;

                // 除末个子头外都装满
                let chunk = remaining.min(MAX_FILE_SIZE);
                let mut child = FileHeader::new();
                let ok = child.allocate(free_map, chunk);
                assert!(ok);
                children.push(child);
                remaining -= chunk;
            }
            self.index = Index::Indirect(children);
        }

        true
    }

    /// 把文件加长 `delta` 字节，保持既有内容的偏移不变。
    /// 直接头放不下时提升为间接头：原有的直接扇区整体下沉为
    /// 首个子头，本头的槽位改存子头扇区号。
    pub fn extend(&mut self, free_map: &mut Bitmap, delta: usize) -> bool {
        if delta == 0 {
            return true;
        }

        let old_bytes = self.raw.num_bytes as usize;
        let new_bytes = old_bytes + delta;
        if new_bytes > MAX_FILE_SIZE_W_INDIR {
            return false;
        }

        let old_total = Self::count_data_sectors(old_bytes) + Self::count_indirection_sectors(old_bytes);
        let new_total = Self::count_data_sectors(new_bytes) + Self::count_indirection_sectors(new_bytes);
        if free_map.count_clear() < new_total - old_total {
            return false;
        }

        if new_bytes <= MAX_FILE_SIZE {
            // 直接索引仍然够用，追加数据扇区即可
            let old_data = Self::count_data_sectors(old_bytes);
            let new_data = Self::count_data_sectors(new_bytes);
            for slot in &mut self.raw.data_sectors[old_data..new_data] {
                *slot = free_map.find().unwrap() as u32;
            }
            self.raw.num_bytes = new_bytes as u32;
            self.raw.num_sectors = new_data as u32;
            return true;
        }

        if old_bytes <= MAX_FILE_SIZE {
            // 提升：原直接头原样成为首个子头
            let child = FileHeader {
                raw: self.raw.clone(),
                index: Index::Direct,
            };
            self.raw.data_sectors = [0; NUM_DIRECT];
            self.raw.data_sectors[0] = free_map.find().unwrap() as u32;
            self.index = Index::Indirect(vec![child]);
        }

        let Index::Indirect(children) = &mut self.index else {
            unreachable!();
        };

        let mut remaining = new_bytes - old_bytes;

        // 先填满末个子头
        let last = children.last_mut().unwrap();
        let spare = MAX_FILE_SIZE - last.len();
        if spare > 0 {
            let grow = remaining.min(spare);
            let ok = last.extend(free_map, grow);
            assert!(ok);
            remaining -= grow;
        }

        // 剩余字节进入新的子头
        while remaining > 0 {
            let chunk = remaining.min(MAX_FILE_SIZE);
            let header_sector = free_map.find().unwrap();
            let mut child = FileHeader::new();
            let ok = child.allocate(free_map, chunk);
            assert!(ok);
            self.raw.data_sectors[children.len()] = header_sector as u32;
            children.push(child);
            remaining -= chunk;
        }

        self.raw.num_bytes = new_bytes as u32;
        self.raw.num_sectors =
            (Self::count_data_sectors(new_bytes) + children.len()) as u32;
        true
    }

    /// 归还文件占用的所有扇区：先递归释放子头，再清本层引用的扇区
    pub fn deallocate(&mut self, free_map: &mut Bitmap) {
        let num_bytes = self.raw.num_bytes as usize;

        if let Index::Indirect(children) = &mut self.index {
            for child in children {
                child.deallocate(free_map);
            }
        }

        let referenced = if num_bytes > MAX_FILE_SIZE {
            Self::count_indirection_sectors(num_bytes)
        } else {
            Self::count_data_sectors(num_bytes)
        };
        for &sector in &self.raw.data_sectors[..referenced] {
            assert!(free_map.test(sector as usize));
            free_map.clear(sector as usize);
        }

        self.raw = RawFileHeader::default();
        self.index = Index::Direct;
    }

    /// 从磁盘读入文件头，间接时连同子头一并读入
    pub fn fetch_from(cache: &DiskCache, sector: usize) -> Self {
        let raw = cache.get(sector).lock().record::<RawFileHeader>().clone();

        let indirection = Self::count_indirection_sectors(raw.num_bytes as usize);
        let index = if indirection == 0 {
            Index::Direct
        } else {
            Index::Indirect(
                raw.data_sectors[..indirection]
                    .iter()
                    .map(|&child_sector| Self::fetch_from(cache, child_sector as usize))
                    .collect(),
            )
        };

        Self { raw, index }
    }

    /// [`FileHeader::fetch_from`] 的镜像操作
    pub fn write_back(&self, cache: &DiskCache, sector: usize) {
        *cache.get(sector).lock().record_mut::<RawFileHeader>() = self.raw.clone();

        if let Index::Indirect(children) = &self.index {
            for (child, &child_sector) in children.iter().zip(&self.raw.data_sectors) {
                child.write_back(cache, child_sector as usize);
            }
        }
    }

    /// 文件内偏移所在的数据扇区号——相当于从文件内的
    /// “虚拟地址”翻译到盘上的“物理地址”
    pub fn byte_to_sector(&self, offset: usize) -> usize {
        match &self.index {
            Index::Direct => self.raw.data_sectors[offset / SECTOR_SIZE] as usize,
            Index::Indirect(children) => {
                children[offset / MAX_FILE_SIZE].byte_to_sector(offset % MAX_FILE_SIZE)
            }
        }
    }

    /// 容纳 `size` 字节所需的数据扇区数
    #[inline]
    pub fn count_data_sectors(size: usize) -> usize {
        size.div_ceil(SECTOR_SIZE)
    }

    /// 容纳 `size` 字节所需的间接头扇区数
    #[inline]
    pub fn count_indirection_sectors(size: usize) -> usize {
        if size <= MAX_FILE_SIZE {
            0
        } else {
            Self::count_data_sectors(size).div_ceil(NUM_DIRECT)
        }
    }
}
