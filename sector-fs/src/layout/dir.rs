//! 目录：以普通文件存放的定长目录项表。
//!
//! 每个非根目录都带有一项 [`PARENT_NAME`]（`..`）指向父目录的
//! 文件头扇区；根目录的父目录是其自身。目录文件创建后不再扩容。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::{ptr, slice};

use crate::cache::DiskCache;
use crate::fops;
use crate::layout::FileHeader;

/// 文件名的最大长度（字节）
pub const FILE_NAME_MAX_LEN: usize = 25;
/// 目录项表的槽位数
pub const NUM_DIR_ENTRIES: usize = 16;
/// 目录文件的内容大小
pub const DIRECTORY_FILE_SIZE: usize = NUM_DIR_ENTRIES * DirEntry::SIZE;

/// 父目录项的名字
pub const PARENT_NAME: &str = "..";

/// 目录项
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    in_use: u8,
    is_dir: u8,
    // 最后一字节留给 \0
    name: [u8; FILE_NAME_MAX_LEN + 1],
    /// 所指文件或子目录的文件头扇区
    sector: u32,
}

impl DirEntry {
    /// 目录项大小恒为32字节
    pub const SIZE: usize = 32;

    pub fn new(name: &str, sector: usize, is_dir: bool) -> Self {
        let bytes = name.as_bytes();
        debug_assert!(bytes.len() <= FILE_NAME_MAX_LEN);
        let mut name = [0; FILE_NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self {
            in_use: 1,
            is_dir: is_dir as u8,
            name,
            sector: sector as u32,
        }
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.in_use != 0
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name.len() - 1);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    #[inline]
    pub fn sector(&self) -> usize {
        self.sector as usize
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}

/// 内存中的目录项表
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            entries: vec![DirEntry::default(); NUM_DIR_ENTRIES],
        }
    }

    /// 按名字查找任意目录项，返回其文件头扇区
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entry(name).map(DirEntry::sector)
    }

    /// 按名字查找子目录项
    pub fn find_dir(&self, name: &str) -> Option<usize> {
        self.entry(name)
            .and_then(|entry| entry.is_dir().then(|| entry.sector()))
    }

    pub fn entry(&self, name: &str) -> Option<&DirEntry> {
        self.entries
            .iter()
            .find(|entry| entry.in_use() && entry.name() == name)
    }

    /// 把名字登记到首个空槽位；重名或表满时返回假
    pub fn add(&mut self, name: &str, sector: usize, is_dir: bool) -> bool {
        if name.len() > FILE_NAME_MAX_LEN || self.entry(name).is_some() {
            return false;
        }

        match self.entries.iter_mut().find(|entry| !entry.in_use()) {
            Some(slot) => {
                *slot = DirEntry::new(name, sector, is_dir);
                true
            }
            None => false,
        }
    }

    /// 清掉名字对应的槽位，返回其文件头扇区
    pub fn remove(&mut self, name: &str) -> Option<usize> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.in_use() && entry.name() == name)?;

        let sector = entry.sector();
        *entry = DirEntry::default();
        Some(sector)
    }

    /// 除 `..` 外没有任何登记项
    pub fn is_empty(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| !entry.in_use() || entry.name() == PARENT_NAME)
    }

    /// 在用项的名字清单
    pub fn list(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.in_use())
            .map(|entry| String::from(entry.name()))
            .collect()
    }

    #[inline]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// 从目录文件读入整张表；`sector` 为目录的文件头扇区
    pub fn fetch_from(cache: &DiskCache, sector: usize) -> Self {
        let header = FileHeader::fetch_from(cache, sector);
        let mut dir = Self::new();

        for (offset, entry) in dir.entries.iter_mut().enumerate() {
            let read = fops::read_at(
                cache,
                &header,
                offset * DirEntry::SIZE,
                entry.as_bytes_mut(),
            );
            assert_eq!(read, DirEntry::SIZE);
        }

        dir
    }

    /// 把整张表写回目录文件
    pub fn write_back(&self, cache: &DiskCache, sector: usize) {
        let header = FileHeader::fetch_from(cache, sector);

        for (offset, entry) in self.entries.iter().enumerate() {
            let written =
                fops::write_at(cache, &header, offset * DirEntry::SIZE, entry.as_bytes());
            assert_eq!(written, DirEntry::SIZE);
        }
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
