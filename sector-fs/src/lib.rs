//! # 磁盘数据结构层
//!
//! 定义文件系统的盘上结构并实现对它们的操作，自下而上：
//!
//! - 扇区缓存层：内存上的磁盘扇区缓存（[`cache`]）
//! - 空闲扇区位图（[`Bitmap`]），以普通文件的形式持久化
//! - 文件头（[`FileHeader`]）：文件偏移到扇区的索引结构，
//!   支持一级间接索引
//! - 目录（[`Directory`]）：文件名到文件头扇区的映射表
//! - 文件读写原语（[`fops`]）：按文件头定位扇区的整文件读写
//!
//! 盘面布局：0号扇区存放空闲位图文件的文件头，
//! 1号扇区存放根目录的文件头，其余扇区由位图记账。
//!
//! 本层不含阻塞原语，互斥由调用者（内核）提供。

#![no_std]

extern crate alloc;

pub mod cache;
mod error;
pub mod fops;
mod layout;

mod bitmap;

pub use self::bitmap::Bitmap;
pub use self::cache::DiskCache;
pub use self::error::FsError;
pub use self::layout::{
    DirEntry, Directory, FileHeader, RawFileHeader, DIRECTORY_FILE_SIZE, FILE_NAME_MAX_LEN,
    MAX_FILE_SIZE, MAX_FILE_SIZE_W_INDIR, NUM_DIRECT, NUM_DIR_ENTRIES, PARENT_NAME,
};

/// 扇区大小（字节），亦是磁盘I/O的原子单位
pub const SECTOR_SIZE: usize = 128;
/// 磁盘扇区总数
pub const NUM_SECTORS: usize = 1024;

/// 空闲位图文件的文件头所在扇区
pub const FREE_MAP_SECTOR: usize = 0;
/// 根目录的文件头所在扇区
pub const DIRECTORY_SECTOR: usize = 1;

/// 空闲位图文件的内容大小：每扇区一位
pub const FREE_MAP_FILE_SIZE: usize = NUM_SECTORS / 8;
