//! 按文件头定位扇区的整文件读写原语。
//!
//! 请求不必对齐扇区边界：读取时把涉及的扇区整个取进缓存，
//! 只拷贝请求的片段；写入部分扇区时缓存里已有原内容，
//! 天然构成读-改-写。

use crate::cache::DiskCache;
use crate::layout::FileHeader;
use crate::SECTOR_SIZE;

/// 从文件内偏移 `offset` 起读出数据填充 `buf`，
/// 返回实际读到的字节数（越过文件尾的部分被截断）。
pub fn read_at(cache: &DiskCache, header: &FileHeader, offset: usize, buf: &mut [u8]) -> usize {
    let mut start = offset;
    let end = (start + buf.len()).min(header.len());

    if start >= end {
        return 0;
    }

    let mut read_size = 0;
    loop {
        // 当前扇区的文件内末地址（字节）
        let current_sector_end = ((start / SECTOR_SIZE + 1) * SECTOR_SIZE).min(end);
        let sector_read_size = current_sector_end - start;
        let in_sector = start % SECTOR_SIZE;

        let sector = cache.get(header.byte_to_sector(start));
        let sector = sector.lock();
        buf[read_size..read_size + sector_read_size]
            .copy_from_slice(&sector.bytes()[in_sector..in_sector + sector_read_size]);
        drop(sector);

        read_size += sector_read_size;

        if current_sector_end == end {
            break;
        }
        start = current_sector_end;
    }

    read_size
}

/// 把 `buf` 写入文件内偏移 `offset` 起的区域，
/// 返回实际写入的字节数。文件必须已经扩到足够长。
pub fn write_at(cache: &DiskCache, header: &FileHeader, offset: usize, buf: &[u8]) -> usize {
    let mut start = offset;
    let end = (start + buf.len()).min(header.len());

    if start >= end {
        return 0;
    }

    let mut written_size = 0;
    loop {
        let current_sector_end = ((start / SECTOR_SIZE + 1) * SECTOR_SIZE).min(end);
        let sector_write_size = current_sector_end - start;
        let in_sector = start % SECTOR_SIZE;

        let sector = cache.get(header.byte_to_sector(start));
        let mut sector = sector.lock();
        sector.bytes_mut()[in_sector..in_sector + sector_write_size]
            .copy_from_slice(&buf[written_size..written_size + sector_write_size]);
        drop(sector);

        written_size += sector_write_size;

        if current_sector_end == end {
            break;
        }
        start = current_sector_end;
    }

    written_size
}
