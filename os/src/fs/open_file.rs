//! 打开的文件句柄。
//!
//! 打开期间文件头驻留内存；读写不必对齐扇区，
//! 部分扇区的写经由缓存读-改-写。写越过文件尾时透明扩容。
//! 所有数据访问都由该扇区的读写控制器把守。
//! 句柄释放即关闭，最后一次关闭会兑现挂起的删除。

use std::sync::Arc;

use sector_fs::{fops, FileHeader};
use spin::RwLock;

use super::{FileAccessController, FileSystem};

pub struct OpenFile {
    fs: Arc<FileSystem>,
    /// 文件头所在扇区，也是打开文件表的键
    sector: usize,
    header: RwLock<FileHeader>,
    seek_position: usize,
    controller: Arc<FileAccessController>,
}

impl OpenFile {
    pub(crate) fn new(
        fs: Arc<FileSystem>,
        sector: usize,
        controller: Arc<FileAccessController>,
    ) -> Self {
        let header = FileHeader::fetch_from(fs.cache(), sector);
        Self {
            fs,
            sector,
            header: RwLock::new(header),
            seek_position: 0,
            controller,
        }
    }

    #[inline]
    pub fn sector(&self) -> usize {
        self.sector
    }

    /// 文件的逻辑长度
    pub fn length(&self) -> usize {
        self.header.read().len()
    }

    /// 移动下一次 [`OpenFile::read`] / [`OpenFile::write`] 的起点
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.seek_position = position;
    }

    /// 从当前位置读，推进读写位置
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let read = self.read_at(buf, self.seek_position);
        self.seek_position += read;
        read
    }

    /// 在当前位置写，推进读写位置
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let written = self.write_at(buf, self.seek_position);
        self.seek_position += written;
        written
    }

    /// 从头读完整个文件
    pub fn read_all(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.length()];
        let read = self.read_at(&mut bytes, 0);
        bytes.truncate(read);
        bytes
    }

    /// 从 `position` 处读入 `buf`，返回实际读到的字节数；
    /// 起点越过文件尾时读不到任何字节
    pub fn read_at(&self, buf: &mut [u8], position: usize) -> usize {
        if buf.is_empty() {
            return 0;
        }

        self.controller.acquire_read();

        let header = self.header.read();
        let read = if position >= header.len() {
            0
        } else {
            fops::read_at(self.fs.cache(), &header, position, buf)
        };
        drop(header);

        self.controller.release_read();
        read
    }

    /// 把 `buf` 写到 `position` 处，返回实际写入的字节数。
    ///
    /// `position` 恰为文件尾时允许并扩容；越过文件尾则一字不写。
    /// 扩容失败（磁盘满）时整次写作废。
    pub fn write_at(&self, buf: &[u8], position: usize) -> usize {
        if buf.is_empty() {
            return 0;
        }

        self.controller.acquire_write();

        let length = self.header.read().len();
        if position > length {
            self.controller.release_write();
            return 0;
        }

        if position + buf.len() > length {
            // 透明扩容；头与位图都在落盘后才对外可见
            let mut free_map = self.fs.acquire_free_map();
            let mut header = self.header.write();
            if !header.extend(&mut free_map, position + buf.len() - length) {
                drop(header);
                drop(free_map);
                self.controller.release_write();
                return 0;
            }
            header.write_back(self.fs.cache(), self.sector);
            free_map.write_back();
        }

        let header = self.header.read();
        let written = fops::write_at(self.fs.cache(), &header, position, buf);
        drop(header);
        self.fs.cache().sync_all();

        self.controller.release_write();
        written
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        self.fs.close(self.sector);
    }
}
