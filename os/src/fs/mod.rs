//! # 文件系统门面
//!
//! 名字空间与磁盘结构的总调度。每个文件由三部分构成：
//! 占一个扇区的文件头、若干数据扇区、所在目录里的一项登记。
//! 空闲位图和根目录本身也是普通文件，文件头分别固定在
//! 0号与1号扇区，开机即可定位。
//!
//! 修改目录或位图的操作（创建、删除等）成功即刻落盘；
//! 中途失败则丢弃内存中的改动，不写回任何一部分。
//!
//! ## 锁序
//!
//! 文件系统锁 → 目录锁 → 空闲位图锁 → 打开文件表锁 → 核心映射锁；
//! 读写控制器只在上述锁全部放下之后才获取
//! （唯一例外是写句柄扩容时在控制器内部拿位图锁，见 [`OpenFile::write_at`]）。

mod access;
mod check;
mod open_file;
mod open_table;
mod path;

pub use self::access::FileAccessController;
pub use self::open_file::OpenFile;
pub use self::open_table::OpenFileTable;
pub use self::path::Path;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use block_dev::BlockDevice;
use log::debug;
use sector_fs::{
    Bitmap, Directory, DiskCache, FileHeader, FsError, DIRECTORY_FILE_SIZE, DIRECTORY_SECTOR,
    FREE_MAP_FILE_SIZE, FREE_MAP_SECTOR, MAX_FILE_SIZE_W_INDIR, NUM_SECTORS, PARENT_NAME,
};
use spin::Mutex;

use crate::sync::Lock;
use crate::thread;

pub struct FileSystem {
    cache: DiskCache,
    open_files: OpenFileTable,
    dir_locks: DirLockTable,
    free_map_lock: Lock,
    fs_lock: Lock,
}

impl FileSystem {
    /// 接管一块磁盘。`format` 为真时磁盘视作白盘，
    /// 先建立空目录与空闲位图。
    pub fn new(device: Arc<dyn BlockDevice>, format: bool) -> Arc<Self> {
        debug!("initializing the file system");
        let cache = DiskCache::new(device);
        if format {
            Self::format(&cache);
        }

        Arc::new(Self {
            cache,
            open_files: OpenFileTable::new(),
            dir_locks: DirLockTable::new(),
            free_map_lock: Lock::new("free-map"),
            fs_lock: Lock::new("file-system"),
        })
    }

    fn format(cache: &DiskCache) {
        debug!("formatting the file system");
        for sector in 0..NUM_SECTORS {
            cache.get(sector).lock().bytes_mut().fill(0);
        }

        let mut free_map = Bitmap::new(NUM_SECTORS);
        let mut map_header = FileHeader::new();
        let mut dir_header = FileHeader::new();

        // 两个众所周知的文件头扇区先占住
        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(DIRECTORY_SECTOR);

        assert!(map_header.allocate(&mut free_map, FREE_MAP_FILE_SIZE));
        assert!(dir_header.allocate(&mut free_map, DIRECTORY_FILE_SIZE));

        // 头先落盘，之后才能按头定位内容
        map_header.write_back(cache, FREE_MAP_SECTOR);
        dir_header.write_back(cache, DIRECTORY_SECTOR);

        // 根目录以自身为父
        let mut root = Directory::new();
        root.add(PARENT_NAME, DIRECTORY_SECTOR, true);
        root.write_back(cache, DIRECTORY_SECTOR);

        free_map.write_back(cache, &map_header);
        cache.sync_all();
    }

    #[inline]
    pub(crate) fn cache(&self) -> &DiskCache {
        &self.cache
    }

    #[inline]
    fn header(&self, sector: usize) -> FileHeader {
        FileHeader::fetch_from(&self.cache, sector)
    }

    /// 新建 `initial_size` 字节的空文件
    pub fn create(&self, path: &str, initial_size: usize) -> Result<(), FsError> {
        if initial_size > MAX_FILE_SIZE_W_INDIR {
            return Err(FsError::NoSpace);
        }

        let (dir_sector, name) = self.resolve_enclosing(path)?;
        debug!("creating file {name:?}, size {initial_size}");

        let (mut dir, dir_lock) = self.acquire_dir(dir_sector);
        let result = (|| {
            if dir.find(name).is_some() {
                return Err(FsError::AlreadyExists);
            }

            let mut free_map = self.acquire_free_map();
            // 给文件头找一个扇区
            let Some(header_sector) = free_map.find() else {
                return Err(FsError::NoSpace);
            };
            if !dir.add(name, header_sector, false) {
                return Err(FsError::DirectoryFull);
            }
            let mut header = FileHeader::new();
            if !header.allocate(&mut free_map, initial_size) {
                return Err(FsError::NoSpace);
            }

            // 全部成功，统一落盘
            header.write_back(&self.cache, header_sector);
            dir.write_back(&self.cache, dir_sector);
            free_map.write_back();
            Ok(())
        })();
        dir_lock.release();

        self.cache.sync_all();
        result
    }

    /// 新建空目录，内含指向上级的 `..` 项
    pub fn create_dir(&self, path: &str) -> Result<(), FsError> {
        let (dir_sector, name) = self.resolve_enclosing(path)?;
        debug!("creating directory {name:?}");

        let (mut dir, dir_lock) = self.acquire_dir(dir_sector);
        let result = (|| {
            if dir.find(name).is_some() {
                return Err(FsError::AlreadyExists);
            }

            let mut free_map = self.acquire_free_map();
            let Some(header_sector) = free_map.find() else {
                return Err(FsError::NoSpace);
            };
            if !dir.add(name, header_sector, true) {
                return Err(FsError::DirectoryFull);
            }
            let mut header = FileHeader::new();
            if !header.allocate(&mut free_map, DIRECTORY_FILE_SIZE) {
                return Err(FsError::NoSpace);
            }

            header.write_back(&self.cache, header_sector);
            let mut new_dir = Directory::new();
            new_dir.add(PARENT_NAME, dir_sector, true);
            new_dir.write_back(&self.cache, header_sector);
            dir.write_back(&self.cache, dir_sector);
            free_map.write_back();
            Ok(())
        })();
        dir_lock.release();

        self.cache.sync_all();
        result
    }

    /// 打开文件读写。打开期间删除该文件不影响本句柄，
    /// 真正的回收发生在最后一次关闭。
    pub fn open(self: &Arc<Self>, path: &str) -> Result<OpenFile, FsError> {
        let (dir_sector, name) = self.resolve_enclosing(path)?;
        debug!("opening file {name:?}");

        let (dir, dir_lock) = self.acquire_dir(dir_sector);
        let result = (|| {
            let entry = dir.entry(name).ok_or(FsError::NotFound)?;
            if entry.is_dir() {
                return Err(FsError::IsADirectory);
            }
            let sector = entry.sector();

            self.open_files.acquire();
            let controller = self.open_files.add_open_file(sector);
            self.open_files.release();

            Ok(OpenFile::new(self.clone(), sector, controller))
        })();
        dir_lock.release();
        result
    }

    /// 删除文件。尚有句柄打开时只闩上删除标志，
    /// 目录里的名字立刻消失，扇区等最后一次关闭再回收。
    pub fn remove(&self, path: &str) -> Result<(), FsError> {
        let (dir_sector, name) = self.resolve_enclosing(path)?;
        debug!("removing file {name:?}");

        let (mut dir, dir_lock) = self.acquire_dir(dir_sector);
        let result = (|| {
            let entry = dir.entry(name).ok_or(FsError::NotFound)?;
            if entry.is_dir() {
                return Err(FsError::IsADirectory);
            }
            let sector = entry.sector();

            dir.remove(name);
            dir.write_back(&self.cache, dir_sector);
            Ok(sector)
        })();
        dir_lock.release();
        let sector = result?;

        self.open_files.acquire();
        let deletable = self.open_files.set_to_be_removed(sector);
        if deletable {
            self.open_files.remove_open_file(sector);
        }
        self.open_files.release();

        if deletable {
            self.delete_from_disk(sector);
        } else {
            debug!("file {name:?} still open, removal deferred");
        }
        self.cache.sync_all();
        Ok(())
    }

    /// 删除空目录
    pub fn remove_dir(&self, path: &str) -> Result<(), FsError> {
        let (dir_sector, name) = self.resolve_enclosing(path)?;
        debug!("removing directory {name:?}");

        let (mut dir, dir_lock) = self.acquire_dir(dir_sector);
        let result = (|| {
            let sector = dir.find_dir(name).ok_or(FsError::NotFound)?;

            let victim = Directory::fetch_from(&self.cache, sector);
            if !victim.is_empty() {
                return Err(FsError::DirectoryNotEmpty);
            }

            dir.remove(name);
            dir.write_back(&self.cache, dir_sector);
            Ok(sector)
        })();
        dir_lock.release();
        let sector = result?;

        self.delete_from_disk(sector);
        self.cache.sync_all();
        Ok(())
    }

    /// 注销一次打开。这是句柄释放时的收尾：
    /// 计数归零且删除标志在闩上时，从表里摘除并回收磁盘。
    pub fn close(&self, sector: usize) -> bool {
        debug!("closing file at sector {sector}");

        self.open_files.acquire();
        let instances = self.open_files.close_open_file(sector);
        let to_be_removed = self.open_files.get_to_be_removed(sector);
        if instances == 0 {
            self.open_files.remove_open_file(sector);
        }
        self.open_files.release();

        if instances < 0 {
            return false;
        }
        if instances == 0 && to_be_removed {
            self.delete_from_disk(sector);
            self.cache.sync_all();
        }
        true
    }

    /// 当前目录下在用的名字
    pub fn list(&self) -> Vec<String> {
        let dir = Directory::fetch_from(&self.cache, thread::current().current_dir());
        dir.list()
    }

    /// 当前目录的 `(名字, 是否目录)` 清单
    pub fn list_entries(&self) -> Vec<(String, bool)> {
        let dir = Directory::fetch_from(&self.cache, thread::current().current_dir());
        dir.entries()
            .iter()
            .filter(|entry| entry.in_use())
            .map(|entry| (String::from(entry.name()), entry.is_dir()))
            .collect()
    }

    /// 查文件或目录的元信息
    pub fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let (dir_sector, name) = self.resolve_enclosing(path)?;

        let (dir, dir_lock) = self.acquire_dir(dir_sector);
        let result = match dir.entry(name) {
            Some(entry) => Ok(FileStat {
                sector: entry.sector(),
                is_dir: entry.is_dir(),
                length: self.header(entry.sector()).len(),
            }),
            None => Err(FsError::NotFound),
        };
        dir_lock.release();
        result
    }

    /// 切换当前线程的工作目录
    pub fn cd(&self, path: &str) -> Result<(), FsError> {
        let me = thread::current();
        let start = if path.is_absolute() {
            DIRECTORY_SECTOR
        } else {
            me.current_dir()
        };
        let target = self.walk_from(start, path.trim_start_matches('/'))?;
        me.set_current_dir(target);
        Ok(())
    }

    /// 空闲位图的当前快照（统计与测试用）
    pub fn free_map_snapshot(&self) -> Bitmap {
        let free_map = self.acquire_free_map();
        free_map.map.clone()
    }

    #[inline]
    pub fn open_files(&self) -> &OpenFileTable {
        &self.open_files
    }

    /// 把位图占用与根目录列表写进日志
    pub fn print(&self) {
        let free_map = self.free_map_snapshot();
        debug!(
            "free map: {} of {} sectors clear",
            free_map.count_clear(),
            NUM_SECTORS
        );
        let root = Directory::fetch_from(&self.cache, DIRECTORY_SECTOR);
        debug!("root directory: {:?}", root.list());
    }
}

impl FileSystem {
    /// 在文件系统锁下取目录锁并读入目录内容
    fn acquire_dir(&self, sector: usize) -> (Directory, Arc<Lock>) {
        self.fs_lock.acquire();
        let lock = self.dir_locks.get(sector);
        lock.acquire();
        let dir = Directory::fetch_from(&self.cache, sector);
        self.fs_lock.release();
        (dir, lock)
    }

    /// 拿住空闲位图锁并读入位图；守卫释放即放锁，
    /// 不曾 [`FreeMapGuard::write_back`] 的改动随之作废
    fn acquire_free_map(&self) -> FreeMapGuard<'_> {
        self.free_map_lock.acquire();
        let mut map = Bitmap::new(NUM_SECTORS);
        map.fetch_from(&self.cache, &self.header(FREE_MAP_SECTOR));
        FreeMapGuard { fs: self, map }
    }

    /// 回收一个文件：数据扇区、间接头、文件头扇区都归还位图
    fn delete_from_disk(&self, sector: usize) {
        let mut free_map = self.acquire_free_map();
        let mut header = self.header(sector);
        header.deallocate(&mut free_map);
        free_map.clear(sector);
        free_map.write_back();
    }

    /// 把路径解析为（所在目录扇区, 末项名字）。
    /// 中间各项必须是目录；前导 `/` 回到根；`..` 沿父项上行。
    fn resolve_enclosing<'p>(&self, path: &'p str) -> Result<(usize, &'p str), FsError> {
        let start = if path.is_absolute() {
            DIRECTORY_SECTOR
        } else {
            thread::current().current_dir()
        };

        let (dir_path, name) = path.dir_file();
        if name.is_empty() || name == "." || name == PARENT_NAME {
            return Err(FsError::PathInvalid);
        }
        if name.len() > sector_fs::FILE_NAME_MAX_LEN {
            return Err(FsError::NameTooLong);
        }

        let dir_sector = self.walk_from(start, dir_path)?;
        Ok((dir_sector, name))
    }

    /// 从 `sector` 起沿路径诸项逐级进入子目录
    fn walk_from(&self, mut sector: usize, dir_path: &str) -> Result<usize, FsError> {
        for component in dir_path.split('/').filter(|c| !c.is_empty()) {
            let dir = Directory::fetch_from(&self.cache, sector);
            sector = dir.find_dir(component).ok_or(FsError::PathInvalid)?;
        }
        Ok(sector)
    }
}

/// 文件系统项的元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// 文件头所在扇区
    pub sector: usize,
    pub is_dir: bool,
    /// 逻辑长度；目录恒为目录文件大小
    pub length: usize,
}

/// 空闲位图的持锁视图
pub struct FreeMapGuard<'a> {
    fs: &'a FileSystem,
    map: Bitmap,
}

impl FreeMapGuard<'_> {
    /// 把位图写入其文件，使改动对外可见
    pub fn write_back(&self) {
        self.map
            .write_back(&self.fs.cache, &self.fs.header(FREE_MAP_SECTOR));
    }
}

impl Deref for FreeMapGuard<'_> {
    type Target = Bitmap;

    fn deref(&self) -> &Bitmap {
        &self.map
    }
}

impl DerefMut for FreeMapGuard<'_> {
    fn deref_mut(&mut self) -> &mut Bitmap {
        &mut self.map
    }
}

impl Drop for FreeMapGuard<'_> {
    fn drop(&mut self) {
        self.fs.free_map_lock.release();
    }
}

/// 目录锁登记：同一目录扇区共用同一把锁
struct DirLockTable {
    locks: Mutex<BTreeMap<usize, Arc<Lock>>>,
}

impl DirLockTable {
    fn new() -> Self {
        Self {
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    fn get(&self, sector: usize) -> Arc<Lock> {
        self.locks
            .lock()
            .entry(sector)
            .or_insert_with(|| Arc::new(Lock::new("directory")))
            .clone()
    }
}
