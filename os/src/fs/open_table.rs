//! 打开文件表：以文件头扇区为键的在用登记。
//!
//! 每项记录打开实例数、延迟删除标志与该扇区的读写控制器。
//! 表锁保护单个操作；“先减数再裁决是否删盘”这类复合临界区
//! 由调用者用 [`OpenFileTable::acquire`] / [`OpenFileTable::release`]
//! 显式圈起来。

use std::collections::BTreeMap;
use std::sync::Arc;

use spin::Mutex;

use crate::sync::Lock;

use super::FileAccessController;

pub struct OpenFileTable {
    lock: Lock,
    entries: Mutex<BTreeMap<usize, OpenFileEntry>>,
}

struct OpenFileEntry {
    open_instances: u32,
    to_be_removed: bool,
    controller: Arc<FileAccessController>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self {
            lock: Lock::new("open-file-table"),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn acquire(&self) {
        self.lock.acquire();
    }

    pub fn release(&self) {
        self.lock.release();
    }

    /// 登记一次打开：已有项加一，否则新建计数为一的项。
    /// 返回该扇区的读写控制器。
    pub fn add_open_file(&self, sector: usize) -> Arc<FileAccessController> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(sector).or_insert_with(|| OpenFileEntry {
            open_instances: 0,
            to_be_removed: false,
            controller: FileAccessController::new(),
        });
        entry.open_instances += 1;
        entry.controller.clone()
    }

    /// 注销一次打开，返回剩余实例数；无此项时返回 -1
    pub fn close_open_file(&self, sector: usize) -> i32 {
        let mut entries = self.entries.lock();
        match entries.get_mut(&sector) {
            Some(entry) => {
                entry.open_instances -= 1;
                entry.open_instances as i32
            }
            None => -1,
        }
    }

    /// 闩上删除标志；返回此刻是否已无人打开（可以立刻删盘）
    pub fn set_to_be_removed(&self, sector: usize) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(&sector) {
            Some(entry) => {
                entry.to_be_removed = true;
                entry.open_instances == 0
            }
            None => true,
        }
    }

    pub fn get_to_be_removed(&self, sector: usize) -> bool {
        self.entries
            .lock()
            .get(&sector)
            .is_some_and(|entry| entry.to_be_removed)
    }

    pub fn remove_open_file(&self, sector: usize) {
        self.entries.lock().remove(&sector);
    }

    /// 该扇区当前的打开实例数（测试用）
    pub fn open_instances(&self, sector: usize) -> u32 {
        self.entries
            .lock()
            .get(&sector)
            .map_or(0, |entry| entry.open_instances)
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}
