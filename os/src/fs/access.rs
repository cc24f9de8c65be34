//! 单个文件的读写控制器：写者优先的读写协议。
//!
//! 读者在锁内把计数加一后即可并发读；最后一名读者离开时
//! 通过条件变量宣告“无读者”。写者整个写期间握着锁，
//! 计数不为零就等，因此写与一切并发读写互斥。
//! 持有者身份检查挡住自递归。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::sync::{Condition, Lock};

pub struct FileAccessController {
    lock: Arc<Lock>,
    no_readers: Condition,
    readers: AtomicU32,
}

impl FileAccessController {
    pub fn new() -> Arc<Self> {
        let lock = Arc::new(Lock::new("file-access"));
        Arc::new(Self {
            no_readers: Condition::new("no-readers", lock.clone()),
            lock,
            readers: AtomicU32::new(0),
        })
    }

    pub fn acquire_read(&self) {
        if self.lock.is_held_by_current_thread() {
            return;
        }
        self.lock.acquire();
        self.readers.fetch_add(1, Ordering::AcqRel);
        self.lock.release();
    }

    pub fn release_read(&self) {
        if self.lock.is_held_by_current_thread() {
            return;
        }
        self.lock.acquire();
        let remaining = self.readers.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            self.no_readers.broadcast();
        }
        self.lock.release();
    }

    /// 独占整个文件；返回时锁在手，读者计数为零
    pub fn acquire_write(&self) {
        self.lock.acquire();
        while self.readers.load(Ordering::Acquire) > 0 {
            self.no_readers.wait();
        }
    }

    pub fn release_write(&self) {
        // 把“无读者”让给排队的下一名写者
        self.no_readers.signal();
        self.lock.release();
    }

    /// 在读的调用数（测试与一致性检查用）
    #[inline]
    pub fn reader_count(&self) -> u32 {
        self.readers.load(Ordering::Acquire)
    }
}
