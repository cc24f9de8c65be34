//! 内核线程层。
//!
//! 线程由宿主线程承载，这里维护每条线程的登记信息：
//! 名字、基准/有效优先级、当前目录。调度器本身是外部协作者，
//! 同步原语只依赖两点：挂起（[`WaitToken::block`]）与
//! 点名唤醒（[`WaitToken::wake`]）。
//!
//! 优先级数值越小越高；锁的优先级继承通过
//! [`KThread::donate_priority`] / [`KThread::restore_priority`] 实现。

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::DEFAULT_PRIORITY;

/// 内核线程的登记信息
pub struct KThread {
    name: String,
    /// 创建时赋予的优先级
    base_priority: u32,
    /// 当前生效的优先级，可能被等锁者临时抬高
    effective_priority: AtomicU32,
    /// 当前目录（目录文件头所在扇区）
    current_dir: AtomicUsize,
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<KThread>>> = const { RefCell::new(None) };
}

impl KThread {
    fn new(name: &str, priority: u32) -> Arc<Self> {
        Arc::new(Self {
            name: String::from(name),
            base_priority: priority,
            effective_priority: AtomicU32::new(priority),
            current_dir: AtomicUsize::new(sector_fs::DIRECTORY_SECTOR),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前生效的优先级
    #[inline]
    pub fn priority(&self) -> u32 {
        self.effective_priority.load(Ordering::Acquire)
    }

    #[inline]
    pub fn base_priority(&self) -> u32 {
        self.base_priority
    }

    /// 接受一次优先级捐赠；只会抬高，不会降低
    pub fn donate_priority(&self, donated: u32) {
        self.effective_priority
            .fetch_min(donated, Ordering::AcqRel);
    }

    /// 回到基准优先级
    pub fn restore_priority(&self) {
        self.effective_priority
            .store(self.base_priority, Ordering::Release);
    }

    #[inline]
    pub fn current_dir(&self) -> usize {
        self.current_dir.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_current_dir(&self, sector: usize) {
        self.current_dir.store(sector, Ordering::Release);
    }
}

/// 当前线程的登记信息；未经 [`spawn`] 创建的宿主线程
/// 首次查询时以缺省优先级自动登记
pub fn current() -> Arc<KThread> {
    CURRENT.with(|current| {
        current
            .borrow_mut()
            .get_or_insert_with(|| KThread::new("main", DEFAULT_PRIORITY))
            .clone()
    })
}

/// 以指定名字和优先级派生内核线程
pub fn spawn<F, T>(name: &str, priority: u32, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let kthread = KThread::new(name, priority);
    std::thread::Builder::new()
        .name(String::from(name))
        .spawn(move || {
            CURRENT.with(|current| *current.borrow_mut() = Some(kthread));
            f()
        })
        .expect("failed to spawn kernel thread")
}

/// 让出处理器
#[inline]
pub fn yield_now() {
    std::thread::yield_now();
}

/// 阻塞与点名唤醒的凭据。
///
/// 每次等待都新建一枚令牌挂进等待队列；
/// 唤醒方取出令牌后调用 [`WaitToken::wake`]，被唤醒者从
/// [`WaitToken::block`] 返回。`ready` 标志吸收宿主的虚假唤醒。
pub struct WaitToken {
    thread: std::thread::Thread,
    ready: AtomicBool,
    owner: Arc<KThread>,
}

impl WaitToken {
    /// 为当前线程发一枚令牌
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            thread: std::thread::current(),
            ready: AtomicBool::new(false),
            owner: current(),
        })
    }

    /// 挂起，直到令牌被 [`WaitToken::wake`]
    pub fn block(&self) {
        while !self.ready.load(Ordering::Acquire) {
            std::thread::park();
        }
    }

    pub fn wake(&self) {
        self.ready.store(true, Ordering::Release);
        self.thread.unpark();
    }

    /// 令牌所属线程
    #[inline]
    pub fn owner(&self) -> &Arc<KThread> {
        &self.owner
    }
}
