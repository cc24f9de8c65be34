//! 同步原语。
//!
//! 信号量是地基；锁建立在二元信号量上并记录持有者，
//! 借此实现优先级继承；条件变量按优先级放行等待者；
//! 信道用一把锁加两个条件变量实现会合式传值。
//!
//! 原语内部的原子性由短临界区的自旋锁充当
//! ——单处理器内核里短暂屏蔽中断的宿主等价物。

mod channel;
mod condvar;
mod lock;
mod semaphore;

pub use self::channel::Channel;
pub use self::condvar::Condition;
pub use self::lock::Lock;
pub use self::semaphore::Semaphore;
