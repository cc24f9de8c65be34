//! 锁：二元信号量加持有者身份。
//!
//! 同一线程重复获取视为内核缺陷，直接panic。
//!
//! ## 优先级继承
//!
//! 高优先级（数值更小）线程请求已被低优先级线程持有的锁时，
//! 把自己的优先级捐赠给持有者；持有者释放时回到基准优先级。
//! 只记录单层捐赠中最强的一次。

use std::sync::Arc;

use spin::Mutex;

use crate::thread;
use crate::thread::KThread;

use super::Semaphore;

pub struct Lock {
    name: &'static str,
    semaphore: Semaphore,
    holder: Mutex<Option<Arc<KThread>>>,
}

impl Lock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            semaphore: Semaphore::new(1),
            holder: Mutex::new(None),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn acquire(&self) {
        let me = thread::current();

        {
            let holder = self.holder.lock();
            if let Some(holder) = holder.as_ref() {
                assert!(
                    !Arc::ptr_eq(holder, &me),
                    "lock {:?} re-acquired by holder {:?}",
                    self.name,
                    me.name()
                );
                // 把更高的优先级借给持有者
                if holder.priority() > me.priority() {
                    holder.donate_priority(me.priority());
                }
            }
        }

        self.semaphore.acquire();
        *self.holder.lock() = Some(me);
    }

    pub fn release(&self) {
        {
            let mut holder = self.holder.lock();
            let owner = holder.take().unwrap_or_else(|| {
                panic!("lock {:?} released while not held", self.name)
            });
            assert!(
                Arc::ptr_eq(&owner, &thread::current()),
                "lock {:?} released by non-holder",
                self.name
            );
            owner.restore_priority();
        }

        self.semaphore.release();
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.holder
            .lock()
            .as_ref()
            .is_some_and(|holder| Arc::ptr_eq(holder, &thread::current()))
    }
}
