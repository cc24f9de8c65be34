//! 条件变量：与一把锁绑定。
//!
//! `wait` 原子地释放锁、挂起、醒来后重新拿锁；
//! 等待队列按当时的有效优先级排序（同优先级FIFO），
//! `signal` 唤醒最高优先级者。`signal` / `broadcast`
//! 都要求绑定的锁在手。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use spin::Mutex;

use crate::thread::WaitToken;

use super::Lock;

pub struct Condition {
    name: &'static str,
    lock: Arc<Lock>,
    /// (有效优先级, 入队序号, 令牌)，升序
    waiters: Mutex<Vec<(u32, u64, Arc<WaitToken>)>>,
    ticket: AtomicU64,
}

impl Condition {
    pub fn new(name: &'static str, lock: Arc<Lock>) -> Self {
        Self {
            name,
            lock,
            waiters: Mutex::new(Vec::new()),
            ticket: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn wait(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "condition {:?} waited without its lock",
            self.name
        );

        let token = WaitToken::new();
        let priority = token.owner().priority();
        let seq = self.ticket.fetch_add(1, Ordering::Relaxed);
        {
            let mut waiters = self.waiters.lock();
            let at = waiters
                .iter()
                .position(|&(p, s, _)| (p, s) > (priority, seq))
                .unwrap_or(waiters.len());
            waiters.insert(at, (priority, seq, token.clone()));
        }

        self.lock.release();
        token.block();
        self.lock.acquire();
    }

    /// 唤醒优先级最高的等待者
    pub fn signal(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "condition {:?} signaled without its lock",
            self.name
        );

        let waiter = {
            let mut waiters = self.waiters.lock();
            if waiters.is_empty() {
                return;
            }
            waiters.remove(0).2
        };
        waiter.wake();
    }

    /// 唤醒全部等待者
    pub fn broadcast(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "condition {:?} broadcast without its lock",
            self.name
        );

        let drained: Vec<_> = self.waiters.lock().drain(..).collect();
        for (_, _, waiter) in drained {
            waiter.wake();
        }
    }
}
