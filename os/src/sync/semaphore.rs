//! 信号量：非负计数器。
//! 等待者按FIFO放行；释放时若有等待者，名额直接移交，
//! 计数器不经过先加后减。

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use crate::thread::WaitToken;

pub struct Semaphore {
    inner: Mutex<SemInner>,
}

struct SemInner {
    permits: usize,
    wait_queue: VecDeque<Arc<WaitToken>>,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Mutex::new(SemInner {
                permits,
                wait_queue: VecDeque::new(),
            }),
        }
    }

    /// P操作：计数为零时挂起，否则取走一个名额
    pub fn acquire(&self) {
        let token = {
            let mut inner = self.inner.lock();
            if inner.permits > 0 {
                inner.permits -= 1;
                return;
            }
            let token = WaitToken::new();
            inner.wait_queue.push_back(token.clone());
            token
        };

        token.block();
    }

    /// V操作：有等待者则移交名额并唤醒队首，否则归还计数
    pub fn release(&self) {
        let waiter = {
            let mut inner = self.inner.lock();
            match inner.wait_queue.pop_front() {
                Some(waiter) => waiter,
                None => {
                    inner.permits += 1;
                    return;
                }
            }
        };

        waiter.wake();
    }
}
