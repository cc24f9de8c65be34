//! 信道：机器字的会合式传递。
//!
//! `send` 把字暂存后要一直等到配对的 `receive` 取走它才返回；
//! `receive` 在没有字可取时挂起。暂存区由绑定在同一把锁上的
//! 两个条件变量协调。

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use super::{Condition, Lock};

pub struct Channel {
    lock: Arc<Lock>,
    /// 发送方等待自己的字被取走
    senders: Condition,
    /// 接收方等待有字可取
    receivers: Condition,
    /// (暂存序号, 字)
    staging: Mutex<VecDeque<(u64, usize)>>,
    next_seq: Mutex<u64>,
}

impl Channel {
    pub fn new(name: &'static str) -> Self {
        let lock = Arc::new(Lock::new(name));
        Self {
            senders: Condition::new(name, lock.clone()),
            receivers: Condition::new(name, lock.clone()),
            lock,
            staging: Mutex::new(VecDeque::new()),
            next_seq: Mutex::new(0),
        }
    }

    /// 暂存一个字并等待它被接收
    pub fn send(&self, word: usize) {
        self.lock.acquire();

        let seq = {
            let mut next_seq = self.next_seq.lock();
            let seq = *next_seq;
            *next_seq += 1;
            seq
        };
        self.staging.lock().push_back((seq, word));
        self.receivers.signal();

        // 自己的字还在暂存区就继续等
        while self.staging.lock().iter().any(|&(s, _)| s == seq) {
            self.senders.wait();
        }

        self.lock.release();
    }

    /// 取走最早暂存的字
    pub fn receive(&self) -> usize {
        self.lock.acquire();

        loop {
            if let Some((_, word)) = self.staging.lock().pop_front() {
                // 对应的发送方（以及排在后面的）都来重查暂存区
                self.senders.broadcast();
                self.lock.release();
                return word;
            }
            self.receivers.wait();
        }
    }
}
