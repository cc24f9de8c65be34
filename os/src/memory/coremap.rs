//! 核心映射表：页帧位图加反向映射。
//!
//! 每个物理页帧记着占用它的进程、对应虚页、
//! 以及是否正被装填（装填中的帧不做替换牺牲品）。
//! 全部帧级操作由同一把锁串行化。

use std::collections::VecDeque;
use std::mem;

use sector_fs::Bitmap;
use spin::Mutex;

use crate::config::ReplacementPolicy;

use super::address_space::ProcessRegistry;
use super::policy::{self, Prng};
use super::Pid;

/// 一个页帧的反向登记
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    pub owner: Option<Pid>,
    pub vpn: usize,
    /// 正被装填，换页时跳过
    pub loading: bool,
}

pub struct Coremap {
    inner: Mutex<CoremapInner>,
}

pub(crate) struct CoremapInner {
    pub(crate) bitmap: Bitmap,
    pub(crate) frames: Vec<FrameInfo>,
    /// 装入次序，队首最旧
    pub(crate) fifo: VecDeque<usize>,
    /// 时钟指针
    pub(crate) hand: usize,
}

impl Coremap {
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(CoremapInner {
                bitmap: Bitmap::new(num_frames),
                frames: vec![FrameInfo::default(); num_frames],
                fifo: VecDeque::new(),
                hand: 0,
            }),
        }
    }

    /// 占一个空帧并登记归属，返回帧号；内存占满时返回空。
    /// 新帧带着 `loading` 标记，装填完毕由
    /// [`Coremap::finish_loading`] 摘掉。
    pub fn find(&self, owner: Pid, vpn: usize) -> Option<usize> {
        let mut inner = self.inner.lock();
        let frame = inner.bitmap.find()?;
        inner.frames[frame] = FrameInfo {
            owner: Some(owner),
            vpn,
            loading: true,
        };
        inner.fifo.push_back(frame);
        Some(frame)
    }

    pub fn finish_loading(&self, frame: usize) {
        self.inner.lock().frames[frame].loading = false;
    }

    /// 归还一个页帧
    pub fn clear(&self, frame: usize) {
        let mut inner = self.inner.lock();
        if inner.bitmap.test(frame) {
            inner.bitmap.clear(frame);
        }
        inner.frames[frame] = FrameInfo::default();
        inner.fifo.retain(|&queued| queued != frame);
    }

    pub fn count_clear(&self) -> usize {
        self.inner.lock().bitmap.count_clear()
    }

    pub fn frame_info(&self, frame: usize) -> FrameInfo {
        self.inner.lock().frames[frame].clone()
    }

    /// 某进程占用的全部页帧
    pub fn owned_frames(&self, pid: Pid) -> Vec<usize> {
        self.inner
            .lock()
            .frames
            .iter()
            .enumerate()
            .filter(|(_, info)| info.owner == Some(pid))
            .map(|(frame, _)| frame)
            .collect()
    }

    /// 按策略挑一个牺牲帧并改写归属为 `(new_owner, new_vpn)`，
    /// 返回帧号与旧登记。所有帧都在装填中时返回空。
    pub(crate) fn evict(
        &self,
        policy: ReplacementPolicy,
        rng: &Mutex<Prng>,
        registry: &ProcessRegistry,
        new_owner: Pid,
        new_vpn: usize,
    ) -> Option<(usize, FrameInfo)> {
        let mut inner = self.inner.lock();
        let frame = policy::pick_victim(&mut inner, policy, rng, registry)?;

        let old = mem::replace(
            &mut inner.frames[frame],
            FrameInfo {
                owner: Some(new_owner),
                vpn: new_vpn,
                loading: true,
            },
        );
        // 挪到装入次序的队尾
        inner.fifo.retain(|&queued| queued != frame);
        inner.fifo.push_back(frame);

        Some((frame, old))
    }
}
