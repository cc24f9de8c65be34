//! 页面替换策略：随机、FIFO、增强时钟。
//!
//! 候选帧必须已有归属且不在装填中。时钟算法第一圈找
//! `use=0, dirty=0`，第二圈找 `use=0, dirty=1` 并顺手清 `use`，
//! 两轮之内必有结果；一无所获（帧全在装填中）才放弃。

use spin::Mutex;

use crate::config::ReplacementPolicy;

use super::address_space::ProcessRegistry;
use super::coremap::CoremapInner;
use super::tlb::TeFlag;

pub(crate) fn pick_victim(
    inner: &mut CoremapInner,
    policy: ReplacementPolicy,
    rng: &Mutex<Prng>,
    registry: &ProcessRegistry,
) -> Option<usize> {
    match policy {
        ReplacementPolicy::Random => random(inner, rng),
        ReplacementPolicy::Fifo => fifo(inner),
        ReplacementPolicy::Clock => clock(inner, registry),
    }
}

#[inline]
fn evictable(inner: &CoremapInner, frame: usize) -> bool {
    let info = &inner.frames[frame];
    info.owner.is_some() && !info.loading
}

/// 对所有可换帧均匀随机
fn random(inner: &CoremapInner, rng: &Mutex<Prng>) -> Option<usize> {
    let candidates: Vec<usize> =
        (0..inner.frames.len()).filter(|&frame| evictable(inner, frame)).collect();
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.lock().below(candidates.len())])
}

/// 装入次序最旧者先走
fn fifo(inner: &CoremapInner) -> Option<usize> {
    inner
        .fifo
        .iter()
        .copied()
        .find(|&frame| evictable(inner, frame))
}

/// 增强时钟
fn clock(inner: &mut CoremapInner, registry: &ProcessRegistry) -> Option<usize> {
    let num_frames = inner.frames.len();

    let flags_of = |inner: &CoremapInner, frame: usize| {
        let info = &inner.frames[frame];
        let space = registry.get(info.owner?)?;
        Some(space.entry(info.vpn).flags)
    };

    for _round in 0..2 {
        // 第一圈：未用且干净
        for _ in 0..num_frames {
            let frame = inner.hand;
            inner.hand = (inner.hand + 1) % num_frames;
            if !evictable(inner, frame) {
                continue;
            }
            if let Some(flags) = flags_of(inner, frame) {
                if !flags.contains(TeFlag::Use) && !flags.contains(TeFlag::Dirty) {
                    return Some(frame);
                }
            }
        }
        // 第二圈：未用且脏，沿途清掉用过标记
        for _ in 0..num_frames {
            let frame = inner.hand;
            inner.hand = (inner.hand + 1) % num_frames;
            if !evictable(inner, frame) {
                continue;
            }
            let info = inner.frames[frame].clone();
            let Some(flags) = flags_of(inner, frame) else {
                continue;
            };
            if !flags.contains(TeFlag::Use) {
                if flags.contains(TeFlag::Dirty) {
                    return Some(frame);
                }
            } else if let Some(space) = registry.get(info.owner.unwrap()) {
                space.clear_use(info.vpn);
            }
        }
    }

    // 极端情况：页表查不到位，退回首个可换帧
    (0..num_frames).find(|&frame| evictable(inner, frame))
}

/// xorshift64* 伪随机数，内核里不依赖宿主熵源
pub(crate) struct Prng(u64);

impl Prng {
    pub(crate) fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    pub(crate) fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}
