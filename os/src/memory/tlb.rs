//! 翻译条目与TLB。
//!
//! 页表项的 `ppn` 同时编码驻留状态：非负为所在页帧，
//! [`NEVER_LOADED`] 表示从未装入（内容还在可执行文件里），
//! [`IN_SWAP`] 表示躺在本进程交换文件偏移
//! `vpn * PAGE_SIZE` 处。
//!
//! 开启TLB后地址翻译只查TLB；未命中触发缺页处理，
//! 槽位按进程内FIFO覆写，上下文切换时整个作废。

use enumflags2::{bitflags, BitFlags};
use spin::Mutex;

use crate::config::TLB_SIZE;

/// 从未装入过
pub const NEVER_LOADED: i32 = -1;
/// 驻留在交换文件里
pub const IN_SWAP: i32 = -2;

/// 翻译条目的标志位
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeFlag {
    Valid = 0b0001,
    ReadOnly = 0b0010,
    Use = 0b0100,
    Dirty = 0b1000,
}

/// 一条地址翻译：虚页号到物理页帧
#[derive(Debug, Clone, Copy)]
pub struct TranslationEntry {
    pub vpn: usize,
    pub ppn: i32,
    pub flags: BitFlags<TeFlag>,
}

impl TranslationEntry {
    pub fn invalid(vpn: usize) -> Self {
        Self {
            vpn,
            ppn: NEVER_LOADED,
            flags: BitFlags::empty(),
        }
    }

    #[inline]
    pub fn is_resident(&self) -> bool {
        self.ppn >= 0
    }
}

/// 模拟的翻译后备缓冲
pub struct Tlb {
    entries: Mutex<[Option<TranslationEntry>; TLB_SIZE]>,
}

impl Tlb {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new([None; TLB_SIZE]),
        }
    }

    /// 覆写一个槽位
    pub fn install(&self, slot: usize, entry: TranslationEntry) {
        self.entries.lock()[slot % TLB_SIZE] = Some(entry);
    }

    /// 查找虚页的有效条目
    pub fn lookup(&self, vpn: usize) -> Option<TranslationEntry> {
        self.entries
            .lock()
            .iter()
            .flatten()
            .find(|entry| entry.vpn == vpn && entry.flags.contains(TeFlag::Valid))
            .copied()
    }

    /// 作废某一虚页的条目（页被换出时）
    pub fn invalidate(&self, vpn: usize) {
        let mut entries = self.entries.lock();
        for slot in entries.iter_mut() {
            if slot.is_some_and(|entry| entry.vpn == vpn) {
                *slot = None;
            }
        }
    }

    /// 作废全部条目（上下文切换时）
    pub fn invalidate_all(&self) {
        *self.entries.lock() = [None; TLB_SIZE];
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}
