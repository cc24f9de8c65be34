//! 模拟机器的内存、寄存器与统计。
//!
//! CPU本体与异常向量是外部协作者；这里只提供
//! 虚存子系统触到的那几样：按帧读写的物理内存、
//! 供 `init_registers` 填写的寄存器堆、若干计数器。

use std::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::config::PAGE_SIZE;

/// 机器寄存器个数
pub const NUM_TOTAL_REGS: usize = 40;
/// 栈指针
pub const STACK_REG: usize = 29;
/// 程序计数器
pub const PC_REG: usize = 34;
/// 下一条指令地址（延迟槽）
pub const NEXT_PC_REG: usize = 35;
/// 上一条指令地址
pub const PREV_PC_REG: usize = 36;
/// 引发缺页的虚地址
pub const BAD_VADDR_REG: usize = 39;

/// 物理内存，按页帧读写
pub struct MainMemory {
    frames: Mutex<Vec<u8>>,
}

impl MainMemory {
    pub fn new(num_pages: usize) -> Self {
        Self {
            frames: Mutex::new(vec![0; num_pages * PAGE_SIZE]),
        }
    }

    pub fn read_page(&self, frame: usize, buf: &mut [u8]) {
        let frames = self.frames.lock();
        let start = frame * PAGE_SIZE;
        buf[..PAGE_SIZE].copy_from_slice(&frames[start..start + PAGE_SIZE]);
    }

    pub fn write_page(&self, frame: usize, buf: &[u8]) {
        let mut frames = self.frames.lock();
        let start = frame * PAGE_SIZE;
        frames[start..start + PAGE_SIZE].copy_from_slice(&buf[..PAGE_SIZE]);
    }

    pub fn read_byte(&self, paddr: usize) -> u8 {
        self.frames.lock()[paddr]
    }

    pub fn write_byte(&self, paddr: usize, byte: u8) {
        self.frames.lock()[paddr] = byte;
    }
}

/// 用户态寄存器堆
#[derive(Clone)]
pub struct Registers([u32; NUM_TOTAL_REGS]);

impl Registers {
    pub fn new() -> Self {
        Self([0; NUM_TOTAL_REGS])
    }

    #[inline]
    pub fn read(&self, reg: usize) -> u32 {
        self.0[reg]
    }

    #[inline]
    pub fn write(&mut self, reg: usize, value: u32) {
        self.0[reg] = value;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// 虚存统计
#[derive(Debug, Default)]
pub struct Stats {
    pub tlb_misses: AtomicUsize,
    /// 从可执行文件装入的页数
    pub page_ins: AtomicUsize,
    pub swap_reads: AtomicUsize,
    pub swap_writes: AtomicUsize,
}

impl Stats {
    #[inline]
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
