//! # 虚存子系统
//!
//! 用户地址空间的支撑：按需装载、TLB、向各进程交换文件的页面替换。
//! 自底向上为机器内存与寄存器（[`machine`]）、翻译条目与TLB
//! （[`tlb`]）、页帧记账（[`coremap`]）加替换策略、
//! 地址空间（[`address_space`]）与缺页入口（[`page_fault`]）。

pub mod address_space;
pub mod coremap;
pub mod executable;
pub mod machine;
pub mod mmu;
pub mod page_fault;
mod policy;
pub mod tlb;
pub mod transfer;

pub use self::address_space::{AddressSpace, ProcessRegistry};
pub use self::coremap::{Coremap, FrameInfo};
pub use self::executable::Executable;
pub use self::machine::{MainMemory, Registers, Stats};
pub use self::tlb::{TeFlag, TranslationEntry, Tlb, IN_SWAP, NEVER_LOADED};

use sector_fs::FsError;
use spin::Mutex;

use crate::config::VmConfig;
use self::policy::Prng;

/// 进程号；交换文件按它命名
pub type Pid = u32;

/// 虚存操作的失败缘由
#[derive(Debug)]
pub enum VmError {
    /// 页帧耗尽且没有交换区可用
    OutOfMemory,
    /// 虚地址越出地址空间
    BadAddress,
    /// 对只读页写入，进程应被终结
    ReadOnlyViolation,
    /// 可执行文件的头不合法
    BadExecutable,
    /// 文件系统层的失败（交换文件、可执行文件）
    Fs(FsError),
}

impl From<FsError> for VmError {
    fn from(err: FsError) -> Self {
        Self::Fs(err)
    }
}

/// 虚存子系统的全部共享状态
pub struct Vm {
    pub config: VmConfig,
    pub memory: MainMemory,
    pub tlb: Tlb,
    pub coremap: Coremap,
    pub processes: ProcessRegistry,
    pub stats: Stats,
    pub(crate) rng: Mutex<Prng>,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Self {
            memory: MainMemory::new(config.num_phys_pages),
            tlb: Tlb::new(),
            coremap: Coremap::new(config.num_phys_pages),
            processes: ProcessRegistry::new(),
            stats: Stats::default(),
            rng: Mutex::new(Prng::new(config.seed)),
            config,
        }
    }
}
