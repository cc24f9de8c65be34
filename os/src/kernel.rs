//! 内核上下文：把全进程共享的单例收进一个显式的值。
//!
//! 文件系统、机器内存、TLB、核心映射表、进程登记与统计
//! 都吊在 [`Kernel`] 下，开机构造、关机随值销毁，
//! 不经任何隐藏全局量。

use std::sync::Arc;

use block_dev::BlockDevice;
use log::info;

use crate::config::VmConfig;
use crate::fs::FileSystem;
use crate::memory::machine::Stats;
use crate::memory::{AddressSpace, Executable, Pid, Vm, VmError};

pub struct Kernel {
    pub fs: Arc<FileSystem>,
    pub vm: Vm,
}

impl Kernel {
    /// 开机：接管磁盘（可选格式化）并摆好虚存
    pub fn new(device: Arc<dyn BlockDevice>, config: VmConfig, format: bool) -> Arc<Self> {
        Arc::new(Self {
            fs: FileSystem::new(device, format),
            vm: Vm::new(config),
        })
    }

    /// `Exec` 的核心：打开映像、解析头、装起地址空间。
    /// 失败时半成品已被拆除，系统调用层把它折算成 -1。
    pub fn exec(self: &Arc<Self>, path: &str, pid: Pid) -> Result<Arc<AddressSpace>, VmError> {
        let file = self.fs.open(path)?;
        let exe = Executable::parse(file)?;
        AddressSpace::new(self, pid, exe)
    }

    /// `Halt` 的核心：汇报统计并留下文件系统的收尾日志
    pub fn halt(&self) {
        let stats = &self.vm.stats;
        info!(
            "machine halting: {} tlb misses, {} pages from executables, {} swap reads, {} swap writes",
            Stats::count(&stats.tlb_misses),
            Stats::count(&stats.page_ins),
            Stats::count(&stats.swap_reads),
            Stats::count(&stats.swap_writes),
        );
        self.fs.print();
    }
}
