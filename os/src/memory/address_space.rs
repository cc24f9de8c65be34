//! 地址空间：进程的页表、映像与交换文件。
//!
//! 页表项起初都是 [`NEVER_LOADED`]；按需装载时由缺页把
//! [`AddressSpace::load_page`] 拉起来，否则在构造期整体装载。
//! 帧不够时按策略挑牺牲帧，把受害页写到**其属主进程**的
//! 交换文件（`SWAP.<pid>`，创建于进程开始，大小
//! `num_pages * PAGE_SIZE`），再装填新内容。
//! 地址空间销毁时归还页帧并删除交换文件。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, warn};
use spin::Mutex;

use crate::config::{PAGE_SIZE, TLB_SIZE, USER_STACK_SIZE};
use crate::fs::OpenFile;
use crate::kernel::Kernel;

use super::executable::{ExecSegment, Executable};
use super::machine::{Registers, Stats, NEXT_PC_REG, PC_REG, STACK_REG};
use super::tlb::{TeFlag, TranslationEntry, IN_SWAP, NEVER_LOADED};
use super::{Pid, VmError};

pub struct AddressSpace {
    kernel: Arc<Kernel>,
    pid: Pid,
    num_pages: usize,
    page_table: Mutex<Vec<TranslationEntry>>,
    exe: Executable,
    swap: OpenFile,
    swap_path: String,
    /// TLB槽位的进程内FIFO游标
    next_tlb_slot: AtomicUsize,
    /// 预装载时帧不够（且无交换区）的标记
    full_memory: AtomicBool,
}

impl AddressSpace {
    /// 为用户程序建立地址空间。
    ///
    /// 失败（映像损坏、磁盘满、关了交换区且帧不够）时
    /// 半成品随返回值丢弃，占到的帧与交换文件一并回收。
    pub fn new(kernel: &Arc<Kernel>, pid: Pid, exe: Executable) -> Result<Arc<Self>, VmError> {
        let size = exe.size() + USER_STACK_SIZE;
        let num_pages = size.div_ceil(PAGE_SIZE);
        debug!("initializing address space of process {pid}: {num_pages} pages");

        let swap_path = format!("/SWAP.{pid}");
        kernel.fs.create(&swap_path, num_pages * PAGE_SIZE)?;
        let swap = kernel.fs.open(&swap_path)?;

        let page_table = (0..num_pages)
            .map(|vpn| TranslationEntry {
                vpn,
                ppn: NEVER_LOADED,
                flags: TeFlag::Valid.into(),
            })
            .collect();

        let space = Arc::new(Self {
            kernel: kernel.clone(),
            pid,
            num_pages,
            page_table: Mutex::new(page_table),
            exe,
            swap,
            swap_path,
            next_tlb_slot: AtomicUsize::new(0),
            full_memory: AtomicBool::new(false),
        });
        kernel.vm.processes.register(pid, &space);

        if !kernel.vm.config.demand_loading {
            if !kernel.vm.config.swap && num_pages > kernel.vm.coremap.count_clear() {
                space.full_memory.store(true, Ordering::Release);
                return Err(VmError::OutOfMemory);
            }
            for vpn in 0..num_pages {
                if let Err(err) = space.load_page(vpn) {
                    space.full_memory.store(true, Ordering::Release);
                    return Err(err);
                }
            }
        }

        Ok(space)
    }

    #[inline]
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    #[inline]
    pub fn full_memory(&self) -> bool {
        self.full_memory.load(Ordering::Acquire)
    }

    /// 某一页表项的副本
    pub fn entry(&self, vpn: usize) -> TranslationEntry {
        self.page_table.lock()[vpn]
    }

    /// 把一个虚页装进物理内存。
    ///
    /// 1. 试着占一个空帧；
    /// 2. 没有空帧时按策略挑牺牲帧（装填中的除外）并改写归属；
    /// 3. 牺牲页退出TLB，由其属主写到属主的交换文件；
    /// 4. 从映像或本进程交换文件装填；
    /// 5. 改写页表项并摘掉装填标记。
    pub fn load_page(&self, vpn: usize) -> Result<(), VmError> {
        let vm = &self.kernel.vm;

        let frame = match vm.coremap.find(self.pid, vpn) {
            Some(frame) => frame,
            None if !vm.config.swap => return Err(VmError::OutOfMemory),
            None => self.evict_for(vpn)?,
        };
        debug!(
            "loading virtual page {vpn} of process {} into frame {frame}",
            self.pid
        );

        let mut page = vec![0u8; PAGE_SIZE];
        let source = self.page_table.lock()[vpn].ppn;
        match source {
            NEVER_LOADED => {
                self.load_from_executable(vpn, &mut page);
                Stats::bump(&vm.stats.page_ins);
            }
            IN_SWAP => {
                let read = self.swap.read_at(&mut page, vpn * PAGE_SIZE);
                assert_eq!(read, PAGE_SIZE, "corrupt swap read");
                Stats::bump(&vm.stats.swap_reads);
            }
            resident => panic!("virtual page {vpn} already resident at frame {resident}"),
        }
        vm.memory.write_page(frame, &page);

        {
            let mut table = self.page_table.lock();
            let entry = &mut table[vpn];
            entry.ppn = frame as i32;
            entry.flags = TeFlag::Valid | TeFlag::Use | TeFlag::Dirty;
            if self.page_in_code(vpn) {
                entry.flags |= TeFlag::ReadOnly;
            }
        }
        vm.coremap.finish_loading(frame);
        Ok(())
    }

    /// 把受害页写到本进程交换文件的 `vpn * PAGE_SIZE` 处
    pub fn store_page_in_swap(&self, vpn: usize, frame: usize) {
        debug!(
            "storing virtual page {vpn} of process {} into swap",
            self.pid
        );
        let vm = &self.kernel.vm;

        let mut page = vec![0u8; PAGE_SIZE];
        vm.memory.read_page(frame, &mut page);
        let written = self.swap.write_at(&page, vpn * PAGE_SIZE);
        assert_eq!(written, PAGE_SIZE, "corrupt swap write");

        self.page_table.lock()[vpn].ppn = IN_SWAP;
        Stats::bump(&vm.stats.swap_writes);
    }

    /// 上下文切换切回本进程：TLB里都是别人的翻译，整个作废
    pub fn restore_state(&self) {
        if self.kernel.vm.config.use_tlb {
            self.kernel.vm.tlb.invalidate_all();
        }
    }

    /// 上下文切换切出本进程；页表常驻内存，无事可做
    pub fn save_state(&self) {}

    /// 初始化用户寄存器：入口在0，栈顶在地址空间末端稍下
    pub fn init_registers(&self, regs: &mut Registers) {
        *regs = Registers::new();
        regs.write(PC_REG, 0);
        regs.write(NEXT_PC_REG, 4);
        regs.write(STACK_REG, (self.num_pages * PAGE_SIZE - 16) as u32);
    }

    /// 下一个TLB槽位（进程内FIFO覆写）
    pub(crate) fn next_tlb_slot(&self) -> usize {
        self.next_tlb_slot.fetch_add(1, Ordering::Relaxed) % TLB_SIZE
    }

    /// 翻译命中时登记访问位
    pub(crate) fn touch(&self, vpn: usize, writing: bool) {
        let mut table = self.page_table.lock();
        let entry = &mut table[vpn];
        entry.flags |= TeFlag::Use;
        if writing {
            entry.flags |= TeFlag::Dirty;
        }
    }

    /// 时钟算法清访问位
    pub(crate) fn clear_use(&self, vpn: usize) {
        self.page_table.lock()[vpn].flags.remove(TeFlag::Use);
    }
}

impl AddressSpace {
    /// 挑牺牲帧并完成换出，返回腾出来的帧
    fn evict_for(&self, vpn: usize) -> Result<usize, VmError> {
        let vm = &self.kernel.vm;
        let (frame, victim) = vm
            .coremap
            .evict(vm.config.policy, &vm.rng, &vm.processes, self.pid, vpn)
            .ok_or(VmError::OutOfMemory)?;

        // 牺牲页即刻退出地址翻译
        vm.tlb.invalidate(victim.vpn);
        if let Some(owner) = victim.owner.and_then(|pid| vm.processes.get(pid)) {
            owner.store_page_in_swap(victim.vpn, frame);
        }

        Ok(frame)
    }

    /// 从映像装填一页：代码与已初始化数据各取与本页的交集，
    /// 其余字节保持清零（未初始化数据与用户栈）
    fn load_from_executable(&self, vpn: usize, page: &mut [u8]) {
        let page_start = vpn * PAGE_SIZE;
        self.copy_segment(self.exe.code(), page_start, page, |buf, offset| {
            self.exe.read_code_block(buf, offset)
        });
        self.copy_segment(self.exe.init_data(), page_start, page, |buf, offset| {
            self.exe.read_data_block(buf, offset)
        });
    }

    fn copy_segment(
        &self,
        segment: ExecSegment,
        page_start: usize,
        page: &mut [u8],
        read: impl Fn(&mut [u8], usize) -> usize,
    ) {
        if segment.size == 0 {
            return;
        }
        let segment_start = segment.virtual_addr as usize;
        let segment_end = segment_start + segment.size as usize;
        let page_end = page_start + PAGE_SIZE;

        let from = page_start.max(segment_start);
        let to = page_end.min(segment_end);
        if from >= to {
            return;
        }

        let read_bytes = read(&mut page[from - page_start..to - page_start], from - segment_start);
        assert_eq!(read_bytes, to - from);
    }

    /// 本页是否整个落在代码段内（只读）
    fn page_in_code(&self, vpn: usize) -> bool {
        let code = self.exe.code();
        if code.size == 0 {
            return false;
        }
        let page_start = vpn * PAGE_SIZE;
        let code_start = code.virtual_addr as usize;
        let code_end = code_start + code.size as usize;
        page_start >= code_start && page_start + PAGE_SIZE <= code_end
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        let vm = &self.kernel.vm;
        vm.processes.unregister(self.pid);
        for frame in vm.coremap.owned_frames(self.pid) {
            vm.coremap.clear(frame);
        }
        if vm.config.use_tlb {
            vm.tlb.invalidate_all();
        }

        // 交换文件的句柄还握在本结构手里，
        // 这里的删除会挂起到字段释放触发的最后一次关闭
        if let Err(err) = self.kernel.fs.remove(&self.swap_path) {
            warn!("failed to remove {:?}: {err:?}", self.swap_path);
        }
        debug!("deleted address space of process {}", self.pid);
    }
}

/// 进程登记表：进程号到地址空间的弱引用，
/// 换出时借它找到受害页的属主
pub struct ProcessRegistry {
    spaces: Mutex<BTreeMap<Pid, Weak<AddressSpace>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            spaces: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, pid: Pid, space: &Arc<AddressSpace>) {
        self.spaces.lock().insert(pid, Arc::downgrade(space));
    }

    pub fn unregister(&self, pid: Pid) {
        self.spaces.lock().remove(&pid);
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<AddressSpace>> {
        self.spaces.lock().get(&pid)?.upgrade()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
