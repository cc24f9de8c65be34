//! 模拟MMU的地址翻译。
//!
//! 开启TLB时翻译只看TLB，未命中报缺页；
//! 关闭时直接走进程页表。对只读页的写翻译报致命故障。
//! [`read_user`] / [`write_user`] 是“翻译——缺页——重试”的
//! 完整回路，测试与系统调用的数据搬运走它们。

use std::sync::Arc;

use crate::config::PAGE_SIZE;

use super::page_fault;
use super::tlb::TeFlag;
use super::{AddressSpace, VmError};

/// 翻译失败的形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuFault {
    /// 无可用翻译，进入缺页处理
    PageFault,
    /// 对只读页写入
    ReadOnly,
}

/// 把虚地址翻译成物理地址，顺带登记访问位
pub fn translate(space: &AddressSpace, vaddr: usize, writing: bool) -> Result<usize, MmuFault> {
    let vpn = vaddr / PAGE_SIZE;
    let vm = &space.kernel().vm;

    let entry = if vm.config.use_tlb {
        vm.tlb.lookup(vpn).ok_or(MmuFault::PageFault)?
    } else {
        if vpn >= space.num_pages() {
            return Err(MmuFault::PageFault);
        }
        let entry = space.entry(vpn);
        if !entry.is_resident() {
            return Err(MmuFault::PageFault);
        }
        entry
    };

    if writing && entry.flags.contains(TeFlag::ReadOnly) {
        return Err(MmuFault::ReadOnly);
    }

    space.touch(vpn, writing);
    Ok(entry.ppn as usize * PAGE_SIZE + vaddr % PAGE_SIZE)
}

/// 读用户空间的一个字节，按需装页
pub fn read_user(space: &Arc<AddressSpace>, vaddr: usize) -> Result<u8, VmError> {
    loop {
        match translate(space, vaddr, false) {
            Ok(paddr) => return Ok(space.kernel().vm.memory.read_byte(paddr)),
            Err(MmuFault::ReadOnly) => unreachable!("read translation cannot fault read-only"),
            Err(MmuFault::PageFault) => page_fault::handle_page_fault(space, vaddr)?,
        }
    }
}

/// 写用户空间的一个字节，按需装页；写只读页即进程致命
pub fn write_user(space: &Arc<AddressSpace>, vaddr: usize, byte: u8) -> Result<(), VmError> {
    loop {
        match translate(space, vaddr, true) {
            Ok(paddr) => {
                space.kernel().vm.memory.write_byte(paddr, byte);
                return Ok(());
            }
            Err(MmuFault::ReadOnly) => return Err(VmError::ReadOnlyViolation),
            Err(MmuFault::PageFault) => page_fault::handle_page_fault(space, vaddr)?,
        }
    }
}
