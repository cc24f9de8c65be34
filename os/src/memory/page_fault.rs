//! 缺页处理：TLB未命中走到这里。
//!
//! 取出错地址、算出虚页号；页不驻留就拉
//! [`AddressSpace::load_page`]，然后把页表项按进程内FIFO
//! 填进TLB槽位。每次未命中都计入统计。

use std::sync::Arc;

use crate::config::PAGE_SIZE;

use super::machine::Stats;
use super::{AddressSpace, VmError};

pub fn handle_page_fault(space: &Arc<AddressSpace>, bad_vaddr: usize) -> Result<(), VmError> {
    let vm = &space.kernel().vm;
    Stats::bump(&vm.stats.tlb_misses);

    let vpn = bad_vaddr / PAGE_SIZE;
    if vpn >= space.num_pages() {
        return Err(VmError::BadAddress);
    }

    if !space.entry(vpn).is_resident() {
        space.load_page(vpn)?;
    }

    if vm.config.use_tlb {
        vm.tlb.install(space.next_tlb_slot(), space.entry(vpn));
    }
    Ok(())
}
