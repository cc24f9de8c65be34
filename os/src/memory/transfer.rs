//! 用户空间与内核之间的数据搬运。
//!
//! 系统调用层传进来的都是用户虚地址，逐字节经
//! [`mmu`](super::mmu) 的翻译-缺页回路搬运；
//! 字符串以NUL结尾，超过上限视作坏指针。

use std::sync::Arc;

use super::mmu::{read_user, write_user};
use super::{AddressSpace, VmError};

/// 从用户空间读 `len` 个字节
pub fn read_buffer_from_user(
    space: &Arc<AddressSpace>,
    vaddr: usize,
    len: usize,
) -> Result<Vec<u8>, VmError> {
    let mut buffer = Vec::with_capacity(len);
    for offset in 0..len {
        buffer.push(read_user(space, vaddr + offset)?);
    }
    Ok(buffer)
}

/// 把 `buffer` 写进用户空间
pub fn write_buffer_to_user(
    space: &Arc<AddressSpace>,
    vaddr: usize,
    buffer: &[u8],
) -> Result<(), VmError> {
    for (offset, &byte) in buffer.iter().enumerate() {
        write_user(space, vaddr + offset, byte)?;
    }
    Ok(())
}

/// 读用户空间的NUL结尾字符串，最多 `max_len` 字节（不含NUL）。
/// 上限之内没有遇到NUL按坏地址处理。
pub fn read_string_from_user(
    space: &Arc<AddressSpace>,
    vaddr: usize,
    max_len: usize,
) -> Result<String, VmError> {
    let mut bytes = Vec::new();
    for offset in 0..=max_len {
        let byte = read_user(space, vaddr + offset)?;
        if byte == 0 {
            return String::from_utf8(bytes).map_err(|_| VmError::BadAddress);
        }
        bytes.push(byte);
    }
    Err(VmError::BadAddress)
}
