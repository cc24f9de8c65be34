//! 位图：以比特为单位的分配记账，
//! 既用于空闲扇区（持久化在普通文件里），也用于物理页帧。
//!
//! 本身不带锁，互斥由调用者负责。

use alloc::vec;
use alloc::vec::Vec;

use crate::cache::DiskCache;
use crate::fops;
use crate::layout::FileHeader;

/// 每组比特数
const BITS_PER_WORD: usize = u32::BITS as usize;

/// 定长位图，`1` 表示已分配
#[derive(Debug, Clone)]
pub struct Bitmap {
    words: Vec<u32>,
    nbits: usize,
}

impl Bitmap {
    /// 创建全空位图，指示 `nbits` 个单元
    pub fn new(nbits: usize) -> Self {
        assert!(nbits > 0);
        Self {
            words: vec![0; nbits.div_ceil(BITS_PER_WORD)],
            nbits,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nbits
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nbits == 0
    }

    /// 置第 `which` 位
    #[inline]
    pub fn mark(&mut self, which: usize) {
        assert!(which < self.nbits);
        self.words[which / BITS_PER_WORD] |= 1 << (which % BITS_PER_WORD);
    }

    /// 清第 `which` 位
    #[inline]
    pub fn clear(&mut self, which: usize) {
        assert!(which < self.nbits);
        self.words[which / BITS_PER_WORD] &= !(1 << (which % BITS_PER_WORD));
    }

    /// 第 `which` 位是否已置
    #[inline]
    pub fn test(&self, which: usize) -> bool {
        assert!(which < self.nbits);
        self.words[which / BITS_PER_WORD] & (1 << (which % BITS_PER_WORD)) != 0
    }

    /// 寻找首个空位并将其置位，返回其编号；
    /// 位图用尽时返回空。
    pub fn find(&mut self) -> Option<usize> {
        let (word_index, ingroup_index) = self
            .words
            .iter()
            .enumerate()
            .find_map(|(word_index, &bits)| {
                (bits != u32::MAX).then(|| (word_index, bits.trailing_ones() as usize))
            })?;

        let which = word_index * BITS_PER_WORD + ingroup_index;
        // 末组中超出 nbits 的比特永远视作已分配
        if which >= self.nbits {
            return None;
        }

        self.words[word_index] |= 1 << ingroup_index;
        Some(which)
    }

    /// 空位个数
    pub fn count_clear(&self) -> usize {
        let set: usize = self
            .words
            .iter()
            .map(|bits| bits.count_ones() as usize)
            .sum();
        self.nbits - set
    }

    /// 序列化后的字节数，向扇区内对齐到整字
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.words.len() * core::mem::size_of::<u32>()
    }

    /// 从位图文件的内容恢复位图
    pub fn fetch_from(&mut self, cache: &DiskCache, header: &FileHeader) {
        let mut bytes = vec![0u8; self.byte_len()];
        let read = fops::read_at(cache, header, 0, &mut bytes);
        assert_eq!(read, bytes.len());

        for (word, chunk) in self.words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes(chunk.try_into().unwrap());
        }
    }

    /// 把位图写入其文件
    pub fn write_back(&self, cache: &DiskCache, header: &FileHeader) {
        let mut bytes = Vec::with_capacity(self.byte_len());
        for word in &self.words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        let written = fops::write_at(cache, header, 0, &bytes);
        assert_eq!(written, bytes.len());
    }
}
