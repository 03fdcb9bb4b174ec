use std::fmt;

use crate::{
    error::{Result, SegmentError, check_offset_and_count},
    pool::SegmentPool,
    ring::SegmentRing,
    segment::{Segment, SlotId},
    stream::Source,
};

/// `Buffer` 是由分段环承载的内存字节队列：尾部追加、头部消费，缓冲之间搬运时只改链接。
///
/// # 设计动机（Why）
/// - I/O 流水线需要在多个阶段之间大量转交字节；把数据切成固定尺寸的分段后，
///   “把 n 个字节从缓冲 A 移到缓冲 B”大多只需摘下、挂上分段，成本与分段数而非字节数成正比；
/// - 排空的分段立刻交还 [`SegmentPool`]，稳态下几乎不再触发新分配。
///
/// # 结构设计（How）
/// - `ring` 以 arena 形式保存分段环，头部为最老数据，头部的前驱即尾部；
/// - `size` 缓存全部分段未读字节之和，读写路径与拆分/拼接路径同步维护；
/// - 只有写端尾部分段才会接收追加；尾部为只读视图或已写满时，向池申请新分段挂到尾部。
///
/// # 契约说明（What）
/// - `size == 0` 当且仅当环为空；环上不存在空分段；
/// - 参数/范围错误在修改任何状态之前同步返回；
/// - 缓冲不是线程安全的共享结构，所有修改都要求 `&mut self`；`Drop` 时环上分段全部交还池。
pub struct Buffer {
    ring: SegmentRing,
    size: usize,
    pool: SegmentPool,
}

impl Buffer {
    /// 创建使用进程级共享池的空缓冲。
    pub fn new() -> Self {
        Self::with_pool(SegmentPool::shared())
    }

    /// 创建使用指定池的空缓冲。
    pub fn with_pool(pool: SegmentPool) -> Self {
        Self {
            ring: SegmentRing::new(),
            size: 0,
            pool,
        }
    }

    /// 未读字节总数。
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// 环上的分段数量。
    pub fn segment_count(&self) -> usize {
        self.ring.len()
    }

    /// 按从头到尾的顺序观察分段。
    pub fn segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.ring.iter()
    }

    /// 本缓冲申请与归还分段所用的池。
    pub fn pool(&self) -> &SegmentPool {
        &self.pool
    }

    /// 返回至少还能追加 `minimum_capacity` 字节的尾部分段，必要时从池中取新分段挂到尾部。
    fn writable_segment(&mut self, minimum_capacity: usize) -> SlotId {
        assert!(
            minimum_capacity >= 1 && minimum_capacity <= self.pool.segment_size(),
            "Buffer::writable_segment 的最小容量必须位于 [1, segment_size]"
        );
        if let Some(tail) = self.ring.tail() {
            if self.ring.get(tail).writable_capacity() >= minimum_capacity {
                return tail;
            }
        }
        let fresh = self.pool.take();
        self.ring.push_back(fresh)
    }

    /// 追加单个字节。
    pub fn write_byte(&mut self, byte: u8) {
        let tail = self.writable_segment(1);
        self.ring.get_mut(tail).append(&[byte]);
        self.size += 1;
    }

    /// 追加整个切片。
    pub fn write_slice(&mut self, src: &[u8]) {
        let mut rest = src;
        while !rest.is_empty() {
            let tail = self.writable_segment(1);
            let copied = self.ring.get_mut(tail).append(rest);
            rest = &rest[copied..];
        }
        self.size += src.len();
    }

    /// 追加 `src[offset..offset + byte_count]`；区间越界时返回 `OutOfRange` 且不写入任何字节。
    pub fn write_range(&mut self, src: &[u8], offset: usize, byte_count: usize) -> Result<()> {
        check_offset_and_count(src.len(), offset, byte_count)?;
        self.write_slice(&src[offset..offset + byte_count]);
        Ok(())
    }

    /// 以 UTF-8 编码追加字符串。
    pub fn write_str(&mut self, text: &str) {
        self.write_slice(text.as_bytes());
    }

    /// 把 `source` 头部的 `byte_count` 个字节拼接到本缓冲尾部。
    ///
    /// # 实现策略（How）
    /// 1. 只需要源头部分段的一个前缀时：若本缓冲尾部写端放得下，直接拷贝进尾部后结束，
    ///    这是唯一会复制载荷的路径；否则把源头部分段拆成“待搬运前缀 + 剩余部分”；
    /// 2. 摘下源的头部分段挂到本缓冲尾部，随后尝试把它压缩进新的前驱；
    /// 3. 重复直到搬完。
    ///
    /// # 契约说明（What）
    /// - `byte_count > source.size()` 时返回 `OutOfRange`，两个缓冲均不变；
    /// - 成功后 `source.size()` 恰好减少 `byte_count`，本缓冲恰好增加 `byte_count`，字节顺序不变；
    /// - 把缓冲拼接到自身无法通过借用检查，因而无需运行期判断。
    pub fn write_buffer(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        check_offset_and_count(source.size, 0, byte_count)?;
        let mut remaining = byte_count;
        while remaining > 0 {
            let head = match source.ring.head() {
                Some(head) => head,
                None => panic!("Buffer::write_buffer: 源缓冲 size={} 但分段环为空", source.size),
            };
            if remaining < source.ring.get(head).len() {
                let absorbing_tail = self
                    .ring
                    .tail()
                    .filter(|&tail| self.ring.get(tail).can_absorb(remaining));
                if let Some(tail) = absorbing_tail {
                    source
                        .ring
                        .get_mut(head)
                        .write_to(self.ring.get_mut(tail), remaining)?;
                    source.size -= remaining;
                    self.size += remaining;
                    return Ok(());
                }
                source.ring.split(head, remaining)?;
            }

            let moving = match source.ring.pop_front() {
                Some(segment) => segment,
                None => panic!("Buffer::write_buffer: 源缓冲在拆分后失去头部分段"),
            };
            let moved = moving.len();
            let had_tail = !self.ring.is_empty();
            let attached = self.ring.push_back(moving);
            if had_tail {
                self.ring.compact(attached, &self.pool);
            }
            source.size -= moved;
            self.size += moved;
            remaining -= moved;
        }
        Ok(())
    }

    /// 持续从 `source` 读取，每次最多一个分段，直到其耗尽；返回读取的总字节数。
    pub fn write_all_from<S>(&mut self, source: &mut S) -> Result<u64>
    where
        S: Source + ?Sized,
    {
        let chunk = self.pool.segment_size();
        let mut total = 0u64;
        while let Some(read) = source.read(self, chunk)? {
            total += read as u64;
        }
        Ok(total)
    }

    /// 从头部分段拷贝至多 `dst.len()` 个字节，单次调用最多跨越一个分段。
    ///
    /// 缓冲为空时返回 `None`。
    pub fn read_into(&mut self, dst: &mut [u8]) -> Option<usize> {
        let head = self.ring.head()?;
        let segment = self.ring.get(head);
        let count = dst.len().min(segment.len());
        dst[..count].copy_from_slice(&segment.as_slice()[..count]);
        self.consume_front(count);
        Some(count)
    }

    /// 读入 `dst[offset..offset + byte_count]`，语义同 [`read_into`](Self::read_into)。
    pub fn read_range(
        &mut self,
        dst: &mut [u8],
        offset: usize,
        byte_count: usize,
    ) -> Result<Option<usize>> {
        check_offset_and_count(dst.len(), offset, byte_count)?;
        Ok(self.read_into(&mut dst[offset..offset + byte_count]))
    }

    /// 填满 `dst`；可用字节不足时返回 `EndOfData` 且不消费任何字节。
    pub fn read_fully(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.size {
            return Err(SegmentError::end_of_data(format!(
                "需要 {} 字节，缓冲仅有 {}",
                dst.len(),
                self.size
            )));
        }
        let mut filled = 0;
        while filled < dst.len() {
            match self.read_into(&mut dst[filled..]) {
                Some(read) => filled += read,
                None => unreachable!("size 预检通过后缓冲不可能提前耗尽"),
            }
        }
        Ok(())
    }

    /// 读取一个字节；缓冲为空时返回 `EndOfData`。
    pub fn read_byte(&mut self) -> Result<u8> {
        let head = self
            .ring
            .head()
            .ok_or_else(|| SegmentError::end_of_data("缓冲为空"))?;
        let byte = self.ring.get(head).as_slice()[0];
        self.consume_front(1);
        Ok(byte)
    }

    /// 读取恰好 `byte_count` 个字节；超过 `size` 时返回 `OutOfRange`。
    pub fn read_byte_array(&mut self, byte_count: usize) -> Result<Vec<u8>> {
        check_offset_and_count(self.size, 0, byte_count)?;
        let mut out = vec![0u8; byte_count];
        self.read_fully(&mut out)?;
        Ok(out)
    }

    /// 读取全部未读字节。
    pub fn read_all_bytes(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size);
        while let Some(segment) = self.ring.pop_front() {
            out.extend_from_slice(segment.as_slice());
            self.pool.release(segment);
        }
        self.size = 0;
        out
    }

    /// 丢弃头部 `byte_count` 个字节；超过 `size` 时返回 `OutOfRange` 且不丢弃任何字节。
    pub fn skip(&mut self, byte_count: usize) -> Result<()> {
        check_offset_and_count(self.size, 0, byte_count)?;
        self.consume_front(byte_count);
        Ok(())
    }

    /// 丢弃全部字节，分段交还池。
    pub fn clear(&mut self) {
        while let Some(segment) = self.ring.pop_front() {
            self.pool.release(segment);
        }
        self.size = 0;
    }

    /// 可立即向下游转交而不会产生“短分段”的字节数：尾部写端尚未写满时，其未读字节不计入。
    pub fn complete_segment_byte_count(&self) -> usize {
        let Some(tail) = self.ring.tail() else {
            return 0;
        };
        let tail = self.ring.get(tail);
        if tail.writable_capacity() > 0 {
            self.size - tail.len()
        } else {
            self.size
        }
    }

    /// 把尾部写端的可写区域（最多 `max` 字节）交给 `fill`，并提交其报告写入的字节数。
    ///
    /// # 契约说明（What）
    /// - 单次调用最多填充一个分段；`fill` 返回值不得超过交给它的切片长度，否则 panic；
    /// - 本次新挂上的尾部分段若最终为空（返回 0 或出错），立即摘下归还池；
    /// - `fill` 的错误原样返回，已提交的字节数保持不变。
    pub fn fill_tail<E>(
        &mut self,
        max: usize,
        fill: impl FnOnce(&mut [u8]) -> std::result::Result<usize, E>,
    ) -> std::result::Result<usize, E> {
        if max == 0 {
            return Ok(0);
        }
        let tail = self.writable_segment(1);
        let segment = self.ring.get_mut(tail);
        let spare = segment.spare_mut();
        let window = spare.len().min(max);
        let outcome = fill(&mut spare[..window]);
        if let Ok(written) = outcome {
            assert!(
                written <= window,
                "Buffer::fill_tail: 生产者报告写入 {written} 字节，超过可写窗口 {window}"
            );
            segment.commit(written);
            self.size += written;
        }
        self.release_empty_tail();
        outcome
    }

    /// 把头部分段的可读区域（最多 `max` 字节）交给 `drain`，并消费其报告处理的字节数。
    ///
    /// 缓冲为空时不调用 `drain`，直接返回 `Ok(0)`；`drain` 出错时不消费任何字节。
    pub fn drain_head<E>(
        &mut self,
        max: usize,
        drain: impl FnOnce(&[u8]) -> std::result::Result<usize, E>,
    ) -> std::result::Result<usize, E> {
        let Some(head) = self.ring.head() else {
            return Ok(0);
        };
        let readable = self.ring.get(head).as_slice();
        let window = readable.len().min(max);
        let drained = drain(&readable[..window])?;
        assert!(
            drained <= window,
            "Buffer::drain_head: 消费者报告处理 {drained} 字节，超过可读窗口 {window}"
        );
        self.consume_front(drained);
        Ok(drained)
    }

    /// 头部分段未读字节的只读视图。
    pub(crate) fn head_slice(&self) -> &[u8] {
        match self.ring.head() {
            Some(head) => self.ring.get(head).as_slice(),
            None => &[],
        }
    }

    /// 从头部消费 `byte_count` 个字节，排空的分段立即交还池；调用方保证 `byte_count <= size`。
    pub(crate) fn consume_front(&mut self, byte_count: usize) {
        debug_assert!(byte_count <= self.size);
        let mut remaining = byte_count;
        while remaining > 0 {
            let head = match self.ring.head() {
                Some(head) => head,
                None => panic!("Buffer: size 计数与分段环不一致"),
            };
            let segment = self.ring.get_mut(head);
            let step = remaining.min(segment.len());
            segment.consume(step);
            self.size -= step;
            remaining -= step;
            if segment.is_empty() {
                let drained = self.ring.pop_front();
                if let Some(drained) = drained {
                    self.pool.release(drained);
                }
            }
        }
    }

    fn release_empty_tail(&mut self) {
        if let Some(tail) = self.ring.tail() {
            if self.ring.get(tail).is_empty() {
                let (segment, _) = self.ring.unlink(tail);
                self.pool.release(segment);
            }
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.size)
            .field("segments", &self.ring.len())
            .finish()
    }
}
