use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::{Result, SegmentError};

/// 分段在所属环形 arena 中的槽位编号。
pub(crate) type SlotId = usize;

/// 环内前驱/后继链接；仅在分段挂在某个环上时存在。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) prev: SlotId,
    pub(crate) next: SlotId,
}

/// 分段底层存储的两种形态。
///
/// - `Owned`：写端窗口，独占 `[base, block_size)` 区间，可以在 `limit` 之后追加；
/// - `ReadOnly`：从写端前部切出的冻结视图，只能推进 `pos`，任何写入在类型层面即不可表达。
enum Storage {
    Owned(BytesMut),
    ReadOnly(Bytes),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(block) => block,
            Storage::ReadOnly(bytes) => bytes,
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// `Segment` 是缓冲存储、共享与池化的最小单元：一块固定容量的字节块加上读写游标。
///
/// # 设计动机（Why）
/// - 缓冲在分段之间搬运时只改链接、不拷贝字节；只有分段内部的读写游标随数据流动而前进；
/// - 拆分后同一块内存会被多个分段引用，必须保证“只有写端能够追加”，
///   否则另一个分段看到的数据会被悄悄改写。
///
/// # 结构设计（How）
/// - `pos`/`limit` 均为**块内绝对偏移**，满足 `base <= pos <= limit <= window_end <= block_size`；
/// - 写端以 `BytesMut` 持有 `[base, block_size)` 窗口；拆分时用 `BytesMut::split_to` 从窗口前部切下
///   `[base, pos + n)` 并冻结为 `Bytes`，于是只读视图与写端窗口在内存上互不重叠；
/// - “共享”由结构推导而来：只读视图天然共享，写端一旦切出过前缀（`base > 0`）即视为共享，
///   共享分段永不回收入池。
///
/// # 契约说明（What）
/// - 对外只暴露只读观察接口；所有修改都经由 [`Buffer`](crate::Buffer) 与
///   [`SegmentPool`](crate::SegmentPool) 完成，以维持环与池的不变量。
pub struct Segment {
    storage: Storage,
    block_size: usize,
    base: usize,
    pos: usize,
    limit: usize,
    pub(crate) links: Option<Links>,
}

impl Segment {
    /// 分配一个全零初始化的新块。
    pub(crate) fn allocate(block_size: usize) -> Self {
        Self::from_block(BytesMut::zeroed(block_size))
    }

    /// 以池中回收的整块构造可写分段，游标复位到 0。
    pub(crate) fn from_block(block: BytesMut) -> Self {
        Self {
            block_size: block.len(),
            storage: Storage::Owned(block),
            base: 0,
            pos: 0,
            limit: 0,
            links: None,
        }
    }

    /// 交还可复用的整块；只读视图或已切出前缀的写端返回 `None`。
    pub(crate) fn into_block(self) -> Option<BytesMut> {
        match self.storage {
            Storage::Owned(block) if self.base == 0 => Some(block),
            _ => None,
        }
    }

    /// 下一个未读字节的块内偏移。
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// 最后一个已写字节之后的块内偏移。
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 未读字节数，即 `limit - pos`。
    pub fn len(&self) -> usize {
        self.limit - self.pos
    }

    /// 是否已读空。
    pub fn is_empty(&self) -> bool {
        self.pos == self.limit
    }

    /// 底层块的固定容量。
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 是否为写端，即允许在 `limit` 之后追加。
    pub fn is_owner(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    /// 底层块是否被多个分段引用。
    pub fn is_shared(&self) -> bool {
        match self.storage {
            Storage::Owned(_) => self.base != 0,
            Storage::ReadOnly(_) => true,
        }
    }

    /// 是否仍挂在某个环上。
    pub fn is_linked(&self) -> bool {
        self.links.is_some()
    }

    /// `limit` 之后仍可直接追加的字节数；只读视图恒为 0。
    pub fn writable_capacity(&self) -> usize {
        if self.is_owner() {
            self.window_end() - self.limit
        } else {
            0
        }
    }

    /// 未读字节的只读切片。
    pub fn as_slice(&self) -> &[u8] {
        &self.storage.as_slice()[self.pos - self.base..self.limit - self.base]
    }

    fn window_end(&self) -> usize {
        self.base + self.storage.len()
    }

    /// 写端把未读数据平移到窗口起点后可获得的追加空间。
    pub(crate) fn room_after_shift(&self) -> usize {
        if self.is_owner() {
            self.window_end() - self.limit + (self.pos - self.base)
        } else {
            0
        }
    }

    /// 能否在不越过窗口的前提下再吸收 `byte_count` 字节（必要时先平移）。
    pub(crate) fn can_absorb(&self, byte_count: usize) -> bool {
        self.is_owner() && byte_count <= self.room_after_shift()
    }

    /// `limit` 之后的可写区域；只读视图返回空切片。
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        let offset = self.limit - self.base;
        match &mut self.storage {
            Storage::Owned(block) => &mut block[offset..],
            Storage::ReadOnly(_) => &mut [],
        }
    }

    /// 宣告通过 [`spare_mut`](Self::spare_mut) 写入了 `byte_count` 字节。
    pub(crate) fn commit(&mut self, byte_count: usize) {
        assert!(
            byte_count <= self.writable_capacity(),
            "Segment::commit 越过写端窗口：请求 {byte_count}，剩余 {}",
            self.writable_capacity()
        );
        self.limit += byte_count;
    }

    /// 尽可能多地追加 `src`，返回实际追加的字节数。
    pub(crate) fn append(&mut self, src: &[u8]) -> usize {
        let spare = self.spare_mut();
        let count = spare.len().min(src.len());
        spare[..count].copy_from_slice(&src[..count]);
        self.limit += count;
        count
    }

    /// 丢弃前 `byte_count` 个未读字节。
    pub(crate) fn consume(&mut self, byte_count: usize) {
        assert!(
            byte_count <= self.len(),
            "Segment::consume 超出未读字节：请求 {byte_count}，剩余 {}",
            self.len()
        );
        self.pos += byte_count;
    }

    /// 将未读数据挪到窗口起点，腾出尾部空间。窗口与任何只读视图互不重叠，平移不会影响其它分段。
    fn shift_to_window_start(&mut self) {
        let start = self.pos - self.base;
        let end = self.limit - self.base;
        if let Storage::Owned(block) = &mut self.storage {
            block.copy_within(start..end, 0);
            self.limit = self.base + (end - start);
            self.pos = self.base;
        }
    }

    /// 把本分段前 `byte_count` 个未读字节复制到写端 `sink` 的尾部。
    ///
    /// # 契约说明（What）
    /// - `sink` 必须是写端，否则返回 `InvalidArgument`；
    /// - `byte_count` 不得超过本分段未读字节，且 `sink` 平移后必须放得下，否则返回 `OutOfRange`；
    /// - 成功后 `self.pos` 与 `sink.limit` 同步前进 `byte_count`。
    pub(crate) fn write_to(&mut self, sink: &mut Segment, byte_count: usize) -> Result<()> {
        if !sink.is_owner() {
            return Err(SegmentError::invalid_argument(
                "目标分段为只读视图，不能作为写入目标",
            ));
        }
        if byte_count > self.len() {
            return Err(SegmentError::out_of_range(format!(
                "源分段仅剩 {} 字节，请求搬运 {byte_count}",
                self.len()
            )));
        }
        if sink.limit + byte_count > sink.window_end() {
            if byte_count > sink.room_after_shift() {
                return Err(SegmentError::out_of_range(format!(
                    "目标分段平移后仅有 {} 字节空间，请求写入 {byte_count}",
                    sink.room_after_shift()
                )));
            }
            sink.shift_to_window_start();
        }
        let copied = sink.append(&self.as_slice()[..byte_count]);
        debug_assert_eq!(copied, byte_count);
        self.pos += byte_count;
        Ok(())
    }

    /// 切出覆盖 `[pos, pos + byte_count)` 的只读前缀，本分段保留剩余部分。
    ///
    /// 前缀与本分段共享同一块内存；本分段若为写端，仍可继续在 `limit` 之后追加，
    /// 但此后不再具备回收资格。
    pub(crate) fn split_prefix(&mut self, byte_count: usize) -> Result<Segment> {
        if byte_count == 0 || byte_count > self.len() {
            return Err(SegmentError::invalid_argument(format!(
                "拆分长度必须位于 (0, {}]，实际为 {byte_count}",
                self.len()
            )));
        }
        let cut = self.pos + byte_count;
        let front = match &mut self.storage {
            Storage::Owned(block) => block.split_to(cut - self.base).freeze(),
            Storage::ReadOnly(bytes) => bytes.split_to(cut - self.base),
        };
        let prefix = Segment {
            storage: Storage::ReadOnly(front),
            block_size: self.block_size,
            base: self.base,
            pos: self.pos,
            limit: cut,
            links: None,
        };
        self.base = cut;
        self.pos = cut;
        Ok(prefix)
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("pos", &self.pos)
            .field("limit", &self.limit)
            .field("block_size", &self.block_size)
            .field("owner", &self.is_owner())
            .field("shared", &self.is_shared())
            .field("linked", &self.is_linked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(block_size: usize, payload: &[u8]) -> Segment {
        let mut segment = Segment::allocate(block_size);
        assert_eq!(segment.append(payload), payload.len());
        segment
    }

    #[test]
    fn fresh_segment_is_exclusive_owner() {
        let segment = Segment::allocate(16);
        assert!(segment.is_owner());
        assert!(!segment.is_shared());
        assert!(!segment.is_linked());
        assert_eq!((segment.pos(), segment.limit()), (0, 0));
        assert_eq!(segment.writable_capacity(), 16);
    }

    #[test]
    fn split_keeps_byte_order_and_marks_both_shared() {
        let mut segment = filled(16, b"abcdefgh");
        segment.consume(1);
        let prefix = segment.split_prefix(3).expect("合法拆分");

        assert_eq!(prefix.as_slice(), b"bcd");
        assert_eq!(segment.as_slice(), b"efgh");
        assert_eq!((prefix.pos(), prefix.limit()), (1, 4));
        assert_eq!((segment.pos(), segment.limit()), (4, 8));
        assert!(!prefix.is_owner());
        assert!(prefix.is_shared());
        assert!(segment.is_owner());
        assert!(segment.is_shared());
        assert!(segment.into_block().is_none(), "共享写端不可回收");
    }

    #[test]
    fn split_rejects_empty_or_oversized_prefix() {
        let mut segment = filled(8, b"abc");
        assert!(segment.split_prefix(0).is_err());
        assert!(segment.split_prefix(4).is_err());
        assert_eq!(segment.as_slice(), b"abc");
    }

    #[test]
    fn owner_keeps_appending_after_split_without_touching_prefix() {
        let mut segment = filled(8, b"abcd");
        let prefix = segment.split_prefix(2).expect("拆分");
        assert_eq!(segment.append(b"XYZW"), 4);
        assert_eq!(prefix.as_slice(), b"ab");
        assert_eq!(segment.as_slice(), b"cdXYZW");
        assert_eq!(segment.writable_capacity(), 0);
    }

    #[test]
    fn write_to_shifts_sink_when_tail_room_is_short() {
        let mut sink = filled(8, b"abcdef");
        sink.consume(4);
        let mut source = filled(8, b"wxyz");

        source.write_to(&mut sink, 4).expect("平移后可放下");
        assert_eq!(sink.as_slice(), b"efwxyz");
        assert_eq!((sink.pos(), sink.limit()), (0, 6));
        assert!(source.is_empty());
    }

    #[test]
    fn write_to_refuses_read_only_sink_and_overflow() {
        let mut owner = filled(8, b"abcd");
        let mut prefix = owner.split_prefix(2).expect("拆分");
        let mut source = filled(8, b"12345678");

        assert!(source.write_to(&mut prefix, 1).is_err());
        assert!(source.write_to(&mut owner, 7).is_err());
        assert_eq!(source.len(), 8, "失败路径不应推进源游标");
        assert_eq!(owner.as_slice(), b"cd");
    }

    #[test]
    fn shared_owner_shifts_only_inside_its_window() {
        let mut owner = filled(8, b"abcdef");
        let prefix = owner.split_prefix(2).expect("拆分");
        owner.consume(2);
        assert_eq!(owner.room_after_shift(), 4);

        let mut source = filled(8, b"WXYZ");
        source.write_to(&mut owner, 4).expect("窗口内平移");
        assert_eq!(owner.as_slice(), b"efWXYZ");
        assert_eq!(prefix.as_slice(), b"ab", "平移不得改写共享前缀");
    }
}
