use crate::{
    error::Result,
    pool::SegmentPool,
    segment::{Links, Segment, SlotId},
};

/// 环清空时保留的槽位表容量，避免缓冲在“清空/写入”之间反复分配。
const RETAINED_SLOTS: usize = 4;

/// `SegmentRing` 以 arena + 下标的方式维护一个循环双向链表。
///
/// # 设计动机（Why）
/// - 环上的 `prev`/`next` 只是槽位下标，插入、摘除都是下标改写，不存在悬垂指针；
/// - 分段在两个缓冲之间搬运时，只有分段结构体本身（持有块的引用计数句柄）被移动，
///   载荷字节保持原位。
///
/// # 结构设计（How）
/// - `slots` 是槽位向量，`vacant` 记录可复用的空槽，`head` 指向最老的分段；
/// - 环是闭合的：`head` 的前驱就是尾部（最新的、可能可写的分段）。
///
/// # 契约说明（What）
/// - 环上每个已占用槽位恰好出现一次，且前驱/后继互相一致；
/// - 链接不一致属于编程错误，会直接 panic，而不是带着损坏的状态继续运行。
pub(crate) struct SegmentRing {
    slots: Vec<Option<Segment>>,
    vacant: Vec<SlotId>,
    head: Option<SlotId>,
    len: usize,
}

impl SegmentRing {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            head: None,
            len: 0,
        }
    }

    /// 环上的分段数量。
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn head(&self) -> Option<SlotId> {
        self.head
    }

    pub(crate) fn tail(&self) -> Option<SlotId> {
        self.head.map(|head| self.links_of(head).prev)
    }

    pub(crate) fn get(&self, id: SlotId) -> &Segment {
        match self.slots.get(id) {
            Some(Some(segment)) => segment,
            _ => panic!("SegmentRing: 槽位 {id} 未被占用"),
        }
    }

    pub(crate) fn get_mut(&mut self, id: SlotId) -> &mut Segment {
        match self.slots.get_mut(id) {
            Some(Some(segment)) => segment,
            _ => panic!("SegmentRing: 槽位 {id} 未被占用"),
        }
    }

    /// 同时借出两个不同槽位的可变引用。
    fn pair_mut(&mut self, first: SlotId, second: SlotId) -> (&mut Segment, &mut Segment) {
        assert_ne!(first, second, "SegmentRing::pair_mut 需要两个不同槽位");
        let (low, high) = (first.min(second), first.max(second));
        let (left, right) = self.slots.split_at_mut(high);
        let (low_slot, high_slot) = match (left.get_mut(low), right.first_mut()) {
            (Some(Some(low_slot)), Some(Some(high_slot))) => (low_slot, high_slot),
            _ => panic!("SegmentRing: 槽位 {first}/{second} 未被占用"),
        };
        if first < second {
            (low_slot, high_slot)
        } else {
            (high_slot, low_slot)
        }
    }

    fn links_of(&self, id: SlotId) -> Links {
        match self.get(id).links {
            Some(links) => links,
            None => panic!("SegmentRing: 槽位 {id} 上的分段缺少环链接"),
        }
    }

    fn links_mut(&mut self, id: SlotId) -> &mut Links {
        match &mut self.get_mut(id).links {
            Some(links) => links,
            None => panic!("SegmentRing: 槽位 {id} 上的分段缺少环链接"),
        }
    }

    /// 占用一个槽位；`links` 为 `None` 时分段与自身成环。
    fn occupy(&mut self, mut segment: Segment, links: Option<Links>) -> SlotId {
        assert!(!segment.is_linked(), "SegmentRing: 分段仍挂在其它环上");
        let id = match self.vacant.pop() {
            Some(id) => id,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        segment.links = Some(links.unwrap_or(Links { prev: id, next: id }));
        self.slots[id] = Some(segment);
        self.len += 1;
        id
    }

    fn vacate(&mut self, id: SlotId) -> Segment {
        match self.slots.get_mut(id).and_then(Option::take) {
            Some(mut segment) => {
                segment.links = None;
                self.vacant.push(id);
                self.len -= 1;
                if self.len == 0 {
                    self.reset_slots();
                }
                segment
            }
            None => panic!("SegmentRing: 槽位 {id} 未被占用"),
        }
    }

    /// 环清空后收回槽位表，下标重新从 0 开始分配。
    fn reset_slots(&mut self) {
        self.slots.clear();
        self.slots.shrink_to(RETAINED_SLOTS);
        self.vacant.clear();
        self.vacant.shrink_to(RETAINED_SLOTS);
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 把 `segment` 接到尾部；空环时形成只有一个分段的自环。
    pub(crate) fn push_back(&mut self, segment: Segment) -> SlotId {
        match self.tail() {
            Some(tail) => self.link_after(tail, segment),
            None => {
                let id = self.occupy(segment, None);
                self.head = Some(id);
                id
            }
        }
    }

    /// 把 `segment` 插到 `at` 之后，返回其槽位。
    pub(crate) fn link_after(&mut self, at: SlotId, segment: Segment) -> SlotId {
        let next = self.links_of(at).next;
        let id = self.occupy(segment, Some(Links { prev: at, next }));
        self.links_mut(at).next = id;
        self.links_mut(next).prev = id;
        id
    }

    /// 把 `segment` 插到 `at` 之前；`at` 为头部时新分段成为头部。
    fn link_before(&mut self, at: SlotId, segment: Segment) -> SlotId {
        let prev = self.links_of(at).prev;
        let id = self.link_after(prev, segment);
        if self.head == Some(at) {
            self.head = Some(id);
        }
        id
    }

    /// 从环上摘下 `id`，返回该分段（链接已清空）与其后继；环因此变空时后继为 `None`。
    pub(crate) fn unlink(&mut self, id: SlotId) -> (Segment, Option<SlotId>) {
        let links = self.links_of(id);
        assert!(
            self.links_of(links.prev).next == id && self.links_of(links.next).prev == id,
            "SegmentRing: 槽位 {id} 的前驱/后继链接不一致"
        );
        let next = if links.next == id {
            None
        } else {
            self.links_mut(links.prev).next = links.next;
            self.links_mut(links.next).prev = links.prev;
            Some(links.next)
        };
        if self.head == Some(id) {
            self.head = next;
        }
        (self.vacate(id), next)
    }

    /// 摘下头部分段。
    pub(crate) fn pop_front(&mut self) -> Option<Segment> {
        let head = self.head?;
        Some(self.unlink(head).0)
    }

    /// 将 `id` 的前 `byte_count` 个未读字节拆成独立的只读前缀，插在 `id` 之前并返回其槽位。
    pub(crate) fn split(&mut self, id: SlotId, byte_count: usize) -> Result<SlotId> {
        let prefix = self.get_mut(id).split_prefix(byte_count)?;
        tracing::trace!(slot = id, byte_count, "split segment prefix");
        Ok(self.link_before(id, prefix))
    }

    /// 尝试把 `id` 的未读字节并入其前驱，成功后摘下 `id` 并交还 `pool`。
    ///
    /// # 契约说明（What）
    /// - 前驱必须是写端，且（必要时平移后）能容纳 `id` 的全部未读字节，否则不做任何改动；
    /// - 环上只有一个分段时没有前驱，同样直接返回 `false`。
    pub(crate) fn compact(&mut self, id: SlotId, pool: &SegmentPool) -> bool {
        let prev = self.links_of(id).prev;
        if prev == id {
            return false;
        }
        let byte_count = self.get(id).len();
        if !self.get(prev).can_absorb(byte_count) {
            return false;
        }
        let (segment, predecessor) = self.pair_mut(id, prev);
        if let Err(err) = segment.write_to(predecessor, byte_count) {
            panic!("SegmentRing::compact 容量预检与实际写入不一致: {err}");
        }
        let (drained, _) = self.unlink(id);
        tracing::trace!(slot = id, byte_count, "compacted segment into predecessor");
        pool.release(drained);
        true
    }

    /// 按环序（从头部开始）遍历分段。
    pub(crate) fn iter(&self) -> RingIter<'_> {
        RingIter {
            ring: self,
            next: self.head,
            remaining: self.len,
        }
    }
}

/// [`SegmentRing::iter`] 的迭代器。
pub(crate) struct RingIter<'a> {
    ring: &'a SegmentRing,
    next: Option<SlotId>,
    remaining: usize,
}

impl<'a> Iterator for RingIter<'a> {
    type Item = &'a Segment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.next?;
        let ring = self.ring;
        self.remaining -= 1;
        self.next = Some(ring.links_of(id).next);
        Some(ring.get(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
