use std::{
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::BytesMut;
use spin::Mutex;

use crate::{
    config::PoolConfig,
    error::{Result, SegmentError},
    segment::Segment,
};

/// `SegmentPool` 是分段的有界回收池，用于摊薄分段块的分配成本。
///
/// # 模块角色（Why）
/// - 缓冲频繁地申请、排空分段；复用退役块可以省去重复的零初始化分配；
/// - 池以显式句柄的形式注入 [`Buffer`](crate::Buffer)，测试可以使用彼此隔离的池实例，
///   常规调用方则通过 [`SegmentPool::shared`] 共用同一个进程级实例。
///
/// # 核心机制（How）
/// - 内部以 `spin::Mutex<FreeList>` 维护退役块与池内字节总数，锁只覆盖链表与计数的修改，
///   新块的零初始化分配始终发生在锁外；
/// - `PoolMetrics` 以原子计数记录分配、命中、回收、丢弃与拒绝次数，供 [`stats`](Self::stats) 生成快照。
///
/// # 契约说明（What）
/// - [`take`](Self::take) 返回的分段总是写端、非共享、未挂环且 `pos == limit == 0`；
/// - [`recycle`](Self::recycle) 拒绝仍挂在环上的分段并保持池不变；共享块、尺寸不符的块与超出上限的块
///   会被丢弃，同样不改动池；
/// - 任意时刻池内字节数都是 `segment_size` 的整数倍，且不超过 `max_pool_bytes`。
///
/// # 设计权衡（Trade-offs）
/// - 与 `SlabBufferPool` 一致选用自旋锁：临界区只有一次 `Vec` 的 push/pop，争用窗口极短；
/// - 池满时直接丢弃而不是扩容，内存上限优先于复用率。
#[derive(Clone)]
pub struct SegmentPool {
    inner: Arc<PoolInner>,
}

/// 回收结果：分段被放回池中，或因某种原因被丢弃。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recycled {
    Pooled,
    Discarded(DiscardReason),
}

/// 分段未能入池的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// 底层块被多个分段引用。
    Shared,
    /// 池已达到字节上限。
    PoolFull,
    /// 块尺寸与本池的 `segment_size` 不一致。
    ForeignSize,
}

/// 分段池的统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub pooled_segments: usize,
    pub pooled_bytes: usize,
    pub max_pool_bytes: usize,
    pub segment_size: usize,
    /// 因池空而新分配的块数。
    pub allocations: u64,
    /// 从池中直接取得的块数。
    pub hits: u64,
    pub recycled: u64,
    /// 因共享、尺寸不符或池满被丢弃的分段数。
    pub discarded: u64,
    /// 因仍挂在环上被拒绝的回收请求数。
    pub rejected: u64,
}

impl SegmentPool {
    /// 以默认配置创建一个独立的池。
    pub fn new() -> Self {
        Self::from_config(PoolConfig::default())
    }

    /// 以自定义配置创建池；配置非法时返回错误。
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            segment_size = config.segment_size,
            max_pool_bytes = config.max_pool_bytes,
            "segment pool configured"
        );
        Ok(Self::from_config(config))
    }

    fn from_config(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                free_list: Mutex::new(FreeList::default()),
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// 进程级共享池，首次访问时以默认配置创建。
    pub fn shared() -> SegmentPool {
        static SHARED: OnceLock<SegmentPool> = OnceLock::new();
        SHARED.get_or_init(SegmentPool::new).clone()
    }

    pub fn config(&self) -> PoolConfig {
        self.inner.config
    }

    pub fn segment_size(&self) -> usize {
        self.inner.config.segment_size
    }

    /// 取出一个可写分段：优先复用池中的块，池空时在锁外分配新块。
    pub fn take(&self) -> Segment {
        let reused = {
            let mut list = self.inner.free_list.lock();
            let block = list.blocks.pop();
            if block.is_some() {
                list.byte_count -= self.segment_size();
            }
            block
        };
        match reused {
            Some(block) => {
                self.inner.metrics.hits.fetch_add(1, Ordering::Relaxed);
                Segment::from_block(block)
            }
            None => {
                self.inner.metrics.allocations.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(segment_size = self.segment_size(), "segment pool miss, allocating");
                Segment::allocate(self.segment_size())
            }
        }
    }

    /// 归还一个已摘环的分段。
    ///
    /// # 契约说明（What）
    /// - 分段仍挂在环上：返回 `InvalidArgument`，池保持不变；
    /// - 分段共享底层块或尺寸不符：返回 `Ok(Discarded(..))`，分段被直接释放；
    /// - 池已满：返回 `Ok(Discarded(PoolFull))`；
    /// - 否则入池并返回 `Ok(Pooled)`。
    pub fn recycle(&self, segment: Segment) -> Result<Recycled> {
        let metrics = &self.inner.metrics;
        if segment.is_linked() {
            metrics.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(?segment, "refusing to recycle a segment that is still linked");
            return Err(SegmentError::invalid_argument(
                "分段仍挂在环上，必须先摘除再回收",
            ));
        }
        if segment.block_size() != self.segment_size() {
            return Ok(self.discard(DiscardReason::ForeignSize));
        }
        let block = match segment.into_block() {
            Some(block) => block,
            None => return Ok(self.discard(DiscardReason::Shared)),
        };

        let segment_size = self.segment_size();
        let pooled = {
            let mut list = self.inner.free_list.lock();
            if list.byte_count + segment_size > self.inner.config.max_pool_bytes {
                false
            } else {
                list.blocks.push(block);
                list.byte_count += segment_size;
                true
            }
        };
        if pooled {
            metrics.recycled.fetch_add(1, Ordering::Relaxed);
            Ok(Recycled::Pooled)
        } else {
            tracing::trace!(
                max_pool_bytes = self.inner.config.max_pool_bytes,
                "segment pool full, dropping block"
            );
            Ok(self.discard(DiscardReason::PoolFull))
        }
    }

    fn discard(&self, reason: DiscardReason) -> Recycled {
        self.inner.metrics.discarded.fetch_add(1, Ordering::Relaxed);
        Recycled::Discarded(reason)
    }

    /// 缓冲内部归还排空分段的入口；调用方保证分段已摘环，因此结果只可能是入池或丢弃。
    pub(crate) fn release(&self, segment: Segment) {
        debug_assert!(!segment.is_linked());
        let _ = self.recycle(segment);
    }

    /// 池内闲置字节数。
    pub fn pooled_bytes(&self) -> usize {
        self.inner.free_list.lock().byte_count
    }

    /// 池内闲置分段数。
    pub fn pooled_segments(&self) -> usize {
        self.inner.free_list.lock().blocks.len()
    }

    /// 清空池并返回释放的字节数。
    pub fn clear(&self) -> usize {
        let released = {
            let mut list = self.inner.free_list.lock();
            list.blocks.clear();
            std::mem::take(&mut list.byte_count)
        };
        tracing::debug!(released, "segment pool cleared");
        released
    }

    pub fn stats(&self) -> PoolStats {
        let (pooled_segments, pooled_bytes) = {
            let list = self.inner.free_list.lock();
            (list.blocks.len(), list.byte_count)
        };
        let metrics = &self.inner.metrics;
        PoolStats {
            pooled_segments,
            pooled_bytes,
            max_pool_bytes: self.inner.config.max_pool_bytes,
            segment_size: self.inner.config.segment_size,
            allocations: metrics.allocations.load(Ordering::Relaxed),
            hits: metrics.hits.load(Ordering::Relaxed),
            recycled: metrics.recycled.load(Ordering::Relaxed),
            discarded: metrics.discarded.load(Ordering::Relaxed),
            rejected: metrics.rejected.load(Ordering::Relaxed),
        }
    }

    /// 两个句柄是否指向同一个池。
    pub fn ptr_eq(&self, other: &SegmentPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for SegmentPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SegmentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentPool")
            .field("config", &self.inner.config)
            .field("pooled_bytes", &self.pooled_bytes())
            .finish()
    }
}

struct PoolInner {
    config: PoolConfig,
    free_list: Mutex<FreeList>,
    metrics: PoolMetrics,
}

#[derive(Default)]
struct FreeList {
    blocks: Vec<BytesMut>,
    byte_count: usize,
}

#[derive(Default)]
struct PoolMetrics {
    allocations: AtomicU64,
    hits: AtomicU64,
    recycled: AtomicU64,
    discarded: AtomicU64,
    rejected: AtomicU64,
}
