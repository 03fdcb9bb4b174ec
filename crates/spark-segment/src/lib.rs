//! `spark-segment` 提供分段式字节缓冲引擎。
//!
//! # 模块定位（Why）
//! - I/O 流水线在存储、网络与变换阶段之间反复转交字节；以固定尺寸分段承载数据后，
//!   缓冲之间的大块搬运退化为分段的摘链与挂链，载荷字节无需复制；
//! - 排空的分段回到有界的 [`SegmentPool`]，稳态下不再为每次读写分配新内存。
//!
//! # 设计概要（How）
//! - `segment` 定义分段与其“写端 / 只读视图”两种存储形态，共享约束由类型直接表达；
//! - `ring` 以 arena + 下标的方式维护缓冲内部的循环双向链表；
//! - `pool` 实现带字节上限的回收池，自由链表由 `spin::Mutex` 保护，统计以原子计数维护；
//! - `buffer` 在上述组件之上实现读写、拼接（splice）与压缩；
//! - `stream` 定义 [`Sink`]/[`Source`] 生产者-消费者契约，并为 [`Buffer`] 接入 `std::io`。
//!
//! # 命名约定（Consistency）
//! - 错误统一为 [`SegmentError`]，错误码取自 [`codes`]；
//! - 池配置通过 [`PoolConfig`] 传入，缺省值与 [`SEGMENT_SIZE`]、[`MAX_POOL_BYTES`] 保持一致。

mod buffer;
mod config;
mod error;
mod pool;
mod ring;
mod segment;
mod stream;

pub use buffer::Buffer;
pub use config::{MAX_POOL_BYTES, PoolConfig, SEGMENT_SIZE};
pub use error::{ErrorCause, ErrorKind, Result, SegmentError, check_offset_and_count, codes};
pub use pool::{DiscardReason, PoolStats, Recycled, SegmentPool};
pub use segment::Segment;
pub use stream::{Sink, Source};
