//! `pool_contract` 集成测试：验证 `SegmentPool` 的回收判定、容量上限与统计快照。
//!
//! # 测试目标（Why）
//! - 池是唯一跨缓冲共享的可变状态，错误的入池判定会让两个分段写同一块内存；
//! - 拒绝路径必须保持池不变，并通过 `warn` 日志留下排障线索。
//!
//! # 结构安排（How）
//! - 前两个测试覆盖两类丢弃原因（共享、尺寸不符）；
//! - `pool_bound_holds_under_mixed_take_and_recycle` 与并发测试守住容量上限；
//! - 其余测试检查统计快照、配置校验与清空日志。

use spark_segment::{
    Buffer, DiscardReason, ErrorKind, PoolConfig, PoolStats, Recycled, SegmentPool, codes,
};
use tracing_test::traced_test;

fn pool_of(segment_size: usize, max_segments: usize) -> SegmentPool {
    SegmentPool::with_config(PoolConfig::new(segment_size, segment_size * max_segments))
        .expect("合法配置")
}

/// 已拼接出去的共享前缀与其写端都不能入池，且池的字节计数保持不变。
#[test]
fn shared_segments_are_discarded_without_touching_the_free_list() {
    let pool = pool_of(64, 4);
    let seed = pool.take();
    assert_eq!(pool.recycle(pool.take()).expect("回收"), Recycled::Pooled);
    let before = pool.stats();

    let mut source = Buffer::with_pool(pool.clone());
    source.write_slice(b"abcdefgh");
    let mut sink = Buffer::with_pool(pool.clone());
    sink.write_buffer(&mut source, 3).expect("拼接");
    let shared: Vec<bool> = sink.segments().map(|s| s.is_shared()).collect();
    assert_eq!(shared, vec![true]);
    drop(sink);
    drop(source);

    let after = pool.stats();
    assert_eq!(after.pooled_bytes, before.pooled_bytes - 64, "拼接时取走了一个池化块");
    assert_eq!(after.discarded, before.discarded + 2);

    assert_eq!(pool.recycle(seed).expect("回收"), Recycled::Pooled);
}

/// 来自其它池、尺寸不同的块只会被丢弃，不计入拒绝。
#[test]
fn foreign_sized_segments_are_discarded() {
    let small = pool_of(64, 4);
    let large = SegmentPool::new();
    let outcome = small.recycle(large.take()).expect("回收");
    assert_eq!(outcome, Recycled::Discarded(DiscardReason::ForeignSize));
    assert_eq!(small.stats().pooled_bytes, 0);
    assert_eq!(small.stats().rejected, 0);
}

/// 回收数量超过上限时，多出的分段被丢弃，池内字节始终是分段尺寸的整数倍。
///
/// # 测试意图（Why）
/// - 上限失守意味着长期运行的进程会把峰值内存永久留在池里。
///
/// # 步骤说明（How）
/// 1. 一次取出 5 个分段，再逐个归还到上限为 3 个分段的池；
/// 2. 每次归还后检查 `pooled_bytes` 不超过上限；
/// 3. 最后两次取用应命中池，剩余一个分段。
#[test]
fn pool_bound_holds_under_mixed_take_and_recycle() {
    let pool = pool_of(32, 3);
    let taken: Vec<_> = (0..5).map(|_| pool.take()).collect();
    for segment in taken {
        pool.recycle(segment).expect("回收");
        let stats = pool.stats();
        assert!(stats.pooled_bytes <= stats.max_pool_bytes);
        assert_eq!(stats.pooled_bytes % stats.segment_size, 0);
    }
    assert_eq!(pool.pooled_segments(), 3);
    assert_eq!(pool.stats().discarded, 2);

    let _a = pool.take();
    let _b = pool.take();
    assert_eq!(pool.pooled_bytes(), 32);
}

/// 一次分配、一次回收、一次命中之后，快照中的每个字段都与预期一致。
#[test]
fn stats_snapshot_reflects_configuration_and_counters() {
    let pool = pool_of(16, 2);
    let segment = pool.take();
    pool.recycle(segment).expect("回收");
    let _reused = pool.take();

    assert_eq!(
        pool.stats(),
        PoolStats {
            pooled_segments: 0,
            pooled_bytes: 0,
            max_pool_bytes: 32,
            segment_size: 16,
            allocations: 1,
            hits: 1,
            recycled: 1,
            discarded: 0,
            rejected: 0,
        }
    );
}

/// 零尺寸分段的配置在构造池时即被拒绝，并带有稳定错误码。
///
/// # 契约校验（What）
/// - 错误类别为 `InvalidArgument`，错误码为 `codes::CONFIG_INVALID`。
#[test]
fn invalid_configuration_is_rejected() {
    let err = SegmentPool::with_config(PoolConfig::new(0, 1024)).expect_err("零尺寸分段");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.code(), codes::CONFIG_INVALID);
}

/// 清空池返回释放的字节数，并以 `debug` 日志记录。
#[test]
#[traced_test]
fn clearing_the_pool_is_logged() {
    let pool = pool_of(16, 4);
    let a = pool.take();
    let b = pool.take();
    pool.recycle(a).expect("回收");
    pool.recycle(b).expect("回收");
    assert_eq!(pool.clear(), 32);
    assert_eq!(pool.pooled_bytes(), 0);
    assert!(logs_contain("segment pool cleared"));
}

/// 多线程并发取还时，池的上限与计数保持一致。
///
/// # 核心关注点
/// - 空闲链表与字节计数在同一把锁内更新，`pooled_bytes` 必须等于分段数乘以分段尺寸；
/// - 每次取用要么命中要么分配，二者之和等于总取用次数。
#[test]
fn concurrent_take_and_recycle_respect_the_bound() {
    let pool = pool_of(64, 8);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let segment = pool.take();
                    pool.recycle(segment).expect("回收");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("线程正常退出");
    }
    let stats = pool.stats();
    assert!(stats.pooled_bytes <= stats.max_pool_bytes);
    assert_eq!(stats.pooled_bytes, stats.pooled_segments * stats.segment_size);
    assert_eq!(stats.hits + stats.allocations, 800);
}
