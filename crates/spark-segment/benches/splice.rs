use criterion::{BenchmarkId, Criterion, Throughput, black_box};
use spark_segment::{Buffer, SEGMENT_SIZE, SegmentPool};
use std::{env, time::Duration};

/// 拼接基准：对比整段搬运与逐字节复制的成本。
///
/// # 设计背景（Why）
/// - 拼接的价值在于成本与分段数成正比而非与字节数成正比；基准用于在重构时及时发现回归。
///
/// # 逻辑解析（How）
/// - `splice`：源缓冲写入若干完整分段后整体拼接到目标缓冲，再清空目标以归还分段；
/// - `copy`：同样的数据通过 `read_into` + `write_slice` 搬运，作为对照组。
fn bench_splice(c: &mut Criterion) {
    let pool = SegmentPool::new();
    let mut group = c.benchmark_group("splice");
    for segments in [1usize, 8, 32] {
        let payload = vec![0x5a_u8; segments * SEGMENT_SIZE];
        group.throughput(Throughput::Bytes(payload.len() as u64));

        group.bench_with_input(BenchmarkId::new("relink", segments), &payload, |b, payload| {
            let mut source = Buffer::with_pool(pool.clone());
            let mut sink = Buffer::with_pool(pool.clone());
            b.iter(|| {
                source.write_slice(payload);
                sink.write_buffer(&mut source, payload.len())
                    .expect("拼接不应失败");
                sink.clear();
                black_box(sink.size())
            });
        });

        group.bench_with_input(BenchmarkId::new("copy", segments), &payload, |b, payload| {
            let mut source = Buffer::with_pool(pool.clone());
            let mut sink = Buffer::with_pool(pool.clone());
            let mut scratch = vec![0u8; SEGMENT_SIZE];
            b.iter(|| {
                source.write_slice(payload);
                while let Some(read) = source.read_into(&mut scratch) {
                    sink.write_slice(&scratch[..read]);
                }
                sink.clear();
                black_box(sink.size())
            });
        });
    }
    group.finish();
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_splice(&mut criterion);
    criterion.final_summary();
}
