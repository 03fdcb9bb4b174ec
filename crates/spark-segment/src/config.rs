use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result, SegmentError, codes};

/// 默认分段尺寸（字节）。
pub const SEGMENT_SIZE: usize = 2048;

/// 默认分段池容量上限（字节）。
pub const MAX_POOL_BYTES: usize = 64 * 1024;

/// 分段池的可调参数。
///
/// # 设计目的（Why）
/// - 将分段尺寸与池容量集中为一个可序列化的结构，宿主可以从配置文件直接反序列化；
/// - 缺省字段回落到 [`SEGMENT_SIZE`] / [`MAX_POOL_BYTES`]，与默认池保持一致。
///
/// # 契约说明（What）
/// - `segment_size`：每个分段的固定容量，必须大于 0；
/// - `max_pool_bytes`：池内闲置分段的字节上限，允许为 0（即关闭池化，回收一律丢弃）；
/// - 只有通过 [`validate`](Self::validate) 的配置才能用于构造 [`SegmentPool`](crate::SegmentPool)。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub segment_size: usize,
    pub max_pool_bytes: usize,
}

impl PoolConfig {
    /// 以自定义阈值构造配置。
    pub const fn new(segment_size: usize, max_pool_bytes: usize) -> Self {
        Self {
            segment_size,
            max_pool_bytes,
        }
    }

    /// 替换分段尺寸。
    pub const fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size;
        self
    }

    /// 替换池容量上限。
    pub const fn with_max_pool_bytes(mut self, max_pool_bytes: usize) -> Self {
        self.max_pool_bytes = max_pool_bytes;
        self
    }

    /// 池最多可缓存的分段数量。
    pub const fn max_pooled_segments(&self) -> usize {
        if self.segment_size == 0 {
            0
        } else {
            self.max_pool_bytes / self.segment_size
        }
    }

    /// 校验配置是否可用。
    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            return Err(SegmentError::new(
                ErrorKind::InvalidArgument,
                codes::CONFIG_INVALID,
                format!(
                    "segment_size 必须大于 0（max_pool_bytes={}）",
                    self.max_pool_bytes
                ),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(SEGMENT_SIZE, MAX_POOL_BYTES)
    }
}
