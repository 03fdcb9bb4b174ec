use spark_segment::{Buffer, Result, SegmentError, Source};

use crate::error::{READ, closed_error};

/// `BufferedSource` 在任意 [`Source`] 前面加一层内存缓冲，按分段粒度向上游预取。
///
/// # 契约说明（What）
/// - [`request`](Self::request) 尽力把缓冲补到至少 `n` 字节，上游耗尽时返回 `false`；
///   [`require`](Self::require) 在同样情况下返回 `EndOfData`；
/// - 定长读取（`read_byte`、`read_byte_array`、`skip`）在字节不足时返回 `EndOfData`，
///   已预取的字节保留在缓冲中；
/// - 关闭后任何读取都返回 `IllegalState`；关闭释放上游并丢弃缓冲字节，可重复调用。
pub struct BufferedSource<S: Source> {
    buffer: Buffer,
    source: S,
    closed: bool,
}

impl<S: Source> BufferedSource<S> {
    pub fn new(source: S) -> Self {
        Self::with_buffer(source, Buffer::new())
    }

    pub fn with_buffer(source: S, buffer: Buffer) -> Self {
        Self {
            buffer,
            source,
            closed: false,
        }
    }

    /// 已预取但尚未被读取的字节。
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(closed_error(READ));
        }
        Ok(())
    }

    /// 向上游拉取至多一个分段；上游耗尽时返回 `false`。
    fn fill(&mut self) -> Result<bool> {
        let chunk = self.buffer.pool().segment_size();
        Ok(self.source.read(&mut self.buffer, chunk)?.is_some())
    }

    /// 缓冲为空且上游已耗尽。
    pub fn exhausted(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.buffer.is_empty() && !self.fill()?)
    }

    pub fn request(&mut self, byte_count: usize) -> Result<bool> {
        self.ensure_open()?;
        while self.buffer.size() < byte_count {
            if !self.fill()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn require(&mut self, byte_count: usize) -> Result<()> {
        if self.request(byte_count)? {
            return Ok(());
        }
        Err(SegmentError::end_of_data(format!(
            "上游已耗尽：需要 {byte_count} 字节，仅有 {}",
            self.buffer.size()
        )))
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.require(1)?;
        self.buffer.read_byte()
    }

    pub fn read_byte_array(&mut self, byte_count: usize) -> Result<Vec<u8>> {
        self.require(byte_count)?;
        self.buffer.read_byte_array(byte_count)
    }

    /// 读取上游剩余的全部字节。
    pub fn read_all_bytes(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.buffer.write_all_from(&mut self.source)?;
        Ok(self.buffer.read_all_bytes())
    }

    /// 读取至多 `dst.len()` 个字节；缓冲为空时先向上游拉取一次，上游耗尽返回 `None`。
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        self.ensure_open()?;
        if self.buffer.is_empty() && !self.fill()? {
            return Ok(None);
        }
        Ok(Some(self.buffer.read_into(dst).unwrap_or(0)))
    }

    /// 丢弃 `byte_count` 个字节；上游提前耗尽时返回 `EndOfData`。
    pub fn skip(&mut self, byte_count: usize) -> Result<()> {
        self.ensure_open()?;
        let mut remaining = byte_count;
        while remaining > 0 {
            if self.buffer.is_empty() && !self.fill()? {
                return Err(SegmentError::end_of_data(format!(
                    "上游已耗尽：仍需跳过 {remaining} 字节"
                )));
            }
            let step = remaining.min(self.buffer.size());
            self.buffer.skip(step)?;
            remaining -= step;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();
        self.source.close()
    }
}

impl<S: Source> Source for BufferedSource<S> {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        self.ensure_open()?;
        if byte_count == 0 {
            return Ok(Some(0));
        }
        if self.buffer.is_empty() && !self.fill()? {
            return Ok(None);
        }
        let moved = byte_count.min(self.buffer.size());
        sink.write_buffer(&mut self.buffer, moved)?;
        Ok(Some(moved))
    }

    fn close(&mut self) -> Result<()> {
        BufferedSource::close(self)
    }
}

impl<S: Source> Drop for BufferedSource<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "buffered source close failed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use spark_segment::{ErrorKind, PoolConfig, SegmentPool};

    use super::*;

    fn upstream(payload: &[u8]) -> Buffer {
        let pool = SegmentPool::with_config(PoolConfig::new(4, 64)).expect("合法配置");
        let mut buffer = Buffer::with_pool(pool);
        buffer.write_slice(payload);
        buffer
    }

    #[test]
    fn request_pulls_segment_sized_chunks() {
        let mut origin = upstream(b"0123456789");
        let local = Buffer::with_pool(SegmentPool::with_config(PoolConfig::new(4, 64)).expect("配置"));
        let mut source = BufferedSource::with_buffer(&mut origin, local);
        assert!(source.request(5).expect("预取"));
        assert_eq!(source.buffer().size(), 8);
        assert!(!source.request(11).expect("预取"));
        assert_eq!(source.buffer().size(), 10);
        assert_eq!(
            source.require(11).expect_err("不足").kind(),
            ErrorKind::EndOfData
        );
        assert_eq!(source.read_byte_array(10).expect("读取"), b"0123456789");
        assert!(source.exhausted().expect("已耗尽"));
    }

    #[test]
    fn skip_past_the_end_reports_end_of_data() {
        let mut origin = upstream(b"abc");
        let mut source = BufferedSource::new(&mut origin);
        assert_eq!(
            source.skip(4).expect_err("越过末尾").kind(),
            ErrorKind::EndOfData
        );
        source.close().expect("关闭");
        assert_eq!(
            source.read_byte().expect_err("已关闭").kind(),
            ErrorKind::IllegalState
        );
    }
}
