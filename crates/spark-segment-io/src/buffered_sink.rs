use std::io;

use spark_segment::{Buffer, Result, Sink, Source};

use crate::error::{WRITE, closed_error};

/// `BufferedSink` 在任意 [`Sink`] 前面加一层内存缓冲，把大量零碎写入合并成整分段的下游写。
///
/// # 设计动机（Why）
/// - 应用层常以字节、短切片为单位写入；若每次都直达下游，系统调用次数与写入次数成正比；
/// - 每次写入后只转交“已经写满的分段”，尾部仍在增长的分段留在本地，
///   既限制了内存占用，又保证下游看到的都是整分段。
///
/// # 契约说明（What）
/// - 所有写入在关闭后返回 `IllegalState`；
/// - [`flush`](Self::flush) 转交全部缓冲字节并冲刷下游；
/// - [`close`](Self::close) 先转交缓冲字节，无论成败都会关闭下游；两步都失败时返回先发生的错误，
///   后一个错误以 `warn` 级别记录；重复调用不产生额外效果；
/// - 未显式关闭时，`Drop` 会执行一次关闭并记录失败。
pub struct BufferedSink<S: Sink> {
    buffer: Buffer,
    sink: S,
    closed: bool,
}

impl<S: Sink> BufferedSink<S> {
    /// 以进程级共享池创建缓冲装饰器。
    pub fn new(sink: S) -> Self {
        Self::with_buffer(sink, Buffer::new())
    }

    /// 使用调用方提供的缓冲（及其分段池）。
    pub fn with_buffer(sink: S, buffer: Buffer) -> Self {
        Self {
            buffer,
            sink,
            closed: false,
        }
    }

    /// 尚未转交下游的字节。
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// 下游消费者。
    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(closed_error(WRITE));
        }
        Ok(())
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_byte(byte);
        self.emit_complete_segments()
    }

    pub fn write_slice(&mut self, src: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_slice(src);
        self.emit_complete_segments()
    }

    pub fn write_range(&mut self, src: &[u8], offset: usize, byte_count: usize) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_range(src, offset, byte_count)?;
        self.emit_complete_segments()
    }

    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_str(text);
        self.emit_complete_segments()
    }

    /// 把 `source` 头部的 `byte_count` 个字节拼接进本地缓冲，再转交完整分段。
    pub fn write_buffer(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        self.ensure_open()?;
        self.buffer.write_buffer(source, byte_count)?;
        self.emit_complete_segments()
    }

    /// 持续从 `source` 读取直到耗尽，每读到一块就转交完整分段；返回读取的总字节数。
    pub fn write_all_from<R>(&mut self, source: &mut R) -> Result<u64>
    where
        R: Source + ?Sized,
    {
        self.ensure_open()?;
        let chunk = self.buffer.pool().segment_size();
        let mut total = 0u64;
        while let Some(read) = source.read(&mut self.buffer, chunk)? {
            total += read as u64;
            self.emit_complete_segments()?;
        }
        Ok(total)
    }

    /// 把已写满的分段转交下游。
    pub fn emit_complete_segments(&mut self) -> Result<()> {
        self.ensure_open()?;
        let byte_count = self.buffer.complete_segment_byte_count();
        if byte_count > 0 {
            self.sink.write(&mut self.buffer, byte_count)?;
        }
        Ok(())
    }

    /// 转交全部缓冲字节并冲刷下游。
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        let size = self.buffer.size();
        if size > 0 {
            self.sink.write(&mut self.buffer, size)?;
        }
        self.sink.flush()
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut first_error = None;
        let size = self.buffer.size();
        if size > 0 {
            if let Err(err) = self.sink.write(&mut self.buffer, size) {
                first_error = Some(err);
            }
        }
        if let Err(err) = self.sink.close() {
            match &first_error {
                None => first_error = Some(err),
                Some(first) => tracing::warn!(
                    error = %err,
                    first = %first,
                    "suppressed sink close failure after emit failure"
                ),
            }
        }
        self.closed = true;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<S: Sink> Sink for BufferedSink<S> {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        self.write_buffer(source, byte_count)
    }

    fn flush(&mut self) -> Result<()> {
        BufferedSink::flush(self)
    }

    fn close(&mut self) -> Result<()> {
        BufferedSink::close(self)
    }
}

impl<S: Sink> io::Write for BufferedSink<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_slice(buf).map_err(io::Error::from)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        BufferedSink::flush(self).map_err(io::Error::from)
    }
}

impl<S: Sink> Drop for BufferedSink<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "buffered sink close failed on drop");
        }
    }
}
