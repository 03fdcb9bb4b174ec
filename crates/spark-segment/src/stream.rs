use std::io;

use crate::{buffer::Buffer, error::Result};

/// `Sink` 是字节消费者契约：从给定缓冲的头部取走字节并送往某个目的地。
///
/// # 契约说明（What）
/// - `write`：从 `source` 头部移走恰好 `byte_count` 个字节；`byte_count > source.size()` 返回 `OutOfRange`；
/// - `flush`：把实现内部缓存的字节推向目的地；
/// - `close`：先冲刷再释放目的地，可重复调用；冲刷失败也必须完成释放，两步均失败时报告先发生的错误。
pub trait Sink {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// `Source` 是字节生产者契约：向给定缓冲的尾部追加新产生的字节。
///
/// # 契约说明（What）
/// - `read`：至多追加 `byte_count` 个字节，返回实际追加数；生产者耗尽时返回 `Ok(None)`；
/// - `close`：释放数据源，可重复调用。
pub trait Source {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>>;

    fn close(&mut self) -> Result<()>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        (**self).write(source, byte_count)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        (**self).write(source, byte_count)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: Source + ?Sized> Source for &mut S {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        (**self).read(sink, byte_count)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        (**self).read(sink, byte_count)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// 缓冲本身没有外部目的地，`flush`/`close` 均为空操作。
impl Sink for Buffer {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        self.write_buffer(source, byte_count)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Source for Buffer {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        if self.is_empty() {
            return Ok(None);
        }
        let byte_count = byte_count.min(self.size());
        sink.write_buffer(self, byte_count)?;
        Ok(Some(byte_count))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf).unwrap_or(0))
    }
}

impl io::BufRead for Buffer {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.head_slice())
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.head_slice().len());
        self.consume_front(amt);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, Read, Write};

    use super::{Sink, Source};
    use crate::{Buffer, ErrorKind, SegmentPool};

    fn buffer_with(payload: &[u8]) -> Buffer {
        let mut buffer = Buffer::with_pool(SegmentPool::new());
        buffer.write_slice(payload);
        buffer
    }

    #[test]
    fn buffer_as_source_moves_at_most_what_it_holds() {
        let mut source = buffer_with(b"abcdef");
        let mut sink = Buffer::with_pool(SegmentPool::new());
        assert_eq!(Source::read(&mut source, &mut sink, 4).expect("读取"), Some(4));
        assert_eq!(Source::read(&mut source, &mut sink, 100).expect("读取"), Some(2));
        assert_eq!(Source::read(&mut source, &mut sink, 1).expect("读取"), None);
        assert_eq!(sink.read_all_bytes(), b"abcdef");
    }

    #[test]
    fn buffer_as_sink_rejects_oversized_writes() {
        let mut source = buffer_with(b"abc");
        let mut sink = Buffer::with_pool(SegmentPool::new());
        let err = Sink::write(&mut sink, &mut source, 5).expect_err("越界");
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        Sink::flush(&mut sink).expect("空操作");
        Sink::close(&mut sink).expect("空操作");
        Sink::close(&mut sink).expect("可重复关闭");
        assert_eq!(source.size(), 3);
    }

    #[test]
    fn boxed_and_borrowed_streams_delegate() {
        let mut sink: Box<dyn Sink> = Box::new(Buffer::with_pool(SegmentPool::new()));
        let mut source = buffer_with(b"xyz");
        Sink::write(&mut sink, &mut source, 3).expect("写入");
        assert!(source.is_empty());

        let mut upstream = buffer_with(b"123");
        let mut by_ref: &mut dyn Source = &mut upstream;
        let mut collected = Buffer::with_pool(SegmentPool::new());
        assert_eq!(collected.write_all_from(&mut by_ref).expect("读取"), 3);
        assert_eq!(collected.read_all_bytes(), b"123");
    }

    #[test]
    fn std_io_traits_round_trip() {
        let mut buffer = Buffer::with_pool(SegmentPool::new());
        buffer.write_all(b"line one\nline two\n").expect("写入");
        let mut first = String::new();
        buffer.read_line(&mut first).expect("读取行");
        assert_eq!(first, "line one\n");
        let mut rest = Vec::new();
        buffer.read_to_end(&mut rest).expect("读取剩余");
        assert_eq!(rest, b"line two\n");
        assert_eq!(buffer.fill_buf().expect("空缓冲").len(), 0);
    }
}
