use std::{fs::File, io, path::Path};

use spark_segment::{Buffer, Result, Sink, Source, check_offset_and_count};

use crate::{
    buffered_sink::BufferedSink,
    buffered_source::BufferedSource,
    error::{FLUSH, OPEN, READ, WRITE, closed_error, map_io_error},
};

/// 把 [`io::Write`] 适配为 [`Sink`]：每个分段的可读区域对应一次 `write_all`，不经过中间数组。
///
/// 关闭时先冲刷再丢弃写端；之后的任何操作返回 `IllegalState`。
pub struct WriterSink<W: io::Write> {
    writer: Option<W>,
}

pub fn writer_sink<W: io::Write>(writer: W) -> WriterSink<W> {
    WriterSink {
        writer: Some(writer),
    }
}

impl<W: io::Write> WriterSink<W> {
    /// 被包装的写端；关闭后为 `None`。
    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

impl<W: io::Write> Sink for WriterSink<W> {
    fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| closed_error(WRITE))?;
        check_offset_and_count(source.size(), 0, byte_count)?;
        let mut remaining = byte_count;
        while remaining > 0 {
            let written = source
                .drain_head(remaining, |chunk| writer.write_all(chunk).map(|()| chunk.len()))
                .map_err(|err| map_io_error(WRITE, err))?;
            remaining -= written;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| closed_error(FLUSH))?;
        writer.flush().map_err(|err| map_io_error(FLUSH, err))
    }

    fn close(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush().map_err(|err| map_io_error(FLUSH, err)),
            None => Ok(()),
        }
    }
}

/// 把 [`io::Read`] 适配为 [`Source`]：直接读进目标缓冲尾部分段的可写区域，每次调用最多一个分段。
///
/// 底层读端返回 `Ok(0)` 视为耗尽；`Interrupted` 自动重试。
pub struct ReaderSource<R: io::Read> {
    reader: Option<R>,
}

pub fn reader_source<R: io::Read>(reader: R) -> ReaderSource<R> {
    ReaderSource {
        reader: Some(reader),
    }
}

impl<R: io::Read> ReaderSource<R> {
    pub fn get_ref(&self) -> Option<&R> {
        self.reader.as_ref()
    }
}

impl<R: io::Read> Source for ReaderSource<R> {
    fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
        let reader = self.reader.as_mut().ok_or_else(|| closed_error(READ))?;
        if byte_count == 0 {
            return Ok(Some(0));
        }
        loop {
            match sink.fill_tail(byte_count, |spare| reader.read(spare)) {
                Ok(0) => return Ok(None),
                Ok(read) => return Ok(Some(read)),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_io_error(READ, err)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// 打开文件作为数据源。
pub fn file_source(path: impl AsRef<Path>) -> Result<ReaderSource<File>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| map_io_error(OPEN, err))?;
    tracing::debug!(path = %path.display(), "opened file source");
    Ok(reader_source(file))
}

/// 为消费者加上缓冲装饰。
pub fn buffer_sink<S: Sink>(sink: S) -> BufferedSink<S> {
    BufferedSink::new(sink)
}

/// 为生产者加上缓冲装饰。
pub fn buffer_source<S: Source>(source: S) -> BufferedSource<S> {
    BufferedSource::new(source)
}
