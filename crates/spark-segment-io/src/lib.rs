//! `spark-segment-io` 在分段缓冲之上提供缓冲装饰器与标准库 I/O 适配层。
//!
//! # 模块定位（Why）
//! - 核心 crate 只关心分段、池与拼接；与操作系统流打交道的部分放在这里，核心保持与 I/O 解耦；
//! - 适配器直接在分段的可读/可写区域上调用底层 `read`/`write`，不引入中间数组。
//!
//! # 设计概要（How）
//! - `buffered_sink` / `buffered_source`：为任意 `Sink` / `Source` 加上内存缓冲，
//!   写侧只向下游转交写满的分段，读侧按分段粒度预取；
//! - `adapters`：`io::Write`、`io::Read` 与文件到 `Sink`/`Source` 的转换；
//! - `error`：底层 I/O 错误到稳定错误码的映射表。

mod adapters;
mod buffered_sink;
mod buffered_source;
mod error;

pub use adapters::{
    ReaderSource, WriterSink, buffer_sink, buffer_source, file_source, reader_source, writer_sink,
};
pub use buffered_sink::BufferedSink;
pub use buffered_source::BufferedSource;
pub use error::codes;
