use std::io;

use spark_segment::{ErrorKind, SegmentError};

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const WRITE: OperationKind = OperationKind {
    code: "spark.segment.io.write_failed",
    message: "segment io write",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "spark.segment.io.read_failed",
    message: "segment io read",
};
pub(crate) const FLUSH: OperationKind = OperationKind {
    code: "spark.segment.io.flush_failed",
    message: "segment io flush",
};
pub(crate) const OPEN: OperationKind = OperationKind {
    code: "spark.segment.io.open_failed",
    message: "segment io open",
};

const CLOSED_CODE: &str = "spark.segment.io.closed";

/// 将 IO 错误映射为 `SegmentError`，原始 `io::Error` 作为 cause 保留。
pub(crate) fn map_io_error(kind: OperationKind, error: io::Error) -> SegmentError {
    let message = format!("{}: {}", kind.message, error);
    SegmentError::io(kind.code, message, error)
}

/// 构造“已关闭后继续使用”的错误。
pub(crate) fn closed_error(kind: OperationKind) -> SegmentError {
    SegmentError::new(
        ErrorKind::IllegalState,
        CLOSED_CODE,
        format!("{} after close", kind.message),
    )
}

/// 稳定错误码，供调用方匹配。
pub mod codes {
    pub const WRITE_FAILED: &str = super::WRITE.code;
    pub const READ_FAILED: &str = super::READ.code;
    pub const FLUSH_FAILED: &str = super::FLUSH.code;
    pub const OPEN_FAILED: &str = super::OPEN.code;
    pub const CLOSED: &str = super::CLOSED_CODE;
}
