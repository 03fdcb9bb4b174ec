use std::{borrow::Cow, io};

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 分段缓冲统一的返回值别名，默认错误类型为 [`SegmentError`]。
pub type Result<T, E = SegmentError> = std::result::Result<T, E>;

/// 错误的处置类别。
///
/// # 契约说明（What）
/// - `InvalidArgument`：参数本身不合法（例如向只读分段写入、配置为零的分段尺寸）；
/// - `OutOfRange`：请求的字节数超过可用数据，或 `offset`/`count` 越出切片边界；
/// - `IllegalState`：在已关闭的装饰器或适配器上继续操作；
/// - `EndOfData`：生产者已耗尽而调用方要求更多字节（仅由 `require` 一类的“必须读满”接口返回，
///   常规 `read` 以 `None` 作为结束哨兵）；
/// - `Io`：被包装的底层流返回的 I/O 错误，原始 [`io::Error`] 保存在 `cause` 中。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidArgument,
    OutOfRange,
    IllegalState,
    EndOfData,
    Io,
}

/// `SegmentError` 是分段缓冲各层共享的稳定错误形态。
///
/// # 设计背景（Why）
/// - 缓冲引擎、缓冲装饰器与流适配器产生的故障需要合流为统一的错误码，便于日志检索与告警聚合；
/// - 错误码 `code` 始终为 `'static` 字符串，承载稳定语义；`message` 面向排障人员；
///   `kind` 供调用方在代码中做分支判断，避免解析字符串。
///
/// # 契约说明（What）
/// - 参数/范围类错误总是同步返回，且返回前不修改任何缓冲状态；
/// - I/O 类错误通过 [`io_error`](Self::io_error) 原样暴露底层 [`io::Error`]；
/// - 类型满足 `Send + Sync + 'static`，可以安全跨线程移动。
#[derive(Debug, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct SegmentError {
    kind: ErrorKind,
    code: &'static str,
    message: Cow<'static, str>,
    #[source]
    cause: Option<ErrorCause>,
}

impl SegmentError {
    /// 构造错误；`code` 应取自 [`codes`] 或遵循 `<域>.<语义>` 约定。
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 参数非法。
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidArgument, codes::INVALID_ARGUMENT, message)
    }

    /// 请求越界。
    pub fn out_of_range(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::OutOfRange, codes::OUT_OF_RANGE, message)
    }

    /// 对象已处于不可用状态（通常为已关闭）。
    pub fn illegal_state(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::IllegalState, codes::ILLEGAL_STATE, message)
    }

    /// 生产者已耗尽，无法满足“必须读满”的请求。
    pub fn end_of_data(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::EndOfData, codes::END_OF_DATA, message)
    }

    /// 以指定错误码包装底层 I/O 错误。
    pub fn io(code: &'static str, message: impl Into<Cow<'static, str>>, error: io::Error) -> Self {
        Self::new(ErrorKind::Io, code, message).with_cause(error)
    }

    /// 附带底层原因并返回新的错误。
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 错误类别。
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 若错误源自底层流，返回未经改写的 [`io::Error`]。
    pub fn io_error(&self) -> Option<&io::Error> {
        self.cause.as_ref()?.downcast_ref::<io::Error>()
    }
}

impl From<io::Error> for SegmentError {
    fn from(error: io::Error) -> Self {
        let message = format!("{error}");
        SegmentError::io(codes::IO, message, error)
    }
}

/// 交回 `std::io` 接口时沿用底层 `io::Error` 的类别，`SegmentError` 本身作为载荷。
impl From<SegmentError> for io::Error {
    fn from(error: SegmentError) -> Self {
        let kind = error.io_error().map_or(io::ErrorKind::Other, io::Error::kind);
        io::Error::new(kind, error)
    }
}

/// 校验 `offset`/`byte_count` 是否落在长度为 `size` 的区间内。
///
/// 越界时返回 [`ErrorKind::OutOfRange`]，消息中携带三个输入值便于排障。
pub fn check_offset_and_count(size: usize, offset: usize, byte_count: usize) -> Result<()> {
    if offset > size || size - offset < byte_count {
        return Err(SegmentError::out_of_range(format!(
            "size={size} offset={offset} byte_count={byte_count}"
        )));
    }
    Ok(())
}

/// 分段缓冲内置的错误码常量集合。
pub mod codes {
    /// 参数非法。
    pub const INVALID_ARGUMENT: &str = "segment.invalid_argument";
    /// 请求超出可用范围。
    pub const OUT_OF_RANGE: &str = "segment.out_of_range";
    /// 在不可用状态下操作。
    pub const ILLEGAL_STATE: &str = "segment.illegal_state";
    /// 生产者耗尽。
    pub const END_OF_DATA: &str = "segment.end_of_data";
    /// 未细分的底层 I/O 错误。
    pub const IO: &str = "segment.io";
    /// 分段池配置非法。
    pub const CONFIG_INVALID: &str = "segment.config_invalid";
}
