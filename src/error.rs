//! 错误与结果分类模块
//!
//! 每个提交给 [`Session`](crate::Session) 的请求最终只会得到一个结果：成功的
//! [`Response`](crate::Response)，或者一个 [`Error`]。`Error` 是不透明的，
//! 调用方通过 `is_*` 方法或 [`Error::outcome`] 判断它属于哪一类。
//!
//! ## 设计理念
//!
//! - **不透明错误**：`Error` 使用 `Box<ErrorImpl>` 包装内部实现，栈上只占一个指针宽度。
//! - **错误链**：通过 `std::error::Error::source()` 暴露底层原因（如 `io::Error`）。
//! - **结果分类**：[`Outcome`] 是回调能看到的终态分类，和连接层的失败一一对应。

use std::error::Error as StdError;
use std::fmt;

/// 本 crate 方法常用的 Result 类型别名。
pub type Result<T> = std::result::Result<T, Error>;

/// 类型擦除的错误原因。
type Cause = Box<dyn StdError + Send + Sync>;

/// 一个请求未能得到响应的原因。
///
/// # 格式化
///
/// `Display` 只打印当前层级的描述；底层原因通过 `Error::source()` 获取。
/// 描述文字的具体内容不属于稳定 API。
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

/// 错误分类，仅供 crate 内部使用。
#[derive(Debug)]
pub(super) enum Kind {
    /// 地址解析失败、连接失败，或目标端点根本无法连接。
    BadServerAddress,
    /// 已建立的连接在响应完成之前断开。
    NetworkFailure,
    /// 收到的字节无法被解析为 HTTP 响应。
    BadResponse(Parse),
    /// 引擎任务在请求完成之前消失了。
    Canceled,
}

/// 响应解析错误的子分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Parse {
    /// 无效的 HTTP 版本
    Version,
    /// 无效的状态码或状态行
    Status,
    /// 无效的头部名称或值
    Header,
    /// 响应头部超过了缓冲区或头部数量限制
    TooLarge,
    /// 无效或相互冲突的 Content-Length
    ContentLength,
    /// HTTP/1.0 响应里出现了 Transfer-Encoding
    TransferEncoding,
    /// chunked 编码格式错误
    Chunk,
}

/// 一个请求的终态分类。
///
/// 每个提交的请求恰好得到一个 `Outcome`，并且只得到一次。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// 收到并处理完了完整的响应。
    Ok,
    /// 地址解析失败、连接尝试失败，或端点永远无法解析。
    BadServerAddress,
    /// 已建立的连接在响应完成前断开。
    NetworkFailure,
    /// 解析器无法理解收到的字节。
    BadResponse,
    /// 引擎在请求完成之前被销毁（例如执行器被关闭）。
    Canceled,
}

impl Outcome {
    /// 对一个请求结果进行分类。
    pub fn of<T>(result: &Result<T>) -> Outcome {
        match result {
            Ok(_) => Outcome::Ok,
            Err(err) => err.outcome(),
        }
    }
}

impl Error {
    /// 返回该错误对应的结果分类。
    pub fn outcome(&self) -> Outcome {
        match self.inner.kind {
            Kind::BadServerAddress => Outcome::BadServerAddress,
            Kind::NetworkFailure => Outcome::NetworkFailure,
            Kind::BadResponse(_) => Outcome::BadResponse,
            Kind::Canceled => Outcome::Canceled,
        }
    }

    /// 如果目标地址无法解析或无法连接，返回 `true`。
    pub fn is_bad_server_address(&self) -> bool {
        matches!(self.inner.kind, Kind::BadServerAddress)
    }

    /// 如果连接在响应完成前断开，返回 `true`。
    pub fn is_network_failure(&self) -> bool {
        matches!(self.inner.kind, Kind::NetworkFailure)
    }

    /// 如果响应无法被解析，返回 `true`。
    pub fn is_bad_response(&self) -> bool {
        matches!(self.inner.kind, Kind::BadResponse(_))
    }

    /// 如果是因为响应头部过大而解析失败，返回 `true`。
    pub fn is_parse_too_large(&self) -> bool {
        matches!(self.inner.kind, Kind::BadResponse(Parse::TooLarge))
    }

    /// 如果请求因为引擎消失而被取消，返回 `true`。
    pub fn is_canceled(&self) -> bool {
        matches!(self.inner.kind, Kind::Canceled)
    }

    pub(super) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    /// 为错误附加一个原因，支持链式调用：`Error::new(kind).with(cause)`。
    pub(super) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(super) fn new_bad_server_address() -> Error {
        Error::new(Kind::BadServerAddress)
    }

    pub(super) fn new_network_failure() -> Error {
        Error::new(Kind::NetworkFailure)
    }

    pub(super) fn new_canceled() -> Error {
        Error::new(Kind::Canceled)
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::BadServerAddress => "server address could not be resolved or connected",
            Kind::NetworkFailure => "connection closed before response completed",
            Kind::BadResponse(Parse::Version) => "invalid HTTP version parsed",
            Kind::BadResponse(Parse::Status) => "invalid HTTP status-code parsed",
            Kind::BadResponse(Parse::Header) => "invalid HTTP header parsed",
            Kind::BadResponse(Parse::TooLarge) => "message head is too large",
            Kind::BadResponse(Parse::ContentLength) => "invalid content-length parsed",
            Kind::BadResponse(Parse::TransferEncoding) => "unexpected transfer-encoding parsed",
            Kind::BadResponse(Parse::Chunk) => "invalid chunked body parsed",
            Kind::Canceled => "operation was canceled",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("h1_session::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

/// 解析错误总是以 `BadResponse` 的形式交给回调。
impl From<Parse> for Error {
    fn from(err: Parse) -> Error {
        Error::new(Kind::BadResponse(err))
    }
}

/// 把 `httparse` 的错误映射到内部的 `Parse` 分类。
impl From<httparse::Error> for Parse {
    fn from(err: httparse::Error) -> Parse {
        match err {
            httparse::Error::HeaderName
            | httparse::Error::HeaderValue
            | httparse::Error::NewLine
            | httparse::Error::Token => Parse::Header,
            httparse::Error::Status => Parse::Status,
            httparse::Error::TooManyHeaders => Parse::TooLarge,
            httparse::Error::Version => Parse::Version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    fn assert_send_sync<T: Send + Sync + 'static>() {}

    #[test]
    fn error_satisfies_send_sync() {
        assert_send_sync::<Error>()
    }

    #[test]
    fn error_size_of() {
        assert_eq!(mem::size_of::<Error>(), mem::size_of::<usize>());
    }

    #[test]
    fn outcome_follows_kind() {
        assert_eq!(
            Error::new_bad_server_address().outcome(),
            Outcome::BadServerAddress
        );
        assert_eq!(
            Error::new_network_failure().outcome(),
            Outcome::NetworkFailure
        );
        assert_eq!(Error::from(Parse::Chunk).outcome(), Outcome::BadResponse);
        assert_eq!(Error::new_canceled().outcome(), Outcome::Canceled);
        assert_eq!(Outcome::of(&Ok::<(), Error>(())), Outcome::Ok);
    }

    #[test]
    fn httparse_errors_are_bad_responses() {
        let err = Error::from(Parse::from(httparse::Error::TooManyHeaders));
        assert!(err.is_bad_response());
        assert!(err.is_parse_too_large());

        let err = Error::from(Parse::from(httparse::Error::Version));
        assert_eq!(err.to_string(), "invalid HTTP version parsed");
    }

    #[test]
    fn source_exposes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::new_bad_server_address().with(io);
        let source = err.source().expect("cause");
        assert_eq!(source.to_string(), "refused");
        // Display 只打印当前层级
        assert!(!err.to_string().contains("refused"));
    }
}
