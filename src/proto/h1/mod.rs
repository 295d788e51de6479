//! HTTP/1.1 客户端编解码。
//!
//! 子模块分工：
//! - `decode`: 响应体解码器（Content-Length / Chunked / EOF）
//! - `encode`: 请求序列化
//! - `parse`: 增量响应解析器，组合 httparse 与 `decode`

pub(crate) use self::encode::encode_request;
pub(crate) use self::parse::{Parsed, ResponseParser};

mod decode; // 响应体解码
mod encode; // 请求序列化
mod parse; // 响应解析

/// 读缓冲区上限的最小允许值
pub(crate) const MINIMUM_MAX_BUFFER_SIZE: usize = 8192;

/// 读缓冲区上限的默认值：8KB 的初始缓冲加上 400KB 的增长空间
pub(crate) const DEFAULT_MAX_BUFFER_SIZE: usize = 8192 + 4096 * 100;

/// 默认允许的最大响应头部数量
pub(crate) const DEFAULT_MAX_HEADERS: usize = 100;
