//! 交给回调的响应类型。

use std::str;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, Version};

/// 一个完整的 HTTP 响应。
///
/// 响应体已经完整读入内存；如果开启了解压，`Content-Encoding` 为 gzip/deflate 的
/// 响应体已经被解压。`Content-Type` 为 JSON 时，响应体还会被预先解析一次，
/// 结果通过 [`json`](Response::json) / [`json_error`](Response::json_error) 获取。
#[derive(Debug)]
pub struct Response {
    inner: http::Response<Bytes>,
    json: Json,
    keep_alive: bool,
}

#[derive(Debug)]
pub(crate) enum Json {
    /// 不是 JSON 响应，或没有开启 JSON 解码
    Absent,
    Value(serde_json::Value),
    Invalid(serde_json::Error),
}

impl Response {
    pub(crate) fn new(inner: http::Response<Bytes>, json: Json, keep_alive: bool) -> Response {
        Response {
            inner,
            json,
            keep_alive,
        }
    }

    /// 状态码。
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// HTTP 版本。
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// 所有响应头部。
    pub fn headers(&self) -> &HeaderMap<HeaderValue> {
        self.inner.headers()
    }

    /// 取某个头部的值。不存在或不是合法 UTF-8 时返回 `None`。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    /// 响应体。
    pub fn body(&self) -> &Bytes {
        self.inner.body()
    }

    /// 把响应体当作 UTF-8 文本。
    pub fn text(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(self.inner.body())
    }

    /// 预先解析好的 JSON 值。
    ///
    /// 只有 `Content-Type` 是 `application/json`（或 `+json` 后缀）且解析成功时
    /// 才是 `Some`。
    pub fn json(&self) -> Option<&serde_json::Value> {
        match self.json {
            Json::Value(ref value) => Some(value),
            _ => None,
        }
    }

    /// JSON 解析失败时的错误。
    pub fn json_error(&self) -> Option<&serde_json::Error> {
        match self.json {
            Json::Invalid(ref err) => Some(err),
            _ => None,
        }
    }

    /// 服务端是否允许复用这条连接。
    ///
    /// 为 `false` 时引擎会在这个响应之后关闭连接（如果没有后续请求的话）。
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// 转换成 `http::Response`，丢弃预解析的 JSON。
    pub fn into_inner(self) -> http::Response<Bytes> {
        self.inner
    }

    /// 取出响应体。
    pub fn into_body(self) -> Bytes {
        self.inner.into_body()
    }
}
