//! 增量响应解析器
//!
//! 传输层交来的字节被追加到读缓冲区，然后尽可能多地推进解析：
//! 先解析状态行和头部（`httparse`），再用 [`Decoder`] 读取响应体。
//! 一个响应完成之后，读缓冲区中剩余的字节保留下来，属于下一个响应。
//!
//! 解析器不知道哪个请求正在等待响应；调用方在每次 `parse` 时传入队首请求的方法
//! （HEAD 的响应没有响应体）。

use std::mem;

use bytes::{Buf, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONNECTION};
use http::{HeaderMap, Method, StatusCode, Version};

use super::decode::Decoder;
use crate::error::Parse;

/// 一个完整解析出来的响应。
#[derive(Debug)]
pub(crate) struct Parsed {
    pub(crate) response: http::Response<Bytes>,
    /// 服务端是否允许复用这条连接
    pub(crate) keep_alive: bool,
}

#[derive(Debug)]
struct Head {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    keep_alive: bool,
}

#[derive(Debug)]
enum State {
    /// 等待状态行和头部
    Head,
    /// 头部已解析，正在读取响应体
    Body {
        head: Head,
        decoder: Decoder,
        body: BytesMut,
    },
}

#[derive(Debug)]
pub(crate) struct ResponseParser {
    buf: BytesMut,
    state: State,
    max_headers: usize,
    max_buf_size: usize,
}

impl ResponseParser {
    pub(crate) fn new(max_headers: usize, max_buf_size: usize) -> ResponseParser {
        ResponseParser {
            buf: BytesMut::new(),
            state: State::Head,
            max_headers,
            max_buf_size,
        }
    }

    /// 追加收到的字节。
    pub(crate) fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 是否持有一个响应的部分数据（头部或响应体）。
    pub(crate) fn has_buffered(&self) -> bool {
        !self.buf.is_empty() || matches!(self.state, State::Body { .. })
    }

    /// 丢弃所有已缓冲的数据，回到初始状态。换新连接时调用。
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.state = State::Head;
    }

    /// 推进解析。
    ///
    /// 返回 `Ok(None)` 表示数据还不够；`Ok(Some(..))` 表示得到了一个完整响应。
    pub(crate) fn parse(&mut self, method: &Method) -> Result<Option<Parsed>, Parse> {
        loop {
            match self.state {
                State::Head => {
                    let head = match self.parse_head()? {
                        Some(head) => head,
                        None => {
                            if self.buf.len() >= self.max_buf_size {
                                debug!("response head exceeds {} bytes", self.max_buf_size);
                                return Err(Parse::TooLarge);
                            }
                            return Ok(None);
                        }
                    };

                    // 除 101 之外的 1xx 响应：丢弃，继续等真正的响应
                    if head.status.is_informational()
                        && head.status != StatusCode::SWITCHING_PROTOCOLS
                    {
                        trace!("ignoring informational response: {}", head.status);
                        continue;
                    }

                    let decoder =
                        Decoder::for_response(method, head.status, head.version, &head.headers)?;
                    trace!("response {} body framing {:?}", head.status, decoder);
                    self.state = State::Body {
                        head,
                        decoder,
                        body: BytesMut::new(),
                    };
                }
                State::Body {
                    ref mut decoder,
                    ref mut body,
                    ..
                } => {
                    if !decoder.decode(&mut self.buf, body)? {
                        return Ok(None);
                    }
                    return Ok(self.finish());
                }
            }
        }
    }

    /// 连接关闭时调用：以 EOF 定界的响应在这里完成。
    ///
    /// 其它状态下返回 `None`，表示连接上没有可以完成的响应。
    pub(crate) fn finish_eof(&mut self) -> Option<Parsed> {
        match self.state {
            State::Body {
                ref decoder,
                ref mut body,
                ..
            } if decoder.is_eof() => {
                body.extend_from_slice(&self.buf.split());
                self.finish()
            }
            _ => None,
        }
    }

    fn finish(&mut self) -> Option<Parsed> {
        match mem::replace(&mut self.state, State::Head) {
            State::Body { head, body, .. } => {
                let mut response = http::Response::new(body.freeze());
                *response.status_mut() = head.status;
                *response.version_mut() = head.version;
                *response.headers_mut() = head.headers;
                Some(Parsed {
                    response,
                    keep_alive: head.keep_alive,
                })
            }
            State::Head => None,
        }
    }

    fn parse_head(&mut self) -> Result<Option<Head>, Parse> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let (len, head) = {
            let mut res = httparse::Response::new(&mut headers);
            let len = match res.parse(&self.buf)? {
                httparse::Status::Complete(len) => len,
                httparse::Status::Partial => return Ok(None),
            };

            let status = res
                .code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or(Parse::Status)?;
            let version = match res.version {
                Some(1) => Version::HTTP_11,
                Some(0) => Version::HTTP_10,
                _ => return Err(Parse::Version),
            };

            let mut map = HeaderMap::with_capacity(res.headers.len());
            for header in res.headers.iter() {
                let name =
                    HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| Parse::Header)?;
                let value = HeaderValue::from_bytes(header.value).map_err(|_| Parse::Header)?;
                map.append(name, value);
            }

            let keep_alive = keep_alive(version, &map);
            (
                len,
                Head {
                    status,
                    version,
                    headers: map,
                    keep_alive,
                },
            )
        };

        self.buf.advance(len);
        trace!("parsed response head, {} bytes, {} headers", len, head.headers.len());
        Ok(Some(head))
    }
}

/// HTTP/1.1 默认保持连接，除非 `Connection: close`；HTTP/1.0 必须显式要求 keep-alive。
fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let has_token = |token: &str| {
        headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };
    match version {
        Version::HTTP_10 => has_token("keep-alive"),
        _ => !has_token("close"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ResponseParser {
        ResponseParser::new(100, 8192)
    }

    #[test]
    fn content_length_response() {
        let mut p = parser();
        p.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        let parsed = p.parse(&Method::GET).unwrap().unwrap();
        assert_eq!(parsed.response.status(), StatusCode::OK);
        assert_eq!(parsed.response.body(), "hello");
        assert!(parsed.keep_alive);
        assert!(!p.has_buffered());
    }

    #[test]
    fn head_split_across_feeds() {
        let mut p = parser();
        p.feed(b"HTTP/1.1 404 Not");
        assert!(p.parse(&Method::GET).unwrap().is_none());
        p.feed(b" Found\r\ncontent-length: 0\r\n");
        assert!(p.parse(&Method::GET).unwrap().is_none());
        p.feed(b"\r\n");
        let parsed = p.parse(&Method::GET).unwrap().unwrap();
        assert_eq!(parsed.response.status(), StatusCode::NOT_FOUND);
        assert!(parsed.response.body().is_empty());
    }

    #[test]
    fn two_responses_in_one_read() {
        let mut p = parser();
        p.feed(
            b"HTTP/1.1 200 OK\r\ncontent-length: 1\r\n\r\nA\
              HTTP/1.1 201 Created\r\ncontent-length: 1\r\n\r\nB",
        );
        let first = p.parse(&Method::GET).unwrap().unwrap();
        assert_eq!(first.response.body(), "A");
        assert!(p.has_buffered());
        let second = p.parse(&Method::GET).unwrap().unwrap();
        assert_eq!(second.response.status(), StatusCode::CREATED);
        assert_eq!(second.response.body(), "B");
    }

    #[test]
    fn informational_responses_are_skipped() {
        let mut p = parser();
        p.feed(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok");
        let parsed = p.parse(&Method::POST).unwrap().unwrap();
        assert_eq!(parsed.response.status(), StatusCode::OK);
        assert_eq!(parsed.response.body(), "ok");
    }

    #[test]
    fn head_request_has_no_body() {
        let mut p = parser();
        p.feed(b"HTTP/1.1 200 OK\r\ncontent-length: 1000\r\n\r\n");
        let parsed = p.parse(&Method::HEAD).unwrap().unwrap();
        assert!(parsed.response.body().is_empty());
        assert_eq!(parsed.response.headers()["content-length"], "1000");
    }

    #[test]
    fn eof_delimited_body() {
        let mut p = parser();
        p.feed(b"HTTP/1.0 200 OK\r\n\r\npart one, ");
        assert!(p.parse(&Method::GET).unwrap().is_none());
        p.feed(b"part two");
        assert!(p.parse(&Method::GET).unwrap().is_none());
        let parsed = p.finish_eof().unwrap();
        assert_eq!(parsed.response.body(), "part one, part two");
        assert_eq!(parsed.response.version(), Version::HTTP_10);
        assert!(!parsed.keep_alive);
    }

    #[test]
    fn finish_eof_without_eof_body_is_none() {
        let mut p = parser();
        p.feed(b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nabc");
        assert!(p.parse(&Method::GET).unwrap().is_none());
        assert!(p.finish_eof().is_none());
    }

    #[test]
    fn connection_close_is_reported() {
        let mut p = parser();
        p.feed(b"HTTP/1.1 200 OK\r\nConnection: Close\r\ncontent-length: 0\r\n\r\n");
        assert!(!p.parse(&Method::GET).unwrap().unwrap().keep_alive);

        p.feed(b"HTTP/1.0 200 OK\r\nConnection: keep-alive\r\ncontent-length: 0\r\n\r\n");
        assert!(p.parse(&Method::GET).unwrap().unwrap().keep_alive);
    }

    #[test]
    fn malformed_status_line() {
        let mut p = parser();
        p.feed(b"garbage\r\n\r\n");
        assert!(p.parse(&Method::GET).is_err());
    }

    #[test]
    fn too_many_headers() {
        let mut p = ResponseParser::new(2, 8192);
        p.feed(b"HTTP/1.1 200 OK\r\na: 1\r\nb: 2\r\nc: 3\r\n\r\n");
        assert_eq!(p.parse(&Method::GET).unwrap_err(), Parse::TooLarge);
    }

    #[test]
    fn head_larger_than_buffer() {
        let mut p = ResponseParser::new(100, 8192);
        p.feed(b"HTTP/1.1 200 OK\r\n");
        let filler = vec![b'a'; 9000];
        p.feed(b"x-filler: ");
        p.feed(&filler);
        assert_eq!(p.parse(&Method::GET).unwrap_err(), Parse::TooLarge);
    }

    #[test]
    fn reset_discards_partial_response() {
        let mut p = parser();
        p.feed(b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nabc");
        assert!(p.parse(&Method::GET).unwrap().is_none());
        assert!(p.has_buffered());
        p.reset();
        assert!(!p.has_buffered());
    }
}
