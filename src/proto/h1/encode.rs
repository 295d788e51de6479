//! 请求序列化
//!
//! 请求总是以 origin-form（`/path?query`）写出，即使 URI 是绝对形式。
//! 请求体是完整的 `Bytes`，所以长度总是已知：除非调用方自己设置了
//! `Transfer-Encoding: chunked`，否则自动补上 `Content-Length`。

use std::fmt::Write as _;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, Request, Version};

/// 把请求写入 `dst`。
pub(crate) fn encode_request(req: &Request<Bytes>, dst: &mut Vec<u8>) {
    let body = req.body();
    let headers = req.headers();

    // 请求行
    dst.extend_from_slice(req.method().as_str().as_bytes());
    dst.push(b' ');
    if req.method() == Method::CONNECT {
        let authority = req.uri().authority().map(|a| a.as_str()).unwrap_or("");
        dst.extend_from_slice(authority.as_bytes());
    } else {
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/");
        dst.extend_from_slice(target.as_bytes());
    }
    match req.version() {
        Version::HTTP_10 => dst.extend_from_slice(b" HTTP/1.0\r\n"),
        _ => dst.extend_from_slice(b" HTTP/1.1\r\n"),
    }

    let chunked = headers
        .get(TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.trim().eq_ignore_ascii_case("chunked"));

    for (name, value) in headers {
        // 由调用方给出的 content-length 会被我们计算出的长度取代
        if name == CONTENT_LENGTH {
            continue;
        }
        dst.extend_from_slice(name.as_str().as_bytes());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }

    if !chunked && (!body.is_empty() || method_expects_body(req.method())) {
        let mut line = String::with_capacity(24);
        // 写入 String 不会失败
        let _ = write!(line, "content-length: {}\r\n", body.len());
        dst.extend_from_slice(line.as_bytes());
    }
    dst.extend_from_slice(b"\r\n");

    if chunked {
        if !body.is_empty() {
            let mut size = String::with_capacity(18);
            let _ = write!(size, "{:X}\r\n", body.len());
            dst.extend_from_slice(size.as_bytes());
            dst.extend_from_slice(body);
            dst.extend_from_slice(b"\r\n");
        }
        dst.extend_from_slice(b"0\r\n\r\n");
    } else {
        dst.extend_from_slice(body);
    }
}

/// 这些方法即使请求体为空也要带上 `content-length: 0`，否则部分服务端会等待请求体。
fn method_expects_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}
