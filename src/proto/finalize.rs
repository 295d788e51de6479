//! 响应的最后处理：解压，然后按需解析 JSON。
//!
//! 顺序不能反过来：gzip 压缩的 JSON 响应只有解压之后才能解析。

use std::io::Read;

use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};

use super::h1::Parsed;
use crate::response::{Json, Response};

#[derive(Clone, Copy, Debug)]
pub(crate) struct Finalize {
    pub(crate) decompress: bool,
    pub(crate) decode_json: bool,
}

pub(crate) fn finalize(parsed: Parsed, opts: Finalize) -> Response {
    let Parsed {
        response,
        keep_alive,
    } = parsed;
    let (mut parts, mut body) = response.into_parts();

    if opts.decompress {
        decompress(&mut parts.headers, &mut body);
    }

    let json = if opts.decode_json && is_json(&parts.headers) {
        match serde_json::from_slice(&body) {
            Ok(value) => Json::Value(value),
            Err(err) => {
                debug!("response body is not valid json: {}", err);
                Json::Invalid(err)
            }
        }
    } else {
        Json::Absent
    };

    Response::new(http::Response::from_parts(parts, body), json, keep_alive)
}

/// 解压成功后移除 `Content-Encoding`，并把 `Content-Length` 改成解压后的长度。
/// 失败时保留原始字节。
fn decompress(headers: &mut HeaderMap, body: &mut Bytes) {
    if body.is_empty() {
        return;
    }
    let encoding = match headers.get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()) {
        Some(encoding) => encoding.trim().to_ascii_lowercase(),
        None => return,
    };

    let decoded = match encoding.as_str() {
        "gzip" | "x-gzip" => read_all(GzDecoder::new(&body[..])),
        // 标准的 deflate 是 zlib 封装，有些服务端会发送裸 deflate 流
        "deflate" => {
            read_all(ZlibDecoder::new(&body[..])).or_else(|_| read_all(DeflateDecoder::new(&body[..])))
        }
        _ => return,
    };

    match decoded {
        Ok(plain) => {
            trace!("decompressed {} body: {} -> {} bytes", encoding, body.len(), plain.len());
            headers.remove(CONTENT_ENCODING);
            headers.insert(CONTENT_LENGTH, HeaderValue::from(plain.len()));
            *body = Bytes::from(plain);
        }
        Err(_err) => {
            warn!("failed to decompress {} body: {}", encoding, _err);
        }
    }
}

fn read_all<R: Read>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// `application/json`，或任何 `+json` 结构化后缀（如 `application/problem+json`）。
fn is_json(headers: &HeaderMap) -> bool {
    let content_type = match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(ct) => ct,
        None => return false,
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
