//! HTTP/1 响应体解码器
//!
//! 三种定界方式：
//! - `Length`：`Content-Length` 给出的固定长度；
//! - `Chunked`：`Transfer-Encoding: chunked`；
//! - `Eof`：没有长度信息，读到连接关闭为止。
//!
//! 解码器是增量的：每次从读缓冲区里尽可能多地消费数据，追加到响应体缓冲区，
//! 返回是否已经读完整个响应体。

// Buf 提供 advance；BytesMut 同时用作读缓冲区和响应体缓冲区
use bytes::{Buf, BytesMut};
// 判断定界方式需要的请求方法、状态码和头部
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode, Version};

use crate::error::Parse;

/// chunk 大小行（含扩展）的最大长度
const CHUNK_SIZE_LINE_MAX: usize = 1024;
/// 单行 trailer 的最大长度
const TRAILER_LINE_MAX: usize = 8 * 1024;

/// 响应体解码器
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Decoder {
    /// 剩余的字节数
    Length(u64),
    /// chunked 状态机
    Chunked(ChunkedState),
    /// 读到 EOF 为止
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ChunkedState {
    /// 等待 `<hex-size>[;ext]\r\n`
    Size,
    /// 当前 chunk 还剩多少数据字节
    Data(u64),
    /// chunk 数据之后的 `\r\n`
    DataEnd,
    /// 0 长度 chunk 之后的 trailer 行，直到空行
    Trailer,
    End,
}

impl Decoder {
    /// 根据请求方法、响应状态和头部确定响应体的定界方式（RFC 9112 §6.3）。
    pub(crate) fn for_response(
        method: &Method,
        status: StatusCode,
        version: Version,
        headers: &HeaderMap,
    ) -> Result<Decoder, Parse> {
        // HEAD 的响应、1xx、204、304 都没有响应体
        if method == Method::HEAD
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return Ok(Decoder::Length(0));
        }

        if headers.contains_key(TRANSFER_ENCODING) {
            if version == Version::HTTP_10 {
                debug!("HTTP/1.0 response cannot use transfer-encoding");
                return Err(Parse::TransferEncoding);
            }
            // 最后一个编码是 chunked 才能按 chunked 解码，否则只能读到 EOF
            return if is_chunked(headers) {
                Ok(Decoder::Chunked(ChunkedState::Size))
            } else {
                Ok(Decoder::Eof)
            };
        }

        match content_length(headers)? {
            Some(len) => Ok(Decoder::Length(len)),
            None => Ok(Decoder::Eof),
        }
    }

    /// 是否只能靠连接关闭来结束。
    pub(crate) fn is_eof(&self) -> bool {
        matches!(self, Decoder::Eof)
    }

    /// 从 `src` 消费数据写入 `body`。返回 `Ok(true)` 表示响应体已完整。
    pub(crate) fn decode(&mut self, src: &mut BytesMut, body: &mut BytesMut) -> Result<bool, Parse> {
        match self {
            Decoder::Length(remaining) => {
                let n = std::cmp::min(*remaining, src.len() as u64) as usize;
                body.extend_from_slice(&src.split_to(n));
                *remaining -= n as u64;
                Ok(*remaining == 0)
            }
            Decoder::Chunked(state) => decode_chunked(state, src, body),
            Decoder::Eof => {
                body.extend_from_slice(&src.split());
                Ok(false)
            }
        }
    }
}

fn decode_chunked(
    state: &mut ChunkedState,
    src: &mut BytesMut,
    body: &mut BytesMut,
) -> Result<bool, Parse> {
    loop {
        match *state {
            ChunkedState::Size => {
                let line = match take_line(src, CHUNK_SIZE_LINE_MAX)? {
                    Some(line) => line,
                    None => return Ok(false),
                };
                let size = parse_chunk_size(&line)?;
                trace!("chunk size={}", size);
                *state = if size == 0 {
                    ChunkedState::Trailer
                } else {
                    ChunkedState::Data(size)
                };
            }
            ChunkedState::Data(remaining) => {
                if src.is_empty() {
                    return Ok(false);
                }
                let n = std::cmp::min(remaining, src.len() as u64) as usize;
                body.extend_from_slice(&src.split_to(n));
                let left = remaining - n as u64;
                if left > 0 {
                    *state = ChunkedState::Data(left);
                    return Ok(false);
                }
                *state = ChunkedState::DataEnd;
            }
            ChunkedState::DataEnd => {
                if src.len() < 2 {
                    return Ok(false);
                }
                if &src[..2] != b"\r\n" {
                    debug!("chunk data not followed by CRLF");
                    return Err(Parse::Chunk);
                }
                src.advance(2);
                *state = ChunkedState::Size;
            }
            ChunkedState::Trailer => {
                // trailer 字段直接丢弃
                match take_line(src, TRAILER_LINE_MAX)? {
                    Some(line) if line.is_empty() => *state = ChunkedState::End,
                    Some(_) => {}
                    None => return Ok(false),
                }
            }
            ChunkedState::End => return Ok(true),
        }
    }
}

/// 取出一行（不含 CRLF）。行太长视为格式错误。
fn take_line(src: &mut BytesMut, max: usize) -> Result<Option<BytesMut>, Parse> {
    match src.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => {
            let line = src.split_to(pos);
            src.advance(2);
            Ok(Some(line))
        }
        None if src.len() > max => Err(Parse::Chunk),
        None => Ok(None),
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, Parse> {
    // `;` 之后是 chunk 扩展，忽略
    let size = match line.iter().position(|&b| b == b';') {
        Some(semi) => &line[..semi],
        None => line,
    };
    let size = std::str::from_utf8(size).map_err(|_| Parse::Chunk)?.trim();
    if size.is_empty() {
        return Err(Parse::Chunk);
    }
    u64::from_str_radix(size, 16).map_err(|_| Parse::Chunk)
}

/// `Transfer-Encoding` 的最后一个编码是否为 chunked。
fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .last()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .map_or(false, |last| last.trim().eq_ignore_ascii_case("chunked"))
}

/// 解析所有 `Content-Length` 值。多个值必须一致。
fn content_length(headers: &HeaderMap) -> Result<Option<u64>, Parse> {
    let mut found = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let value = value.to_str().map_err(|_| Parse::ContentLength)?;
        // 允许 `Content-Length: 5, 5` 这种逗号分隔的重复
        for part in value.split(',') {
            let len = part
                .trim()
                .parse::<u64>()
                .map_err(|_| Parse::ContentLength)?;
            match found {
                Some(prev) if prev != len => {
                    debug!("conflicting content-length headers");
                    return Err(Parse::ContentLength);
                }
                _ => found = Some(len),
            }
        }
    }
    Ok(found)
}
