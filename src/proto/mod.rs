//! 协议层：会话引擎与 HTTP/1.1 编解码。
//!
//! 本模块位于传输层（`rt`）和上层 API（`client`）之间。`engine` 负责连接生命周期与
//! 请求/响应的关联，`h1` 负责字节层面的序列化和解析，`finalize` 在交付前对完整
//! 响应做解压和 JSON 解析。

pub(crate) mod engine;
mod finalize;
pub(crate) mod h1;

pub(crate) use self::engine::{Command, Config, Engine, Event, TransportEvent};
