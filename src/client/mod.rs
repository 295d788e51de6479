//! HTTP/1 客户端会话
//!
//! 一个 [`Session`] 对应一个远端端点上的一条逻辑连接。它不是连接池：同一时刻至多
//! 只有一个传输层，请求按提交顺序在这条连接上逐个发送。
//!
//! ## 子模块结构
//!
//! - `session`：公共句柄 [`Session`] 与配置 [`Builder`]。
//! - `endpoint`：host 字符串解析，得到 [`Endpoint`]。
//! - `dispatch`：内部模块：待处理请求、只触发一次的回调、FIFO 队列。
//!
//! ## 示例
//!
//! * `demos/client.rs`：对同一个站点依次发出多个 GET，打印状态和长度。
//! * `demos/client_json.rs`：获取一个 JSON 接口，使用预解析的 `serde_json::Value`。

pub(crate) mod dispatch;
mod endpoint;
mod session;

pub use self::endpoint::Endpoint;
pub use self::session::{Builder, ConnectionState, Session};
