// 以下 lint 属性控制编译器的警告行为：
#![deny(missing_docs)]                         // 所有公共 API 必须有文档注释
#![deny(missing_debug_implementations)]        // 所有公共类型必须实现 Debug trait
#![cfg_attr(test, deny(rust_2018_idioms))]     // 测试时要求使用 Rust 2018 惯用写法
#![cfg_attr(docsrs, feature(doc_cfg))]         // docs.rs 构建时启用 doc_cfg，用于在文档中显示 feature 标记

//! # h1-session
//!
//! 一个**按序**、**回调驱动**的 HTTP/1.1 客户端会话引擎。
//!
//! 一个 [`Session`] 代表与某个远端 HTTP 服务之间的一条逻辑连接。调用方可以在任何时刻、
//! 从任何任务提交请求；引擎把这些请求按提交顺序串行地写到同一条 keep-alive 连接上，
//! 并按顺序把到达的响应配对回对应的请求。
//!
//! HTTP/1.x 的线路协议里没有请求标识符，所以唯一可靠的关联方式就是严格的 FIFO：
//! 队首请求发送出去之后，下一个完整的响应必然属于它。引擎从不在队首响应完成之前
//! 发送下一个请求（不做重叠的 pipelining），以此换取无需序号的关联机制。
//!
//! ## 连接生命周期
//!
//! - 连接是惰性建立的：第一个请求到达空闲会话时才解析域名、创建传输层并发起连接。
//! - 连接失败、对端关闭、响应无法解析，都会被转换成发给回调的确定结果（[`Outcome`]），
//!   而不会让调用方无限期挂起。
//! - 失败只影响当前这条连接；会话本身保持可用，下一次提交会重新建立连接。
//!
//! ## 执行模型
//!
//! 引擎的全部状态都由一个任务独占并修改，该任务运行在构造时注入的执行器
//! （[`rt::Executor`]）上。`submit` 只是把请求投递到引擎任务的队列里，立刻返回；
//! 回调稍后在引擎任务上被调用。
//!
//! ```no_run
//! # async fn run() -> h1_session::Result<()> {
//! use h1_session::{rt::TokioExecutor, Bytes, Request, Session};
//!
//! let session = Session::new(TokioExecutor::current(), "http://example.com");
//!
//! // 回调风格
//! let req = Request::get("/").body(Bytes::new()).unwrap();
//! session.submit(req, |res| match res {
//!     Ok(resp) => println!("status: {}", resp.status()),
//!     Err(err) => println!("failed: {:?}", err.outcome()),
//! });
//!
//! // async 风格
//! let req = Request::get("/robots.txt").body(Bytes::new()).unwrap();
//! let resp = session.send_request(req).await?;
//! println!("{} bytes", resp.body().len());
//! # Ok(())
//! # }
//! ```
//!
//! # Optional Features
//!
//! - `tracing`（默认开启）：通过 `tracing` 输出引擎状态迁移等调试日志。
//! - `tls`：基于 rustls 的 `https://` 支持。

// 从 `http` crate 重新导出核心 HTTP 类型，使用户无需单独添加 `http` 依赖。
#[doc(no_inline)]
pub use http::{header, HeaderMap, Method, Request, StatusCode, Uri, Version};

// 请求体与响应体统一使用 `Bytes`
#[doc(no_inline)]
pub use bytes::Bytes;

pub use crate::client::{Builder, ConnectionState, Endpoint, Session};
pub use crate::error::{Error, Outcome, Result};
pub use crate::response::Response;

// `#[macro_use]` 使得 cfg 模块中定义的宏在整个 crate 中可用。必须最先声明。
#[macro_use]
mod cfg;

// 日志宏（trace!、debug!、warn!），必须在使用它们的模块之前声明。
#[macro_use]
mod trace;

/// 会话 API：[`Session`]、[`Builder`] 以及目标端点解析。
pub mod client;
// 内部通用工具（类型擦除的执行器等）
mod common;
// 错误类型与结果分类
mod error;
// 连接引擎和 HTTP/1 编解码（非公共）
mod proto;
// 响应类型
mod response;
/// 运行时抽象：执行器、传输层、地址解析器。
pub mod rt;
