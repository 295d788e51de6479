//! # h1-session JSON 客户端示例
//!
//! 请求一个返回 JSON 数据的接口。响应的 `Content-Type` 是 `application/json` 时，
//! 引擎在交付之前已经把响应体解析成了 `serde_json::Value`，
//! 这里直接通过 `Response::json` 取用。
//!
//! ## 使用方法
//! ```bash
//! cargo run --example client_json
//! ```
//!
//! ## 核心知识点
//! - `send_request` 是 `submit` 之上的 async 包装
//! - `json()` 返回预解析的值，`json_error()` 返回解析失败的原因
//! - gzip/deflate 响应体在 JSON 解析之前已被解压

// 拒绝所有编译警告
#![deny(warnings)]
// 启用 Rust 2018 惯用写法的警告
#![warn(rust_2018_idioms)]

// ACCEPT 头部名称常量
use h1_session::header::ACCEPT;
// TokioExecutor 把引擎任务生成到当前的 tokio 运行时上
use h1_session::rt::TokioExecutor;
// Bytes 是请求体类型，Request 用于构建请求，Session 是会话句柄
use h1_session::{Bytes, Request, Session};

// 统一的 Result 类型别名，简化函数签名中的错误类型声明
type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    pretty_env_logger::init();

    // 一个返回 JSON 的测试接口
    let session = Session::new(TokioExecutor::current(), "http://jsonplaceholder.typicode.com");

    // 构建 GET 请求，声明接受 JSON
    let req = Request::get("/users")
        .header(ACCEPT, "application/json")
        .body(Bytes::new())?;
    // 等待完整的响应；失败时 `?` 把 h1_session::Error 转换为装箱错误
    let res = session.send_request(req).await?;

    // content-type 是 application/json 时响应体已经被解析好
    let users = match res.json() {
        Some(value) => value,
        None => {
            println!("not json: {:?}", res.json_error());
            return Ok(());
        }
    };

    // 取出每个用户的 name 字段
    let names: Vec<&str> = users
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|user| user.get("name").and_then(|name| name.as_str()))
                .collect()
        })
        .unwrap_or_default();
    println!("users: {:#?}", names);

    // 对 id 字段求和
    let sum: u64 = users
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|user| user.get("id").and_then(|id| id.as_u64()))
                .sum()
        })
        .unwrap_or(0);
    println!("sum of ids: {}", sum);

    Ok(())
}
