//! # h1-session 客户端示例
//!
//! 对同一个站点依次提交若干个 GET 请求，打印每个响应的状态码和长度。
//! 所有请求共用一个会话，也就是同一条 keep-alive 连接。
//!
//! ## 使用方法
//! ```bash
//! cargo run --example client -- http://httpbin.org /ip /headers /get
//! ```
//!
//! ## 核心知识点
//! - `Session::new` 只做 host 解析；域名解析和连接在第一次提交时才发生
//! - `submit` 立即返回，回调按提交顺序在引擎任务上被调用
//! - 用 `Outcome` 区分四类失败

// 拒绝所有编译警告
#![deny(warnings)]
// 启用 Rust 2018 惯用写法的警告提示
#![warn(rust_2018_idioms)]
use std::env;

// TokioExecutor 把引擎任务生成到当前的 tokio 运行时上
use h1_session::rt::TokioExecutor;
// Bytes 是请求体类型，Outcome 是结果分类，Request 用于构建请求
use h1_session::{Bytes, Outcome, Request, Session};
// 回调运行在引擎任务上，用通道把结果送回 main
use tokio::sync::mpsc;

// 统一的 Result 类型别名，可以接受任何实现了 Error trait 的错误
type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 程序入口函数
/// `#[tokio::main]` 宏会自动创建 tokio 异步运行时
#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统，可通过 RUST_LOG 环境变量控制日志级别
    // 例如：RUST_LOG=h1_session=trace cargo run --example client -- http://httpbin.org
    pretty_env_logger::init();

    // 第一个参数是 host，其余参数是要请求的路径
    let mut args = env::args().skip(1);
    let host = match args.next() {
        Some(host) => host,
        None => {
            println!("Usage: client <host> [path...]");
            return Ok(());
        }
    };
    // 没有给路径时只请求根路径
    let mut paths: Vec<String> = args.collect();
    if paths.is_empty() {
        paths.push("/".to_owned());
    }

    // 创建会话。这里还不会发起任何网络操作
    // 无法识别的 host 也会得到会话，只是每个请求都以 BadServerAddress 失败
    let session = Session::new(TokioExecutor::current(), &host);
    println!("session: {:?}", session.endpoint());

    // 回调在引擎任务上执行，这里把结果转回 main
    let (tx, mut rx) = mpsc::unbounded_channel();
    for path in &paths {
        // 请求只需要路径；Host、User-Agent、Connection 头部由引擎补上
        let req = Request::get(path.as_str()).body(Bytes::new())?;
        let tx = tx.clone();
        let path = path.clone();
        // submit 立即返回，回调稍后恰好被调用一次
        session.submit(req, move |res| {
            let _ = tx.send((path, res));
        });
    }
    // 丢弃最后一个发送端，所有回调完成后 recv 返回 None
    drop(tx);

    // 结果按提交顺序到达
    while let Some((path, res)) = rx.recv().await {
        match Outcome::of(&res) {
            Outcome::Ok => {
                let res = res?;
                println!("{} => {} ({} bytes)", path, res.status(), res.body().len());
            }
            // 失败时打印分类和描述
            outcome => println!("{} => {:?}: {}", path, outcome, res.unwrap_err()),
        }
    }

    println!("\n\nDone!");
    Ok(())
}
