//! 域名解析
//!
//! 引擎只在端点带有域名、且还没有缓存过解析结果时才调用解析器。

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

/// 解析器返回的 future。
pub type Resolving = Pin<Box<dyn Future<Output = io::Result<SocketAddr>> + Send>>;

/// 把 `host:port` 解析为一个套接字地址。
///
/// 任何 `Fn(&str, u16) -> Resolving` 闭包都自动实现了此 trait。
pub trait Resolve: Send + Sync + 'static {
    /// 开始解析。返回的 future 必须拥有它需要的全部数据。
    fn resolve(&self, host: &str, port: u16) -> Resolving;
}

impl<F> Resolve for F
where
    F: Fn(&str, u16) -> Resolving + Send + Sync + 'static,
{
    fn resolve(&self, host: &str, port: u16) -> Resolving {
        (self)(host, port)
    }
}

/// 基于系统 `getaddrinfo` 的默认解析器（`tokio::net::lookup_host`）。
///
/// 有多个结果时取第一个。
#[derive(Clone, Debug, Default)]
pub struct GaiResolver {
    _priv: (),
}

impl GaiResolver {
    /// 创建解析器。
    pub fn new() -> GaiResolver {
        GaiResolver { _priv: () }
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, host: &str, port: u16) -> Resolving {
        let host = host.to_owned();
        Box::pin(async move {
            trace!("resolving host={:?}", host);
            let mut addrs = tokio::net::lookup_host((host.as_str(), port)).await?;
            addrs.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for {}", host),
                )
            })
        })
    }
}
