//! 运行时抽象组件模块
//!
//! 引擎本身不依赖任何全局事件循环。它使用的三类外部能力都在这里定义成 trait，
//! 并在构造 [`Session`](crate::Session) 时注入：
//!
//! - **执行器（Executor）**：引擎任务、地址解析任务、默认传输层的 IO 任务都通过它生成；
//! - **传输层（Transport）**：一条字节流连接，连接结果与收到的数据以事件形式
//!   通过 [`EventSink`] 回送给引擎；
//! - **地址解析器（Resolve）**：把域名和端口解析成一个 `SocketAddr`。
//!
//! crate 自带一套基于 tokio 的默认实现：[`TokioExecutor`]、[`TcpConnector`]、
//! [`GaiResolver`]。测试中可以替换成完全可控的实现。

use std::future::Future;
use std::pin::Pin;

use tokio::runtime::Handle;

mod resolve;
mod tcp;
mod transport;

pub use self::resolve::{GaiResolver, Resolve, Resolving};
pub use self::tcp::TcpConnector;
pub use self::transport::{Connect, Destination, EventSink, Transport};

/// 引擎交给执行器的 future 类型：已装箱、`Send`、无返回值。
pub type BoxSendFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Future 执行器 trait。
///
/// 用户可以为自己的类型实现此 trait，让会话把任务提交到任意运行时上。
///
/// # 示例
///
/// ```
/// # use h1_session::rt::Executor;
/// # use std::future::Future;
/// #[derive(Clone)]
/// struct Spawner;
///
/// impl<F> Executor<F> for Spawner
/// where
///     F: Future + Send + 'static,
///     F::Output: Send + 'static,
/// {
///     fn execute(&self, future: F) {
///         tokio::spawn(future);
///     }
/// }
/// ```
pub trait Executor<Fut> {
    /// 将 future 放入执行器中运行。
    fn execute(&self, fut: Fut);
}

/// 把任务生成到一个 tokio 运行时上的执行器。
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// 使用当前所在的 tokio 运行时。
    ///
    /// # Panics
    ///
    /// 如果不在 tokio 运行时上下文中调用，会 panic。
    pub fn current() -> TokioExecutor {
        TokioExecutor {
            handle: Handle::current(),
        }
    }

    /// 使用指定的运行时句柄。
    pub fn with_handle(handle: Handle) -> TokioExecutor {
        TokioExecutor { handle }
    }
}

impl<F> Executor<F> for TokioExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        // JoinHandle 直接丢弃，任务在后台继续运行
        self.handle.spawn(fut);
    }
}
