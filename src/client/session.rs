//! 会话句柄与构建器
//!
//! `Session` 只是一个轻量句柄：一个发往引擎任务的命令通道，加上一个观察连接状态的
//! `watch` 接收端。可以自由 clone、跨任务移动；所有句柄被丢弃后，引擎在完成队列中
//! 剩余的请求之后退出。

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Request};
use tokio::sync::{mpsc, oneshot, watch};

use super::dispatch::{Callback, Pending};
use super::endpoint::Endpoint;
use crate::common::exec::Exec;
use crate::proto::{h1, Command, Config, Engine};
use crate::response::Response;
use crate::rt::{BoxSendFuture, Connect, Executor, GaiResolver, Resolve, TcpConnector};

/// 会话的连接状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// 没有传输层。下一次提交会触发解析或连接。
    Disconnected,
    /// 正在解析域名。
    Resolving,
    /// 传输层已创建，正在连接。
    Connecting,
    /// 连接已建立。
    Connected,
    /// 上一次连接尝试失败。下一次提交会重新尝试。
    Failed,
}

/// 与一个 HTTP 端点之间的会话。
///
/// 通过 [`Session::new`]、[`Session::with_addr`] 或 [`Builder`] 创建。
#[derive(Clone)]
pub struct Session {
    tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    endpoint: Endpoint,
}

/// 会话的配置构建器。
///
/// 可以用同一个 `Builder` 构建多个独立的会话。
///
/// # 示例
///
/// ```no_run
/// # async fn run() {
/// use h1_session::{rt::TokioExecutor, Builder};
///
/// let session = Builder::new(TokioExecutor::current())
///     .max_headers(64)
///     .decode_json(false)
///     .build("https://example.com");
/// # drop(session);
/// # }
/// ```
#[derive(Clone)]
pub struct Builder {
    exec: Exec,
    config: Config,
    resolver: Arc<dyn Resolve>,
    connector: Option<Arc<dyn Connect>>,
}

// ===== impl Session

impl Session {
    /// 使用默认配置，按 host 字符串创建会话。
    ///
    /// 见 [`Endpoint::parse`] 了解可接受的格式。无法识别的 host 仍然会得到一个会话，
    /// 只是它的每次提交都以 `BadServerAddress` 失败。
    pub fn new<E>(exec: E, host: &str) -> Session
    where
        E: Executor<BoxSendFuture> + Send + Sync + 'static,
    {
        Builder::new(exec).build(host)
    }

    /// 使用默认配置，直接按套接字地址创建会话，不做域名解析。
    pub fn with_addr<E>(exec: E, addr: SocketAddr, tls: bool) -> Session
    where
        E: Executor<BoxSendFuture> + Send + Sync + 'static,
    {
        Builder::new(exec).build_with_addr(addr, tls)
    }

    /// 创建一个配置构建器。
    pub fn builder<E>(exec: E) -> Builder
    where
        E: Executor<BoxSendFuture> + Send + Sync + 'static,
    {
        Builder::new(exec)
    }

    /// 提交一个请求。
    ///
    /// 立即返回；`callback` 稍后在引擎任务上恰好被调用一次。同一个会话上的回调
    /// 按提交顺序被调用。
    ///
    /// 如果引擎已经不存在，`callback` 会在当前线程上立即以 `Canceled` 被调用。
    ///
    /// # Panics
    ///
    /// `callback` 在引擎任务上运行，不要在其中 panic。panic 会结束引擎任务：
    /// 队列中其余的请求以 `Canceled` 结束，之后这个会话上的每次提交也都以
    /// `Canceled` 结束，需要重新创建会话。
    pub fn submit<F>(&self, req: Request<Bytes>, callback: F)
    where
        F: FnOnce(crate::Result<Response>) + Send + 'static,
    {
        let pending = Pending::new(req, Callback::new(callback));
        if let Err(_gone) = self.tx.send(Command::Submit(pending)) {
            // 命令被丢弃，回调的丢弃守卫会发出 Canceled
            debug!("session engine is gone, request canceled");
        }
    }

    /// 提交一个请求并等待它的结果。
    ///
    /// 请求在调用时就已入队；返回的 future 即使不被 poll，请求也会被发送。
    pub fn send_request(
        &self,
        req: Request<Bytes>,
    ) -> impl Future<Output = crate::Result<Response>> {
        let (tx, rx) = oneshot::channel();
        self.submit(req, move |res| {
            let _ = tx.send(res);
        });
        async move {
            match rx.await {
                Ok(res) => res,
                Err(_canceled) => Err(crate::Error::new_canceled().with("callback dropped")),
            }
        }
    }

    /// 当前的连接状态。
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// 等待下一次连接状态变化，返回新状态。
    ///
    /// 引擎退出后返回 `Canceled` 错误。
    pub async fn state_changed(&mut self) -> crate::Result<ConnectionState> {
        match self.state.changed().await {
            Ok(()) => Ok(*self.state.borrow_and_update()),
            Err(_closed) => Err(crate::Error::new_canceled().with("session engine exited")),
        }
    }

    /// 构造时解析出的端点。
    ///
    /// 这是构造时的快照，不包含引擎之后缓存的解析结果。
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// 引擎是否已经退出。
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

// ===== impl Builder

impl Builder {
    /// 创建一个使用默认配置的构建器。引擎任务、解析任务和默认传输层的 IO 任务
    /// 都在 `exec` 上运行。
    pub fn new<E>(exec: E) -> Builder
    where
        E: Executor<BoxSendFuture> + Send + Sync + 'static,
    {
        Builder {
            exec: Exec::new(exec),
            config: Config::default(),
            resolver: Arc::new(GaiResolver::new()),
            connector: None,
        }
    }

    /// 设置请求中自动添加的 `User-Agent`。`None` 表示不添加。
    ///
    /// 默认是 `h1-session/<版本号>`。
    pub fn user_agent(&mut self, value: Option<HeaderValue>) -> &mut Builder {
        self.config.user_agent = value;
        self
    }

    /// 是否为请求自动添加 `Connection: keep-alive`。
    ///
    /// 默认为 `true`。
    pub fn keep_alive(&mut self, enabled: bool) -> &mut Builder {
        self.config.keep_alive = enabled;
        self
    }

    /// 响应中允许的最大头部数量。超过时该响应以 `BadResponse` 失败。
    ///
    /// 默认为 100。
    pub fn max_headers(&mut self, val: usize) -> &mut Builder {
        self.config.max_headers = val;
        self
    }

    /// 响应头部读缓冲区的最大字节数。
    ///
    /// 默认约 400KB。
    ///
    /// # Panics
    ///
    /// 最小值为 8192，小于该值会 panic。
    pub fn max_buf_size(&mut self, max: usize) -> &mut Builder {
        assert!(
            max >= h1::MINIMUM_MAX_BUFFER_SIZE,
            "the max_buf_size cannot be smaller than {}.",
            h1::MINIMUM_MAX_BUFFER_SIZE,
        );
        self.config.max_buf_size = max;
        self
    }

    /// 是否自动解压 `Content-Encoding: gzip/deflate` 的响应体。
    ///
    /// 默认为 `true`。
    pub fn decompress(&mut self, enabled: bool) -> &mut Builder {
        self.config.finalize.decompress = enabled;
        self
    }

    /// 是否预先解析 JSON 响应体。
    ///
    /// 默认为 `true`。
    pub fn decode_json(&mut self, enabled: bool) -> &mut Builder {
        self.config.finalize.decode_json = enabled;
        self
    }

    /// 替换域名解析器。默认是 [`GaiResolver`]。
    pub fn resolver<R: Resolve>(&mut self, resolver: R) -> &mut Builder {
        self.resolver = Arc::new(resolver);
        self
    }

    /// 替换传输层工厂。默认是运行在同一个执行器上的 [`TcpConnector`]。
    pub fn connector<C: Connect>(&mut self, connector: C) -> &mut Builder {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// 按 host 字符串构建会话。
    pub fn build(&self, host: &str) -> Session {
        self.spawn(Endpoint::parse(host))
    }

    /// 按套接字地址构建会话。
    pub fn build_with_addr(&self, addr: SocketAddr, tls: bool) -> Session {
        self.spawn(Endpoint::from_addr(addr, tls))
    }

    fn spawn(&self, endpoint: Endpoint) -> Session {
        let (tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let connector = match self.connector {
            Some(ref connector) => connector.clone(),
            None => Arc::new(TcpConnector::from_exec(self.exec.clone())),
        };

        let engine = Engine::new(
            endpoint.clone(),
            self.config.clone(),
            connector,
            self.resolver.clone(),
            self.exec.clone(),
            events_tx,
            state_tx,
        );
        debug!("spawning session engine for {:?}", endpoint);
        self.exec.execute(engine.run(commands, events));

        Session {
            tx,
            state,
            endpoint,
        }
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("user_agent", &self.config.user_agent)
            .field("keep_alive", &self.config.keep_alive)
            .field("max_headers", &self.config.max_headers)
            .field("max_buf_size", &self.config.max_buf_size)
            .field("decompress", &self.config.finalize.decompress)
            .field("decode_json", &self.config.finalize.decode_json)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}
