//! 会话引擎：连接生命周期管理与 FIFO 请求关联。
//!
//! `Engine` 是一个同步状态机，由单个任务（[`run`](Engine::run)）独占驱动。它有两个输入：
//!
//! - 来自 `Session` 句柄的命令（提交请求）；
//! - 来自地址解析任务和传输层的事件，全部经由同一个事件通道送达。
//!
//! 所有状态修改都发生在这个任务上，因此不需要任何锁。
//!
//! ## 状态迁移
//!
//! ```text
//!                 submit (无缓存地址)
//!  Disconnected ──────────────────────▶ Resolving ──resolved──┐
//!      ▲  │ submit (已知地址)                │ 失败            ▼
//!      │  └────────────────────────────────┼──────────────▶ Connecting ──connected──▶ Connected
//!      │                                   ▼                   │ 失败                    │
//!      │                       Disconnected + 清空队列        ▼                         │
//!      │                          (BadServerAddress)   Failed + 清空队列                │
//!      └──────────────── 对端关闭 / 响应要求关闭 / 解析错误 ───────────────────────────┘
//! ```
//!
//! ## 关联规则
//!
//! 只有队首请求会被写到连接上；它的响应完成并交付之后，才写出下一个请求。
//! 因此任何时刻连接上至多只有一个请求在等待响应，下一个完整的响应必然属于队首。

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONNECTION, HOST, USER_AGENT};
use http::{HeaderValue, Request};
use tokio::sync::{mpsc, watch};

use super::finalize::{finalize, Finalize};
use super::h1::{self, Parsed, ResponseParser};
use crate::client::dispatch::{Pending, Queue};
use crate::client::{ConnectionState, Endpoint};
use crate::common::exec::Exec;
use crate::error::{Error, Parse};
use crate::rt::{Connect, Destination, EventSink, Resolve, Transport};

/// 从 `Session` 句柄发往引擎的命令。
#[derive(Debug)]
pub(crate) enum Command {
    Submit(Pending),
}

/// 送达引擎的异步事件。
#[derive(Debug)]
pub(crate) enum Event {
    /// 地址解析结束
    Resolved(io::Result<SocketAddr>),
    /// 某个传输层（以代号区分）的事件
    Transport { id: u64, event: TransportEvent },
}

#[derive(Debug)]
pub(crate) enum TransportEvent {
    Connected,
    ConnectError(io::Error),
    Bytes(Bytes),
    PeerClosed,
}

/// 引擎配置，由 `Builder` 生成。
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) user_agent: Option<HeaderValue>,
    pub(crate) keep_alive: bool,
    pub(crate) max_headers: usize,
    pub(crate) max_buf_size: usize,
    pub(crate) finalize: Finalize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            user_agent: Some(HeaderValue::from_static(concat!(
                "h1-session/",
                env!("CARGO_PKG_VERSION")
            ))),
            keep_alive: true,
            max_headers: h1::DEFAULT_MAX_HEADERS,
            max_buf_size: h1::DEFAULT_MAX_BUFFER_SIZE,
            finalize: Finalize {
                decompress: true,
                decode_json: true,
            },
        }
    }
}

/// 当前的传输层及其代号
struct Slot {
    id: u64,
    transport: Box<dyn Transport>,
}

pub(crate) struct Engine {
    endpoint: Endpoint,
    config: Config,
    state: ConnectionState,
    transport: Option<Slot>,
    // 每创建一个传输层加一，用来识别过期事件
    generation: u64,
    queue: Queue,
    parser: ResponseParser,
    connector: Arc<dyn Connect>,
    resolver: Arc<dyn Resolve>,
    exec: Exec,
    events: mpsc::UnboundedSender<Event>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Engine {
    pub(crate) fn new(
        endpoint: Endpoint,
        config: Config,
        connector: Arc<dyn Connect>,
        resolver: Arc<dyn Resolve>,
        exec: Exec,
        events: mpsc::UnboundedSender<Event>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Engine {
        let parser = ResponseParser::new(config.max_headers, config.max_buf_size);
        Engine {
            endpoint,
            config,
            state: ConnectionState::Disconnected,
            transport: None,
            generation: 0,
            queue: Queue::new(),
            parser,
            connector,
            resolver,
            exec,
            events,
            state_tx,
        }
    }

    /// 引擎任务的主循环。
    ///
    /// 所有 `Session` 句柄都被丢弃、并且没有待处理请求时退出。只要队列里还有请求，
    /// 引擎就继续运行，直到每个请求都拿到结果。
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        let mut handles_gone = false;
        loop {
            tokio::select! {
                // 先处理事件，再接收新命令
                biased;

                // `self.events` 一直持有发送端，这个通道不会关闭
                Some(event) = events.recv() => self.handle_event(event),

                cmd = commands.recv(), if !handles_gone => match cmd {
                    Some(Command::Submit(pending)) => self.submit(pending),
                    None => {
                        trace!("all session handles dropped");
                        handles_gone = true;
                    }
                },
            }

            if handles_gone && self.queue.is_empty() {
                debug!("session engine shutting down");
                self.teardown(ConnectionState::Disconnected);
                return;
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Resolved(result) => self.on_resolved(result),
            Event::Transport { id, event } => {
                if self.transport.as_ref().map(|slot| slot.id) != Some(id) {
                    trace!("ignoring event from stale transport #{}", id);
                    return;
                }
                match event {
                    TransportEvent::Connected => self.on_connected(),
                    TransportEvent::ConnectError(err) => self.on_connect_error(err),
                    TransportEvent::Bytes(buf) => self.on_bytes(buf),
                    TransportEvent::PeerClosed => self.on_peer_closed(),
                }
            }
        }
    }

    // ===== 提交 =====

    pub(crate) fn submit(&mut self, mut pending: Pending) {
        if !self.endpoint.is_connectable() {
            debug!("endpoint {:?} can never be connected", self.endpoint);
            pending.complete(Err(
                Error::new_bad_server_address().with("endpoint is not connectable")
            ));
            return;
        }

        self.prepare(&mut pending.request);
        let was_empty = self.queue.is_empty();
        let _seq = self.queue.push_back(pending);
        trace!("queued request #{} (state={:?})", _seq, self.state);

        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => self.open(),
            ConnectionState::Resolving | ConnectionState::Connecting => {}
            ConnectionState::Connected => {
                if was_empty {
                    self.send_head();
                }
            }
        }
    }

    /// 补上 `Host`、`User-Agent`、`Connection` 头部。调用方已设置的不覆盖。
    fn prepare(&self, req: &mut Request<Bytes>) {
        let headers = req.headers_mut();
        if !headers.contains_key(HOST) {
            if let Some(host) = self.endpoint.host_header() {
                headers.insert(HOST, host);
            }
        }
        if let Some(ref ua) = self.config.user_agent {
            if !headers.contains_key(USER_AGENT) {
                headers.insert(USER_AGENT, ua.clone());
            }
        }
        if self.config.keep_alive && !headers.contains_key(CONNECTION) {
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
    }

    // ===== 连接建立 =====

    fn open(&mut self) {
        debug_assert!(self.transport.is_none());
        if let Some(addr) = self.endpoint.socket_addr() {
            self.connect(addr);
        } else if self.endpoint.needs_resolution() {
            self.resolve();
        } else {
            // submit 已经检查过 is_connectable
            self.set_state(ConnectionState::Disconnected);
            self.fail_all(Error::new_bad_server_address);
        }
    }

    fn resolve(&mut self) {
        let (host, port) = match self.endpoint.domain() {
            Some(host) => (host.to_owned(), self.endpoint.port()),
            None => return,
        };
        debug!("resolving {}:{}", host, port);
        self.set_state(ConnectionState::Resolving);

        let resolving = self.resolver.resolve(&host, port);
        // 在任务外创建：任务从未被 poll 就被丢弃时也会回报
        let answer = ResolveAnswer(Some(self.events.clone()));
        self.exec.execute(async move {
            let result = resolving.await;
            answer.send(result);
        });
    }

    fn on_resolved(&mut self, result: io::Result<SocketAddr>) {
        if self.state != ConnectionState::Resolving {
            trace!("ignoring resolution in state {:?}", self.state);
            return;
        }
        match result {
            Ok(addr) => {
                self.endpoint.set_resolved(addr);
                match self.endpoint.socket_addr() {
                    Some(addr) => {
                        debug!("resolved to {}", addr);
                        self.connect(addr);
                    }
                    None => {
                        debug!("resolver returned an unusable address {}", addr);
                        self.set_state(ConnectionState::Disconnected);
                        self.fail_all(|| {
                            Error::new_bad_server_address().with("resolved address is unspecified")
                        });
                    }
                }
            }
            Err(err) => {
                debug!("resolution failed: {}", err);
                self.set_state(ConnectionState::Disconnected);
                let cause = Arc::new(err);
                self.fail_all(|| Error::new_bad_server_address().with(cause.clone()));
            }
        }
    }

    fn connect(&mut self, addr: SocketAddr) {
        self.generation += 1;
        let id = self.generation;
        let dst = Destination::new(
            addr,
            self.endpoint.is_tls(),
            self.endpoint.domain().map(ToOwned::to_owned),
        );
        debug!("connecting transport #{} to {}", id, addr);

        let sink = EventSink::new(id, self.events.clone());
        let transport = self.connector.make_transport(dst, sink);
        self.parser.reset();
        self.queue.unmark_head_sent();
        self.set_state(ConnectionState::Connecting);

        let slot = self.transport.insert(Slot { id, transport });
        slot.transport.connect();
    }

    fn on_connected(&mut self) {
        if self.state != ConnectionState::Connecting {
            trace!("duplicate connected event in state {:?}", self.state);
            return;
        }
        if let Some(ref _slot) = self.transport {
            debug!("transport #{} connected to {}", _slot.id, _slot.transport.peer_addr());
        }
        self.set_state(ConnectionState::Connected);
        self.send_head();
    }

    fn on_connect_error(&mut self, err: io::Error) {
        debug!("connect failed: {}", err);
        self.teardown(ConnectionState::Failed);
        let cause = Arc::new(err);
        self.fail_all(|| Error::new_bad_server_address().with(cause.clone()));
    }

    // ===== 读取 =====

    fn on_bytes(&mut self, buf: Bytes) {
        if self.state != ConnectionState::Connected {
            trace!("ignoring {} bytes in state {:?}", buf.len(), self.state);
            return;
        }
        self.parser.feed(&buf);

        // 一次读取可能包含多个响应（以及下一个响应的开头）
        while self.transport.is_some() && self.parser.has_buffered() {
            let method = match self.queue.front() {
                Some(head) if self.queue.head_sent() => head.request.method().clone(),
                _ => {
                    warn!("received bytes with no request in flight, closing connection");
                    self.teardown(ConnectionState::Disconnected);
                    if !self.queue.is_empty() {
                        self.open();
                    }
                    return;
                }
            };

            match self.parser.parse(&method) {
                Ok(Some(parsed)) => self.deliver(parsed),
                Ok(None) => return,
                Err(parse) => {
                    self.on_bad_response(parse);
                    return;
                }
            }
        }
    }

    /// 把完整的响应交给队首的回调，然后决定连接的去留。
    ///
    /// 同一次读取里剩下的字节按"多余的字节"处理：连接被丢弃，剩余请求走新连接。
    fn deliver(&mut self, parsed: Parsed) {
        let keep_alive = parsed.keep_alive;
        let response = finalize(parsed, self.config.finalize);
        if let Some(head) = self.queue.pop_front() {
            head.complete(Ok(response));
        }

        if self.parser.has_buffered() {
            // 这些字节在下一个请求写出之前就到了，不可能属于它
            warn!("received bytes beyond the response in flight, closing connection");
            self.teardown(ConnectionState::Disconnected);
            if !self.queue.is_empty() {
                self.open();
            }
        } else if !self.queue.is_empty() {
            // 即使服务端要求关闭，队列里还有请求也照常写出下一个；
            // 随后的关闭会让它们以 NetworkFailure 结束
            self.send_head();
        } else if !keep_alive {
            debug!("response requested close, disconnecting");
            self.teardown(ConnectionState::Disconnected);
        }
    }

    fn on_bad_response(&mut self, parse: Parse) {
        debug!("bad response: {:?}", parse);
        if let Some(head) = self.queue.pop_front() {
            head.complete(Err(Error::from(parse)));
        }
        // 解析器状态无法恢复，这条连接不能再用
        self.teardown(ConnectionState::Disconnected);
        if !self.queue.is_empty() {
            debug!("reconnecting for {} queued requests", self.queue.len());
            self.open();
        }
    }

    fn on_peer_closed(&mut self) {
        match self.state {
            ConnectionState::Connecting => {
                // 连接尚未建立就被关闭，等同于连接失败
                self.on_connect_error(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "closed before connection was established",
                ));
                return;
            }
            _ => {
                debug!("peer closed connection with {} queued", self.queue.len());
            }
        }

        // 以 EOF 定界的响应在这里完成
        if self.queue.head_sent() {
            if let Some(parsed) = self.parser.finish_eof() {
                let response = finalize(parsed, self.config.finalize);
                if let Some(head) = self.queue.pop_front() {
                    head.complete(Ok(response));
                }
            }
        }

        self.teardown(ConnectionState::Disconnected);
        self.fail_all(|| Error::new_network_failure().with("connection closed by peer"));
    }

    // ===== 写出 =====

    /// 如果队首还没有发送，把它写到连接上。
    fn send_head(&mut self) {
        if self.queue.head_sent() {
            return;
        }
        let (slot, head) = match (self.transport.as_mut(), self.queue.front()) {
            (Some(slot), Some(head)) => (slot, head),
            _ => return,
        };

        let mut buf = Vec::new();
        h1::encode_request(&head.request, &mut buf);
        trace!(
            "writing request #{} {} {} ({} bytes, connected={})",
            head.seq(),
            head.request.method(),
            head.request.uri(),
            buf.len(),
            slot.transport.is_connected()
        );
        slot.transport.send(Bytes::from(buf));
        self.queue.mark_head_sent();
    }

    // ===== 清理 =====

    /// 丢弃当前传输层，之后它的事件会被忽略。
    fn teardown(&mut self, state: ConnectionState) {
        if let Some(_slot) = self.transport.take() {
            trace!("discarding transport #{}", _slot.id);
        }
        self.parser.reset();
        self.queue.unmark_head_sent();
        self.set_state(state);
    }

    /// 按顺序让所有待处理请求以同一类错误结束。
    fn fail_all<F>(&mut self, make: F)
    where
        F: Fn() -> Error,
    {
        if self.queue.is_empty() {
            return;
        }
        debug!("failing {} queued requests", self.queue.len());
        for pending in self.queue.drain() {
            pending.complete(Err(make()));
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            trace!("connection state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

/// 地址解析结果的回报守卫。
///
/// 解析 future panic 或者任务被执行器丢弃时，`Drop` 补发一个错误结果，
/// 引擎不会一直停在 `Resolving`。
struct ResolveAnswer(Option<mpsc::UnboundedSender<Event>>);

impl ResolveAnswer {
    fn send(mut self, result: io::Result<SocketAddr>) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(Event::Resolved(result));
        }
    }
}

impl Drop for ResolveAnswer {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            debug!("resolver task ended without an answer");
            let _ = tx.send(Event::Resolved(Err(io::Error::new(
                io::ErrorKind::Other,
                "resolver task ended without an answer",
            ))));
        }
    }
}
