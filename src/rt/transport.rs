//! 传输层抽象
//!
//! 引擎不直接做 IO。它通过 [`Connect`] 为每一次连接尝试创建一个新的 [`Transport`]，
//! 之后只做两件事：调用 `connect()` 发起连接，调用 `send()` 写出序列化好的请求。
//! 传输层把发生的一切（连接成功、连接失败、收到字节、对端关闭）通过
//! 创建时拿到的 [`EventSink`] 回报给引擎。
//!
//! ## 约定
//!
//! - 每个 `EventSink` 绑定到一个传输层实例（带有递增的代号）。引擎丢弃某个传输层
//!   之后，它的 `EventSink` 发来的事件都会被忽略，所以传输层实现不需要担心
//!   "回调晚到" 的问题。
//! - 丢弃 `Box<dyn Transport>` 即表示释放这条连接，实现方应在 `Drop` 中（或通过
//!   关闭内部通道）结束 IO。
//! - `send()` 不返回错误；写失败应表现为 `peer_closed()` 事件。

use std::fmt;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::proto::{Event, TransportEvent};

/// 传输层工厂。
///
/// 引擎每次需要一条新连接时调用 `make_transport`，返回的传输层尚未连接。
pub trait Connect: Send + Sync + 'static {
    /// 为 `dst` 创建一个新的、尚未连接的传输层。
    ///
    /// 传输层必须通过 `events` 回报它的事件。
    fn make_transport(&self, dst: Destination, events: EventSink) -> Box<dyn Transport>;
}

/// 一条字节流连接。
pub trait Transport: Send + 'static {
    /// 发起连接。结果以 `connected()` 或 `connect_error()` 事件回报。
    fn connect(&mut self);

    /// 写出一段字节。连接尚未建立时的行为由实现决定。
    fn send(&mut self, buf: Bytes);

    /// 连接当前是否已建立。
    fn is_connected(&self) -> bool;

    /// 对端地址。
    fn peer_addr(&self) -> SocketAddr;
}

/// 一次连接尝试的目标。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    addr: SocketAddr,
    tls: bool,
    server_name: Option<String>,
}

impl Destination {
    pub(crate) fn new(addr: SocketAddr, tls: bool, server_name: Option<String>) -> Destination {
        Destination {
            addr,
            tls,
            server_name,
        }
    }

    /// 要连接的套接字地址。
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 是否需要在 TCP 之上建立 TLS。
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// TLS 握手使用的服务器名（SNI）。直接按地址构造的会话没有域名。
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }
}

/// 传输层向引擎回报事件的句柄。
///
/// 可以自由 clone 并移动到 IO 任务中。引擎消失之后，所有事件都被静默丢弃。
#[derive(Clone)]
pub struct EventSink {
    id: u64,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub(crate) fn new(id: u64, tx: mpsc::UnboundedSender<Event>) -> EventSink {
        EventSink { id, tx }
    }

    /// 连接已建立（包括 TLS 握手，如果有的话）。
    pub fn connected(&self) {
        self.emit(TransportEvent::Connected);
    }

    /// 连接尝试失败。
    pub fn connect_error(&self, err: io::Error) {
        self.emit(TransportEvent::ConnectError(err));
    }

    /// 收到了一段字节。
    pub fn bytes_received(&self, buf: Bytes) {
        if buf.is_empty() {
            return;
        }
        self.emit(TransportEvent::Bytes(buf));
    }

    /// 对端关闭了连接，或读写出错。
    pub fn peer_closed(&self) {
        self.emit(TransportEvent::PeerClosed);
    }

    /// 引擎是否已经不再接收事件。
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn emit(&self, event: TransportEvent) {
        let event = Event::Transport { id: self.id, event };
        if self.tx.send(event).is_err() {
            trace!("engine is gone, dropping transport event");
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("id", &self.id).finish()
    }
}
