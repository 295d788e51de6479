#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use h1_session::rt::{
    Connect, Destination, EventSink, Resolve, Resolving, TokioExecutor, Transport,
};
use h1_session::{Builder, Bytes, Request, Response, Session};
use tokio::sync::mpsc;

pub use h1_session::{ConnectionState, Outcome};

const WAIT: Duration = Duration::from_secs(5);

/// 让引擎任务把手头的事件处理完。
///
/// 测试使用暂停的时钟：只有在所有任务都空闲时时间才会前进，所以 sleep 返回时
/// 引擎一定已经没有可做的工作。
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn get(path: &str) -> Request<Bytes> {
    Request::get(path).body(Bytes::new()).unwrap()
}

pub fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

// ===== mock transport

#[derive(Default)]
struct Shared {
    connect_calls: usize,
    connected: bool,
    dropped: bool,
}

/// 引擎持有的一端
struct MockTransport {
    addr: SocketAddr,
    shared: Arc<Mutex<Shared>>,
    writes: mpsc::UnboundedSender<Bytes>,
}

impl Transport for MockTransport {
    fn connect(&mut self) {
        self.shared.lock().unwrap().connect_calls += 1;
    }

    fn send(&mut self, buf: Bytes) {
        let _ = self.writes.send(buf);
    }

    fn is_connected(&self) -> bool {
        self.shared.lock().unwrap().connected
    }

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.shared.lock().unwrap().dropped = true;
    }
}

/// 测试持有的一端：扮演网络和服务端
pub struct MockHandle {
    pub dst: Destination,
    events: EventSink,
    shared: Arc<Mutex<Shared>>,
    writes: mpsc::UnboundedReceiver<Bytes>,
}

impl MockHandle {
    pub fn connect(&self) {
        self.shared.lock().unwrap().connected = true;
        self.events.connected();
    }

    pub fn fail(&self) {
        self.events.connect_error(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "mock refused",
        ));
    }

    pub fn reply(&self, bytes: impl AsRef<[u8]>) {
        self.events
            .bytes_received(Bytes::copy_from_slice(bytes.as_ref()));
    }

    pub fn close(&self) {
        self.shared.lock().unwrap().connected = false;
        self.events.peer_closed();
    }

    pub fn connect_calls(&self) -> usize {
        self.shared.lock().unwrap().connect_calls
    }

    pub fn is_dropped(&self) -> bool {
        self.shared.lock().unwrap().dropped
    }

    /// 等待引擎写出的下一段字节。
    pub async fn next_write(&mut self) -> String {
        let buf = tokio::time::timeout(WAIT, self.writes.recv())
            .await
            .expect("timed out waiting for a write")
            .expect("transport dropped before writing");
        String::from_utf8(buf.to_vec()).unwrap()
    }

    /// 非阻塞地检查是否有写出。
    pub fn try_write(&mut self) -> Option<String> {
        self.writes
            .try_recv()
            .ok()
            .map(|buf| String::from_utf8(buf.to_vec()).unwrap())
    }
}

#[derive(Clone)]
pub struct MockConnector {
    handles: mpsc::UnboundedSender<MockHandle>,
}

impl Connect for MockConnector {
    fn make_transport(&self, dst: Destination, events: EventSink) -> Box<dyn Transport> {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = MockTransport {
            addr: dst.addr(),
            shared: shared.clone(),
            writes: tx,
        };
        let _ = self.handles.send(MockHandle {
            dst,
            events,
            shared,
            writes: rx,
        });
        Box::new(transport)
    }
}

// ===== harness

/// 一个使用 mock 传输层和计数解析器的会话。
pub struct Harness {
    pub session: Session,
    handles: mpsc::UnboundedReceiver<MockHandle>,
    resolves: Arc<AtomicUsize>,
    outcomes_tx: mpsc::UnboundedSender<(usize, h1_session::Result<Response>)>,
    outcomes: mpsc::UnboundedReceiver<(usize, h1_session::Result<Response>)>,
}

impl Harness {
    pub fn new(host: &str) -> Harness {
        Harness::with_dns(host, true, |_| {})
    }

    pub fn failing_dns(host: &str) -> Harness {
        Harness::with_dns(host, false, |_| {})
    }

    pub fn configure(host: &str, f: impl FnOnce(&mut Builder)) -> Harness {
        Harness::with_dns(host, true, f)
    }

    /// 使用自定义解析器；`resolve_count` 对它不计数。
    pub fn with_resolver<R: Resolve>(host: &str, resolver: R) -> Harness {
        Harness::with_dns(host, true, move |b| {
            b.resolver(resolver);
        })
    }

    fn with_dns(host: &str, dns_ok: bool, f: impl FnOnce(&mut Builder)) -> Harness {
        let (handles_tx, handles) = mpsc::unbounded_channel();
        let resolves = Arc::new(AtomicUsize::new(0));
        let counter = resolves.clone();

        let mut builder = Builder::new(TokioExecutor::current());
        builder
            .connector(MockConnector {
                handles: handles_tx,
            })
            .resolver(move |_host: &str, port: u16| -> Resolving {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if dns_ok {
                        Ok(SocketAddr::from(([127, 0, 0, 1], port)))
                    } else {
                        Err(io::Error::new(io::ErrorKind::NotFound, "mock nxdomain"))
                    }
                })
            });
        f(&mut builder);

        let (outcomes_tx, outcomes) = mpsc::unbounded_channel();
        Harness {
            session: builder.build(host),
            handles,
            resolves,
            outcomes_tx,
            outcomes,
        }
    }

    /// 提交一个请求，结果带着 `tag` 送到 `next_outcome`。
    pub fn submit(&self, tag: usize, req: Request<Bytes>) {
        let tx = self.outcomes_tx.clone();
        self.session.submit(req, move |res| {
            let _ = tx.send((tag, res));
        });
    }

    pub async fn next_outcome(&mut self) -> (usize, h1_session::Result<Response>) {
        tokio::time::timeout(WAIT, self.outcomes.recv())
            .await
            .expect("timed out waiting for a callback")
            .expect("outcome channel closed")
    }

    pub fn try_outcome(&mut self) -> Option<(usize, h1_session::Result<Response>)> {
        self.outcomes.try_recv().ok()
    }

    pub async fn next_transport(&mut self) -> MockHandle {
        tokio::time::timeout(WAIT, self.handles.recv())
            .await
            .expect("timed out waiting for a transport")
            .expect("connector dropped")
    }

    pub fn try_transport(&mut self) -> Option<MockHandle> {
        self.handles.try_recv().ok()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

/// 等待会话进入 `want` 状态，途经的中间状态被跳过。
pub async fn wait_for_state(session: &mut Session, want: ConnectionState) {
    let wait = async {
        while session.state() != want {
            session.state_changed().await.expect("engine exited");
        }
    };
    tokio::time::timeout(WAIT, wait)
        .await
        .expect("timed out waiting for state");
}
