//! 默认传输层：tokio TCP，可选 rustls TLS。
//!
//! 每个 `TcpTransport` 在 `connect()` 时向执行器提交一个 IO 任务：
//! 先建立连接（以及 TLS 握手），然后在一个 `select!` 循环里同时读取套接字和
//! 等待待写数据。传输层被丢弃时写通道随之关闭，IO 任务关闭写端后退出。

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{BoxSendFuture, Connect, Destination, EventSink, Executor, Transport};
use crate::common::exec::Exec;

/// 每次读取前预留的缓冲区大小
const READ_BUF_SIZE: usize = 8192;

/// IO 任务使用的流类型：明文 TCP 或 TLS 流
trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// 默认的传输层工厂。
#[derive(Clone)]
pub struct TcpConnector {
    exec: Exec,
    nodelay: bool,
    #[cfg(feature = "tls")]
    tls: Option<Arc<tokio_rustls::rustls::ClientConfig>>,
}

impl TcpConnector {
    /// 创建一个在 `exec` 上运行 IO 任务的连接器。
    pub fn new<E>(exec: E) -> TcpConnector
    where
        E: Executor<BoxSendFuture> + Send + Sync + 'static,
    {
        TcpConnector::from_exec(Exec::new(exec))
    }

    pub(crate) fn from_exec(exec: Exec) -> TcpConnector {
        TcpConnector {
            exec,
            nodelay: true,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }

    /// 是否对套接字设置 `TCP_NODELAY`，默认开启。
    pub fn set_nodelay(&mut self, nodelay: bool) -> &mut TcpConnector {
        self.nodelay = nodelay;
        self
    }
}

cfg_feature! {
    #![feature = "tls"]

    impl TcpConnector {
        /// 使用自定义的 rustls 客户端配置。
        ///
        /// 未设置时，首次建立 TLS 连接会使用 ring 加密后端和 webpki 根证书。
        pub fn set_tls_config(
            &mut self,
            config: Arc<tokio_rustls::rustls::ClientConfig>,
        ) -> &mut TcpConnector {
            self.tls = Some(config);
            self
        }
    }
}

impl Connect for TcpConnector {
    fn make_transport(&self, dst: Destination, events: EventSink) -> Box<dyn Transport> {
        Box::new(TcpTransport {
            dst,
            events: Some(events),
            exec: self.exec.clone(),
            nodelay: self.nodelay,
            #[cfg(feature = "tls")]
            tls: self.tls.clone(),
            tx: None,
            connected: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnector")
            .field("nodelay", &self.nodelay)
            .finish()
    }
}

// ===== impl TcpTransport =====

struct TcpTransport {
    dst: Destination,
    // connect() 之后被移入 IO 任务
    events: Option<EventSink>,
    exec: Exec,
    nodelay: bool,
    #[cfg(feature = "tls")]
    tls: Option<Arc<tokio_rustls::rustls::ClientConfig>>,
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    connected: Arc<AtomicBool>,
}

impl Transport for TcpTransport {
    fn connect(&mut self) {
        let events = match self.events.take() {
            Some(events) => events,
            None => {
                trace!("connect() called twice, ignoring");
                return;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);

        let dst = self.dst.clone();
        let nodelay = self.nodelay;
        let connected = self.connected.clone();
        #[cfg(feature = "tls")]
        let tls = self.tls.clone();

        self.exec.execute(async move {
            #[cfg(feature = "tls")]
            let opened = open(&dst, nodelay, tls).await;
            #[cfg(not(feature = "tls"))]
            let opened = open(&dst, nodelay).await;

            let io = match opened {
                Ok(io) => io,
                Err(err) => {
                    debug!("connect to {} failed: {}", dst.addr(), err);
                    events.connect_error(err);
                    return;
                }
            };

            connected.store(true, Ordering::Release);
            events.connected();
            pump(io, rx, &events).await;
            connected.store(false, Ordering::Release);
        });
    }

    fn send(&mut self, buf: Bytes) {
        match self.tx {
            Some(ref tx) => {
                if tx.send(buf).is_err() {
                    trace!("io task already finished, dropping write");
                }
            }
            None => {
                trace!("send() before connect(), dropping write");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.dst.addr()
    }
}

#[cfg(not(feature = "tls"))]
async fn open(dst: &Destination, nodelay: bool) -> io::Result<Box<dyn Io>> {
    if dst.is_tls() {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "https requires the `tls` feature",
        ));
    }
    let tcp = connect_tcp(dst.addr(), nodelay).await?;
    Ok(Box::new(tcp))
}

#[cfg(feature = "tls")]
async fn open(
    dst: &Destination,
    nodelay: bool,
    tls: Option<Arc<tokio_rustls::rustls::ClientConfig>>,
) -> io::Result<Box<dyn Io>> {
    use tokio_rustls::rustls::pki_types::ServerName;
    use tokio_rustls::TlsConnector;

    let tcp = connect_tcp(dst.addr(), nodelay).await?;
    if !dst.is_tls() {
        return Ok(Box::new(tcp));
    }

    let config = match tls {
        Some(config) => config,
        None => default_tls_config()?,
    };
    // 没有域名时退回到 IP 地址，rustls 会按 IP 校验证书
    let host = match dst.server_name() {
        Some(name) => name.to_owned(),
        None => dst.addr().ip().to_string(),
    };
    let server_name = ServerName::try_from(host.as_str())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
        .to_owned();

    let stream = TlsConnector::from(config).connect(server_name, tcp).await?;
    Ok(Box::new(stream))
}

#[cfg(feature = "tls")]
fn default_tls_config() -> io::Result<Arc<tokio_rustls::rustls::ClientConfig>> {
    use tokio_rustls::rustls::{crypto, ClientConfig, RootCertStore};

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

async fn connect_tcp(addr: SocketAddr, nodelay: bool) -> io::Result<TcpStream> {
    let tcp = TcpStream::connect(addr).await?;
    if nodelay {
        tcp.set_nodelay(true)?;
    }
    Ok(tcp)
}

/// 读写循环。
///
/// 读到 EOF 或任何 IO 错误都回报为 `peer_closed`；写通道关闭（传输层被丢弃）时
/// 静默退出。
async fn pump(io: Box<dyn Io>, mut rx: mpsc::UnboundedReceiver<Bytes>, events: &EventSink) {
    let (mut rd, mut wr) = tokio::io::split(io);
    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);

    loop {
        buf.reserve(READ_BUF_SIZE);
        tokio::select! {
            read = rd.read_buf(&mut buf) => match read {
                Ok(0) => {
                    trace!("read eof");
                    events.peer_closed();
                    return;
                }
                Ok(n) => {
                    trace!("read {} bytes", n);
                    events.bytes_received(buf.split().freeze());
                }
                Err(err) => {
                    debug!("read error: {}", err);
                    events.peer_closed();
                    return;
                }
            },
            out = rx.recv() => match out {
                Some(bytes) => {
                    if let Err(err) = wr.write_all(&bytes).await {
                        debug!("write error: {}", err);
                        events.peer_closed();
                        return;
                    }
                    trace!("wrote {} bytes", bytes.len());
                }
                None => {
                    trace!("transport dropped, closing");
                    let _ = wr.shutdown().await;
                    return;
                }
            },
        }
    }
}
