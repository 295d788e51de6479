#![deny(warnings)]

use std::net::SocketAddr;

use futures_util::future;
use h1_session::rt::TokioExecutor;
use h1_session::{Bytes, ConnectionState, Request, Session};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// 读取一个不带请求体的请求头部，返回请求行。
async fn read_head(sock: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        match sock.read(&mut byte).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => buf.push(byte[0]),
        }
    }
    let head = String::from_utf8(buf).unwrap();
    head.lines().next().map(ToOwned::to_owned)
}

/// 在同一个连接上回应 `count` 个请求，响应体是请求路径。
///
/// 回应完之后连接保持打开，直到 `release` 被触发。
async fn serve(
    count: usize,
    release: oneshot::Receiver<()>,
) -> (SocketAddr, tokio::task::JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut served = 0;
        while served < count {
            let line = match read_head(&mut sock).await {
                Some(line) => line,
                None => break,
            };
            let path = line.split(' ').nth(1).unwrap_or("/").to_owned();
            let res = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}",
                path.len(),
                path
            );
            sock.write_all(res.as_bytes()).await.unwrap();
            served += 1;
        }
        let _ = release.await;
        served
    });
    (addr, server)
}

fn get(path: &str) -> Request<Bytes> {
    Request::get(path).body(Bytes::new()).unwrap()
}

#[tokio::test]
async fn keep_alive_requests_share_one_connection() {
    let _ = pretty_env_logger::try_init();
    let (release, hold) = oneshot::channel();
    let (addr, server) = serve(2, hold).await;
    let session = Session::with_addr(TokioExecutor::current(), addr, false);

    let results = future::join_all(vec![
        session.send_request(get("/first")),
        session.send_request(get("/second")),
    ])
    .await;

    let bodies: Vec<String> = results
        .into_iter()
        .map(|res| res.unwrap().text().unwrap().to_owned())
        .collect();
    assert_eq!(bodies, ["/first", "/second"]);
    assert_eq!(session.state(), ConnectionState::Connected);

    release.send(()).unwrap();
    assert_eq!(server.await.unwrap(), 2);
}

#[tokio::test]
async fn refused_connection_is_bad_server_address() {
    let _ = pretty_env_logger::try_init();
    // 先占用一个端口再释放，得到一个大概率没有监听者的地址
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let session = Session::with_addr(TokioExecutor::current(), addr, false);

    let err = session.send_request(get("/")).await.unwrap_err();
    assert!(err.is_bad_server_address(), "{:?}", err);
    assert_eq!(session.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn server_close_fails_waiting_request() {
    let _ = pretty_env_logger::try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await.unwrap();
        // 不回应，直接关闭
    });

    let session = Session::with_addr(TokioExecutor::current(), addr, false);
    let err = session.send_request(get("/")).await.unwrap_err();
    assert!(err.is_network_failure(), "{:?}", err);
    server.await.unwrap();
}
