//! 请求调度模块
//!
//! 调用方提交的每个请求都被包装成一个 [`Pending`]：请求本身、一个只能触发一次的
//! [`Callback`]，以及提交序号。引擎按 FIFO 顺序把它们放在 [`Queue`] 里。
//!
//! ## 设计要点
//!
//! - `Callback` 是一个"丢弃守卫"：如果它在没有被显式调用的情况下被丢弃（比如引擎
//!   任务被执行器取消），它会自己调用一次回调，传入 `Canceled` 错误。这样每个请求
//!   都恰好得到一个结果，调用方永远不会无限期等待。
//! - 队列只允许队首请求处于"已发送"状态：`head_sent` 为 `true` 时，下一个完整的
//!   响应属于队首。出队时该标志随之清除。

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use http::Request;

use crate::response::Response;

type BoxCallback = Box<dyn FnOnce(crate::Result<Response>) + Send>;

/// 只能触发一次的结果回调。
pub(crate) struct Callback(Option<BoxCallback>);

impl Callback {
    pub(crate) fn new<F>(f: F) -> Callback
    where
        F: FnOnce(crate::Result<Response>) + Send + 'static,
    {
        Callback(Some(Box::new(f)))
    }

    /// 交付结果，消费回调。
    pub(crate) fn send(mut self, result: crate::Result<Response>) {
        if let Some(f) = self.0.take() {
            f(result);
        }
    }
}

impl Drop for Callback {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f(Err(dispatch_gone()));
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&self.0.as_ref().map(|_| ".."))
            .finish()
    }
}

#[cold]
fn dispatch_gone() -> crate::Error {
    crate::Error::new_canceled().with(if std::thread::panicking() {
        "user code panicked"
    } else {
        "runtime dropped the session engine"
    })
}

/// 一个尚未得到结果的请求。
#[derive(Debug)]
pub(crate) struct Pending {
    pub(crate) request: Request<Bytes>,
    callback: Callback,
    seq: u64,
}

impl Pending {
    pub(crate) fn new(request: Request<Bytes>, callback: Callback) -> Pending {
        Pending {
            request,
            callback,
            seq: 0,
        }
    }

    /// 入队时分配的序号，从 0 开始递增。
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn complete(self, result: crate::Result<Response>) {
        trace!("completing request #{} ok={}", self.seq, result.is_ok());
        self.callback.send(result);
    }
}

/// 待处理请求的 FIFO 队列。
#[derive(Debug, Default)]
pub(crate) struct Queue {
    items: VecDeque<Pending>,
    head_sent: bool,
    next_seq: u64,
}

impl Queue {
    pub(crate) fn new() -> Queue {
        Queue::default()
    }

    /// 追加到队尾，返回分配的序号。
    pub(crate) fn push_back(&mut self, mut pending: Pending) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        pending.seq = seq;
        self.items.push_back(pending);
        seq
    }

    pub(crate) fn front(&self) -> Option<&Pending> {
        self.items.front()
    }

    pub(crate) fn pop_front(&mut self) -> Option<Pending> {
        self.head_sent = false;
        self.items.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// 队首请求是否已经写到连接上，正在等待响应。
    pub(crate) fn head_sent(&self) -> bool {
        self.head_sent
    }

    pub(crate) fn mark_head_sent(&mut self) {
        debug_assert!(!self.items.is_empty(), "mark_head_sent on empty queue");
        self.head_sent = true;
    }

    /// 连接被丢弃时调用：队首（如果已发送）会被重新发送到新连接上。
    pub(crate) fn unmark_head_sent(&mut self) {
        self.head_sent = false;
    }

    /// 按顺序取出所有请求。
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Pending> + '_ {
        self.head_sent = false;
        self.items.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::Outcome;

    fn recorder() -> (Arc<Mutex<Vec<Outcome>>>, impl Fn() -> Callback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let seen = seen.clone();
            move || {
                let seen = seen.clone();
                Callback::new(move |res| seen.lock().unwrap().push(Outcome::of(&res)))
            }
        };
        (seen, make)
    }

    fn get() -> Request<Bytes> {
        Request::get("/").body(Bytes::new()).unwrap()
    }

    #[test]
    fn drop_with_no_send_is_canceled() {
        let (seen, cb) = recorder();
        drop(cb());
        assert_eq!(*seen.lock().unwrap(), vec![Outcome::Canceled]);
    }

    #[test]
    fn send_fires_exactly_once() {
        let (seen, cb) = recorder();
        cb().send(Err(crate::Error::new_network_failure()));
        assert_eq!(*seen.lock().unwrap(), vec![Outcome::NetworkFailure]);
    }

    #[test]
    fn queue_is_fifo_with_sequence_numbers() {
        let (_seen, cb) = recorder();
        let mut q = Queue::new();
        assert_eq!(q.push_back(Pending::new(get(), cb())), 0);
        assert_eq!(q.push_back(Pending::new(get(), cb())), 1);
        assert_eq!(q.push_back(Pending::new(get(), cb())), 2);
        assert_eq!(q.len(), 3);

        q.mark_head_sent();
        assert!(q.head_sent());
        let first = q.pop_front().unwrap();
        assert_eq!(first.seq(), 0);
        assert!(!q.head_sent());
        assert_eq!(q.front().map(Pending::seq), Some(1));

        let rest: Vec<u64> = q.drain().map(|p| p.seq()).collect();
        assert_eq!(rest, vec![1, 2]);
        assert!(q.is_empty());
    }

    #[test]
    fn dropping_queue_cancels_everything() {
        let (seen, cb) = recorder();
        let mut q = Queue::new();
        q.push_back(Pending::new(get(), cb()));
        q.push_back(Pending::new(get(), cb()));
        drop(q);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Outcome::Canceled, Outcome::Canceled]
        );
    }
}
