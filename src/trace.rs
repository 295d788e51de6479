//! 日志宏模块
//!
//! 对 `tracing` 的日志宏做一层条件包装：
//!
//! 1. `tracing` feature 启用时（默认），宏展开为对应的 `tracing::*` 调用
//! 2. 未启用时展开为空块，不产生任何运行时开销
//!
//! 本模块在 `lib.rs` 中通过 `#[macro_use]` 引入，crate 内任何位置都可以直接
//! 写 `trace!`、`debug!`、`warn!`。
//!
//! 级别约定：
//! - `debug!`：连接状态迁移（解析、连接、断开、清空队列）
//! - `trace!`：单个请求/单次读写的细节
//! - `warn!`：可恢复但不符合预期的情况（多余的字节、解压失败）

// 并非每个宏都被用到，抑制"未使用宏"的警告。
#![allow(unused_macros)]

/// `debug!` —— 转发到 `tracing::debug!`
macro_rules! debug {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!($($arg)+);
        }
    }
}

/// `error!` —— 转发到 `tracing::error!`
macro_rules! error {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::error!($($arg)+);
        }
    }
}

/// `trace!` —— 转发到 `tracing::trace!`，最细粒度的日志
macro_rules! trace {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::trace!($($arg)+);
        }
    }
}

/// `warn!` —— 转发到 `tracing::warn!`
macro_rules! warn {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::warn!($($arg)+);
        }
    }
}
