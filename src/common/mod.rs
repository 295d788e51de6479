//! 内部公共工具模块（common）。
//!
//! 目前只有类型擦除的执行器 `Exec`，供引擎、解析任务和默认传输层共用。

pub(crate) mod exec;
