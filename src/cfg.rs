//! 条件编译配置宏
//!
//! 目前只有一个可选的功能面（`tls`）需要按 feature 编译。

/// `cfg_feature!` —— 基础条件编译宏
///
/// 接受一个 `#![meta]` 形式的属性和一组 item，为每个 item 同时添加：
/// - `#[cfg($meta)]`：实际的条件编译控制
/// - `#[cfg_attr(docsrs, doc(cfg($meta)))]`：在 docs.rs 上标注所需的 feature
macro_rules! cfg_feature {
    (
        #![$meta:meta]
        $($item:item)*
    ) => {
        $(
            #[cfg($meta)]
            #[cfg_attr(docsrs, doc(cfg($meta)))]
            $item
        )*
    }
}
