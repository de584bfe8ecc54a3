//! sse-source 统一错误类型

use thiserror::Error;

/// 客户端操作中可能发生的错误
///
/// 分为三类:
/// - 同步错误 (`InvalidUrl` / `UnsupportedScheme` / `AlreadyOpen` /
///   `AlreadyClosed`): 由 `open()` 直接返回，不触发任何连接；
/// - 致命错误 (`HttpStatus` / `InvalidContentType` / `RetriesExhausted`):
///   进入 `Failed` 状态，通过 completion 回调交付，不再重连；
/// - 可恢复错误 (`Network`): 触发重连，除非重试耗尽否则调用方不可见。
#[derive(Debug, Error)]
pub enum EventSourceError {
    #[error("URL 解析错误: {0}")]
    InvalidUrl(String),

    #[error("不支持的 scheme: {0} (仅支持 http/https)")]
    UnsupportedScheme(String),

    #[error("无效操作: 连接已打开")]
    AlreadyOpen,

    #[error("无效操作: 连接已关闭")]
    AlreadyClosed,

    #[error("HTTP 状态错误: 期望 200, 收到 {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("无效的 content-type: 期望 text/event-stream, 收到 {0:?}")]
    InvalidContentType(Option<String>),

    #[error("网络错误: {0}")]
    Network(#[from] reqwest::Error),

    #[error("重试耗尽: 连续 {attempts} 次尝试失败")]
    RetriesExhausted { attempts: usize },
}
