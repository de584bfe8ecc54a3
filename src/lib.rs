//! sse-source: 带自动重连的 SSE (Server-Sent Events) 流式事件客户端
//!
//! 本库提供:
//! - SSE 增量解析器：任意字节切分下产出一致的事件序列
//! - 连接生命周期管理：状态机 + 致命/可恢复错误分类
//! - 自动重连：Last-Event-ID 续传，服务端 `retry:` 指令控制节奏
//! - 恰好一次的终止回调交付
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use sse_source::EventSource;
//!
//! # async fn example() {
//! let source = EventSource::new(
//!     "https://example.com/events",
//!     |event| println!("事件: {event:?}"),
//!     |error| match error {
//!         None => println!("连接已关闭"),
//!         Some(e) => eprintln!("错误: {e}"),
//!     },
//! );
//!
//! source.open().unwrap();
//! // ... source.close() 随时可从任意线程调用
//! # }
//! ```
//!
//! # 错误分类
//!
//! - HTTP 状态非 200 或 content-type 不符 → 致命，进入 `Failed`，不重连；
//! - 网络掉线（含响应头之前的失败）→ 可恢复，按重连策略自动重试，
//!   除非重试耗尽否则调用方不可见；
//! - 畸形的协议行 → 从来不是错误，按 SSE 规则宽容忽略。

mod connection;
mod dispatch;
mod error;
mod event;
mod parser;
mod retry;
mod source;

pub use error::EventSourceError;
pub use event::{ConnectionState, SseEvent};
pub use parser::{ParserItem, SseParser};
pub use retry::ReconnectPolicy;
pub use source::EventSource;
