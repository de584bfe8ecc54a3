//! SSE 事件类型与连接状态

/// 一条 SSE 事件（由 field/value 行组成，以空行结束）
///
/// `id` 仅在事件自己的 block 中出现过合法的 `id:` 行时才会被设置；
/// 粘性的 Last-Event-ID（用于重连请求头）由客户端单独维护，
/// 不会被复制到省略了 `id:` 的后续事件上。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub id: Option<String>,
    /// 事件类型，来源省略 `event:` 字段时默认为 `"message"`
    pub event: String,
    /// 多个 `data:` 行以 `\n` 连接后的完整数据
    pub data: String,
}

impl Default for SseEvent {
    fn default() -> Self {
        Self {
            id: None,
            event: String::from("message"),
            data: String::new(),
        }
    }
}

impl SseEvent {
    /// 使用给定的数据创建新的 SSE 事件
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// 设置事件类型
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    /// 设置事件 ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// 客户端连接状态机
///
/// `Closed` 与 `Failed` 为终止状态，进入后不再发生任何迁移。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 尚未调用 `open()`
    Idle,
    /// 正在建立 HTTP 连接（含校验响应头之前）
    Connecting,
    /// 已收到合法响应，正在流式读取
    Open,
    /// 连接掉线，等待重连定时器
    Reconnecting,
    /// 调用方显式 `close()`
    Closed,
    /// 致命错误（HTTP 状态 / content-type / 重试耗尽）
    Failed,
}

impl ConnectionState {
    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}
