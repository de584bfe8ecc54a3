//! 事件分发：有序交付 + 恰好一次的终止回调

use crate::error::EventSourceError;
use crate::event::SseEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// 事件回调：每交付一条事件调用一次
pub type EventHandler = Box<dyn Fn(SseEvent) + Send + Sync + 'static>;

/// 终止回调：在 Facade 生命周期内恰好触发一次，`None` 表示显式关闭
pub type CompletionHandler = Box<dyn FnOnce(Option<EventSourceError>) + Send + 'static>;

/// 分发器
///
/// - 事件由唯一的后台读取任务按解析顺序串行交付；
/// - 终止回调放在 take-once 槽位里，「至多一次」由结构保证而非约定；
/// - 标记关闭后到达的事件直接丢弃，不再交付。
pub(crate) struct Dispatcher {
    handler: EventHandler,
    completion: Mutex<Option<CompletionHandler>>,
    closed: AtomicBool,
}

impl Dispatcher {
    pub(crate) fn new(handler: EventHandler, completion: CompletionHandler) -> Self {
        Self {
            handler,
            completion: Mutex::new(Some(completion)),
            closed: AtomicBool::new(false),
        }
    }

    /// 交付一条事件；关闭之后的事件被丢弃
    pub(crate) fn dispatch(&self, event: SseEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        (self.handler)(event);
    }

    /// 标记关闭：之后的 `dispatch` 不再触达事件回调
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// 触发终止回调；槽位已空时为无害的 no-op
    pub(crate) fn complete(&self, error: Option<EventSourceError>) {
        let slot = self
            .completion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(complete) = slot {
            complete(error);
        }
    }
}
