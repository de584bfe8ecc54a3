//! EventSource Facade：对外公开的客户端对象

use crate::connection::{AttemptError, Connection};
use crate::dispatch::Dispatcher;
use crate::error::EventSourceError;
use crate::event::{ConnectionState, SseEvent};
use crate::parser::ParserItem;
use crate::retry::{ReconnectPolicy, RetryState};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// SSE 流式事件客户端
///
/// 以目标地址和两个回调构造；`open()` 校验地址并启动后台读取任务，
/// 之后事件按流序交付给事件回调，连接终止时终止回调恰好触发一次。
/// `close()` 可从任意线程、在任意状态下调用，幂等。
///
/// 每个实例独立维护自己的 Last-Event-ID 与重连间隔，
/// 多个实例之间互不干扰。
pub struct EventSource {
    url: String,
    headers: HeaderMap,
    policy: ReconnectPolicy,
    http: reqwest::Client,
    shared: Arc<Shared>,
    // 关闭信号的发送端持有在 Facade 自身而非 Shared 上：
    // 不调用 close() 直接 drop 时发送端随之销毁，
    // run loop 的 changed() 以 Err 返回，后台任务终止而不是无限重连
    close_tx: watch::Sender<bool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// run loop 与调用方共享的运行时状态
///
/// Last-Event-ID 与当前重连间隔只由唯一活跃的 run loop 写入；
/// 调用方侧仅有 `open`/`close` 的状态迁移需要串行化。
struct Shared {
    state: Mutex<ConnectionState>,
    last_event_id: Mutex<Option<String>>,
    retry_delay: Mutex<Duration>,
    dispatcher: Dispatcher,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 状态迁移守卫：已进入 `Closed`/`Failed` 后拒绝一切迁移
    fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.lock_state();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    /// 进入 `Failed` 并交付终止错误；若 `close()` 抢先则保持静默
    fn fail(&self, error: EventSourceError) {
        if self.transition(ConnectionState::Failed) {
            self.dispatcher.complete(Some(error));
        }
    }
}

impl EventSource {
    /// 使用目标地址与两个回调构造客户端
    ///
    /// - `handler`: 每交付一条事件调用一次；
    /// - `completion`: 终止时恰好调用一次，`None` 表示显式 `close()`。
    pub fn new<H, C>(url: impl Into<String>, handler: H, completion: C) -> Self
    where
        H: Fn(SseEvent) + Send + Sync + 'static,
        C: FnOnce(Option<EventSourceError>) + Send + 'static,
    {
        let (close_tx, _) = watch::channel(false);
        let policy = ReconnectPolicy::default();
        Self {
            url: url.into(),
            headers: HeaderMap::new(),
            http: reqwest::Client::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Idle),
                last_event_id: Mutex::new(None),
                retry_delay: Mutex::new(policy.initial_delay),
                dispatcher: Dispatcher::new(Box::new(handler), Box::new(completion)),
            }),
            close_tx,
            policy,
            task: Mutex::new(None),
        }
    }

    /// 附加自定义请求头（如鉴权）
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// 附加一组自定义请求头
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// 使用自定义的 `reqwest::Client`（超时、代理、TLS 等配置）
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// 设置重连策略
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        *self
            .shared
            .retry_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = policy.initial_delay;
        self.policy = policy;
        self
    }

    /// 当前连接状态
    pub fn state(&self) -> ConnectionState {
        *self.shared.lock_state()
    }

    /// 最近一次收到的非空事件 id（重连时作为 `Last-Event-ID` 请求头）
    pub fn last_event_id(&self) -> Option<String> {
        self.shared
            .last_event_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 当前生效的重连间隔（服务端 `retry:` 指令会更新它）
    pub fn retry_interval(&self) -> Duration {
        *self
            .shared
            .retry_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// 校验地址并启动后台读取任务
    ///
    /// 同步失败（无效地址 / 重复打开 / 已关闭）不会离开当前状态；
    /// 成功后立即返回 `Connecting`，连接建立与事件交付都发生在后台。
    /// 必须在 tokio 运行时上下文中调用。
    pub fn open(&self) -> Result<(), EventSourceError> {
        let mut state = self.shared.lock_state();
        match *state {
            ConnectionState::Idle => {}
            ConnectionState::Closed | ConnectionState::Failed => {
                return Err(EventSourceError::AlreadyClosed)
            }
            _ => return Err(EventSourceError::AlreadyOpen),
        }

        let url: Url = self.url.parse().map_err(|e: <Url as std::str::FromStr>::Err| {
            error!(url = %self.url, error = %e, "Failed to parse SSE URL");
            EventSourceError::InvalidUrl(e.to_string())
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(EventSourceError::UnsupportedScheme(other.to_string())),
        }

        *state = ConnectionState::Connecting;
        // 在释放状态锁之前订阅关闭信号：保证观察到 Connecting 的 close()
        // 一定发生在订阅之后，信号不会丢失
        let close_rx = self.close_tx.subscribe();
        drop(state);

        info!(url = %url, "Starting SSE connection");

        let ctx = RunCtx {
            url,
            headers: self.headers.clone(),
            http: self.http.clone(),
            policy: self.policy.clone(),
            shared: Arc::clone(&self.shared),
        };
        let handle = tokio::spawn(run(ctx, close_rx));
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// 关闭连接：取消在途请求与重连定时器
    ///
    /// 任意状态、任意次数、任意线程调用都安全；
    /// 若终止回调尚未触发过，以无错误（`None`）的方式触发它；
    /// 已进入 `Failed`/`Closed` 后调用是 no-op，不会产生第二次回调。
    pub fn close(&self) {
        {
            let mut state = self.shared.lock_state();
            if state.is_terminal() {
                return;
            }
            *state = ConnectionState::Closed;
        }
        info!(url = %self.url, "Closing SSE connection");
        self.shared.dispatcher.mark_closed();
        let _ = self.close_tx.send(true);
        self.shared.dispatcher.complete(None);
    }
}

/// 后台 run loop 携带的连接参数
struct RunCtx {
    url: Url,
    headers: HeaderMap,
    http: reqwest::Client,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
}

/// 后台读取循环：串行驱动所有连接尝试
///
/// 关闭信号在每个挂起点（建连、读 chunk、重连定时器）上抢占，
/// 因此 `close()` 之后不会再有新 chunk 进入解析。
/// 发送端被销毁（Facade 未经 close() 直接 drop）时 `changed()` 以 Err
/// 返回，走同一条退出路径。
async fn run(ctx: RunCtx, mut close_rx: watch::Receiver<bool>) {
    let mut retry = RetryState::new();

    loop {
        let outcome = tokio::select! {
            biased;
            _ = close_rx.changed() => return,
            outcome = attempt(&ctx, &mut retry) => outcome,
        };

        match outcome {
            // 服务端正常结束流：按协议重连
            Ok(()) => {}
            Err(AttemptError::Recoverable(e)) => {
                debug!(url = %ctx.url, error = %e, "Recoverable connection error");
            }
            Err(AttemptError::Fatal(e)) => {
                ctx.shared.fail(e);
                return;
            }
        }

        let attempts = retry.record_drop();
        if retry.exhausted(&ctx.policy) {
            warn!(url = %ctx.url, attempts, "Max retries exceeded, giving up");
            ctx.shared.fail(EventSourceError::RetriesExhausted { attempts });
            return;
        }

        if !ctx.shared.transition(ConnectionState::Reconnecting) {
            return;
        }
        let delay = *ctx
            .shared
            .retry_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        info!(
            url = %ctx.url,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Connection dropped, scheduling reconnect"
        );
        tokio::select! {
            biased;
            _ = close_rx.changed() => return,
            _ = sleep(delay) => {}
        }
        if !ctx.shared.transition(ConnectionState::Connecting) {
            return;
        }
    }
}

/// 单次连接尝试：建连、流式读取、更新共享状态、交付事件
async fn attempt(ctx: &RunCtx, retry: &mut RetryState) -> Result<(), AttemptError> {
    let last_id = ctx
        .shared
        .last_event_id
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    let mut conn =
        Connection::open(&ctx.http, &ctx.url, &ctx.headers, last_id.as_deref()).await?;

    if !ctx.shared.transition(ConnectionState::Open) {
        // close() 抢在响应校验完成之后：放弃本次连接
        return Ok(());
    }
    retry.record_open();

    while let Some(next) = conn.next_items().await {
        let items = next.map_err(AttemptError::Recoverable)?;
        for item in items {
            match item {
                ParserItem::Event(event) => ctx.shared.dispatcher.dispatch(event),
                ParserItem::LastEventId(id) => {
                    // 空 id 语义上代表清空 Last-Event-ID
                    let mut slot = ctx
                        .shared
                        .last_event_id
                        .lock()
                        .unwrap_or_else(|e| e.into_inner());
                    *slot = if id.is_empty() { None } else { Some(id) };
                }
                ParserItem::Retry(delay) => {
                    debug!(
                        url = %ctx.url,
                        retry_ms = delay.as_millis() as u64,
                        "Server requested retry interval update"
                    );
                    *ctx
                        .shared
                        .retry_delay
                        .lock()
                        .unwrap_or_else(|e| e.into_inner()) = delay;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_source(url: &str) -> EventSource {
        EventSource::new(url, |_| {}, |_| {})
    }

    #[tokio::test]
    async fn open_with_invalid_url_stays_idle() {
        let source = noop_source("not-a-valid-url");
        let err = source.open().unwrap_err();
        assert!(matches!(err, EventSourceError::InvalidUrl(_)));
        assert_eq!(source.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn open_with_unsupported_scheme_stays_idle() {
        let source = noop_source("ftp://example.com/events");
        let err = source.open().unwrap_err();
        assert!(matches!(err, EventSourceError::UnsupportedScheme(_)));
        assert_eq!(source.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn open_twice_is_rejected() {
        let source = noop_source("http://127.0.0.1:1/events");
        source.open().unwrap();
        let err = source.open().unwrap_err();
        assert!(matches!(err, EventSourceError::AlreadyOpen));
        source.close();
    }

    #[tokio::test]
    async fn open_after_close_is_rejected() {
        let source = noop_source("http://127.0.0.1:1/events");
        source.close();
        assert_eq!(source.state(), ConnectionState::Closed);
        let err = source.open().unwrap_err();
        assert!(matches!(err, EventSourceError::AlreadyClosed));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_completes_once() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let source = EventSource::new(
            "http://127.0.0.1:1/events",
            |_| {},
            move |error| {
                tx.send(error.is_none()).unwrap();
            },
        );
        source.close();
        source.close();
        assert_eq!(rx.recv().await, Some(true));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn policy_seeds_retry_interval() {
        let source = noop_source("http://127.0.0.1:1/events")
            .with_policy(ReconnectPolicy::default().initial_delay(Duration::from_millis(50)));
        assert_eq!(source.retry_interval(), Duration::from_millis(50));
    }
}
