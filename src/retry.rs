//! 重连策略：延迟与尝试次数

use std::time::Duration;

/// 重连配置
///
/// 刻意不做指数退避：SSE 协议的意图是由服务端通过 `retry:` 字段控制
/// 客户端的重连节奏，客户端原样采用最近一次收到的值。
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// 未收到任何 `retry:` 指令时的初始重连延迟
    pub initial_delay: Duration,
    /// 连续失败的最大重试次数（None 表示无限重连）
    pub max_retries: Option<usize>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(3000),
            max_retries: None,
        }
    }
}

impl ReconnectPolicy {
    /// 设置初始重连延迟
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// 设置最大重试次数
    pub fn max_retries(mut self, max: usize) -> Self {
        self.max_retries = Some(max);
        self
    }
}

/// 单个 run loop 内的连续失败计数
#[derive(Debug, Default)]
pub(crate) struct RetryState {
    attempts: usize,
}

impl RetryState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 连接成功建立：清零连续失败计数
    pub(crate) fn record_open(&mut self) {
        self.attempts = 0;
    }

    /// 连接掉线或建立失败：计数加一，返回当前值
    pub(crate) fn record_drop(&mut self) -> usize {
        self.attempts += 1;
        self.attempts
    }

    /// 是否超出策略允许的最大重试次数
    pub(crate) fn exhausted(&self, policy: &ReconnectPolicy) -> bool {
        policy.max_retries.is_some_and(|max| self.attempts > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_three_seconds_unlimited() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(3000));
        assert_eq!(policy.max_retries, None);
    }

    #[test]
    fn unlimited_policy_never_exhausts() {
        let policy = ReconnectPolicy::default();
        let mut state = RetryState::new();
        for _ in 0..1000 {
            state.record_drop();
        }
        assert!(!state.exhausted(&policy));
    }

    #[test]
    fn zero_max_retries_exhausts_on_first_drop() {
        let policy = ReconnectPolicy::default().max_retries(0);
        let mut state = RetryState::new();
        assert!(!state.exhausted(&policy));
        state.record_drop();
        assert!(state.exhausted(&policy));
    }

    #[test]
    fn successful_open_resets_counter() {
        let policy = ReconnectPolicy::default().max_retries(2);
        let mut state = RetryState::new();
        state.record_drop();
        state.record_drop();
        assert!(!state.exhausted(&policy));
        state.record_open();
        state.record_drop();
        assert!(!state.exhausted(&policy));
    }
}
