//! 连接管理：单次流式 HTTP 请求的生命周期与错误分类

use crate::error::EventSourceError;
use crate::parser::{ParserItem, SseParser};
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::pin::Pin;
use tracing::{debug, error, info, warn};

/// 连接尝试的错误分类：致命错误直接进入 `Failed`，可恢复错误交给重连策略
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// HTTP 状态 / content-type 不符：不再重连
    Fatal(EventSourceError),
    /// 响应头之前的网络失败（DNS、拒连、超时）：按策略重连
    Recoverable(EventSourceError),
}

/// 一次活跃的流式连接：响应 body + 本次连接专属的解析器
///
/// 解析器随连接一起创建和销毁，跨 chunk 缓冲的未完成行
/// 不会泄漏到下一次尝试，不完整事件永远不会被交付。
pub(crate) struct Connection {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    parser: SseParser,
}

/// 媒体类型是否为 `text/event-stream`（允许 `;` 之后的参数，忽略大小写）
///
/// 精确匹配媒体类型本体，`text/event-streamfoo` 之类不算。
fn is_event_stream(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime.eq_ignore_ascii_case("text/event-stream")
}

impl Connection {
    /// 发起 GET 请求并校验响应
    ///
    /// 自动设置 `Accept: text/event-stream` 与 `Accept-Encoding: identity`
    /// （禁用压缩，避免中间链路 buffering 影响流式体验）；
    /// 已知 Last-Event-ID 时附带重连请求头。
    pub(crate) async fn open(
        http: &reqwest::Client,
        url: &Url,
        extra_headers: &HeaderMap,
        last_event_id: Option<&str>,
    ) -> Result<Self, AttemptError> {
        let mut headers = extra_headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        if let Some(id) = last_event_id {
            match HeaderValue::from_str(id) {
                Ok(v) => {
                    debug!(url = %url, last_event_id = %id, "Setting Last-Event-ID header");
                    headers.insert("Last-Event-ID", v);
                }
                Err(_) => {
                    // 放不进 header 的 id（含控制字符等）跳过不发，保持宽容
                    warn!(url = %url, "Last-Event-ID not representable as a header value, skipping");
                }
            }
        }

        let resp = http
            .get(url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed before response");
                AttemptError::Recoverable(EventSourceError::Network(e))
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            error!(url = %url, status = %status, "Unexpected HTTP status");
            return Err(AttemptError::Fatal(EventSourceError::HttpStatus(status)));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        if content_type.as_deref().map(is_event_stream) != Some(true) {
            error!(url = %url, content_type = ?content_type, "Invalid content-type, expected text/event-stream");
            return Err(AttemptError::Fatal(EventSourceError::InvalidContentType(
                content_type,
            )));
        }

        info!(url = %url, "SSE connection established");

        Ok(Self {
            body: Box::pin(resp.bytes_stream()),
            parser: SseParser::new(),
        })
    }

    /// 读取下一个 chunk 并解析
    ///
    /// `None` 表示服务端正常结束流；`Err` 为中途的网络错误。
    /// 两者对上层都是可恢复的掉线。
    pub(crate) async fn next_items(
        &mut self,
    ) -> Option<Result<Vec<ParserItem>, EventSourceError>> {
        match self.body.next().await {
            None => None,
            Some(Ok(chunk)) => Some(Ok(self.parser.push(&chunk))),
            Some(Err(e)) => {
                warn!(error = %e, "Error reading SSE stream chunk");
                Some(Err(EventSourceError::Network(e)))
            }
        }
    }
}
