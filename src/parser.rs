//! SSE 增量解析器：输入任意切分的 bytes chunk，按 SSE 规则产出事件与指令。
//!
//! 三阶段流水线:
//! - bytes chunk（网络分片） -> line（按 \n/\r/\r\n 切） -> block（按 field/value 组装，空行结束）
//!
//! 对任意字节切分（拆行、拆 \r\n、拆 UTF-8 码点）的输入，
//! 产出与一次性喂入完全一致。

use crate::event::SseEvent;
use std::time::Duration;

/// 解析器按行序产出的条目：事件本体，或影响重连行为的指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserItem {
    /// 一条完整事件（空行结束且 block 内出现过 `data:` 行）
    Event(SseEvent),
    /// `retry:` 指令：服务端指定的重连间隔
    Retry(Duration),
    /// `id:` 指令：粘性 Last-Event-ID 更新（即使该 block 最终不产出事件）
    LastEventId(String),
}

/// 当前 block 内累积的字段
#[derive(Debug, Default)]
struct PendingEvent {
    id: Option<String>,
    event: Option<String>,
    data: String,
    /// block 内是否出现过 `data:` 行（哪怕值为空）
    has_data: bool,
}

/// SSE 增量解析器
///
/// 未完成的尾行跨 chunk 缓冲在内部；每次连接尝试都应使用全新的解析器，
/// 掉线时缓冲中的半行随之丢弃，不完整事件永远不会被交付。
pub struct SseParser {
    buffer: Vec<u8>,
    position: usize,
    discard_trailing_newline: bool, // 处理 \r\n 跨 chunk
    cur: PendingEvent,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            position: 0,
            discard_trailing_newline: false,
            cur: PendingEvent::default(),
        }
    }

    /// 喂入一个 bytes chunk，返回本次解析产生的所有条目（按行序）。
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ParserItem> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut line_start = 0usize;

        while self.position < self.buffer.len() {
            // 如果上一轮遇到 \r，下一字节若为 \n 则吞掉（单个终止符，不是两个空行）
            if self.discard_trailing_newline {
                if self.buffer[self.position] == b'\n' {
                    self.position += 1;
                    line_start = self.position;
                }
                self.discard_trailing_newline = false;
            }

            // 向前寻找行尾（\r 或 \n）
            let mut line_end: Option<usize> = None;
            while self.position < self.buffer.len() && line_end.is_none() {
                match self.buffer[self.position] {
                    b'\r' => {
                        self.discard_trailing_newline = true;
                        line_end = Some(self.position);
                        self.position += 1;
                    }
                    b'\n' => {
                        line_end = Some(self.position);
                        self.position += 1;
                    }
                    _ => self.position += 1,
                }
            }

            let Some(end) = line_end else {
                // 到了 buffer 末尾但没找到行尾：等待下一个 chunk
                break;
            };

            let line = self.buffer[line_start..end].to_vec();
            self.on_line(&line, &mut out);

            line_start = self.position; // 下一行从当前位置开始
        }

        // 丢弃已处理的前缀，保留未完成的尾部
        if line_start > 0 {
            self.buffer.drain(0..line_start);
            self.position = self.position.saturating_sub(line_start);
        }

        out
    }

    fn on_line(&mut self, line: &[u8], out: &mut Vec<ParserItem>) {
        if line.is_empty() {
            // 空行：结束一个 block。只有出现过 data 行才产出事件；
            // 未决字段一律清空（粘性 Last-Event-ID 由上层维护，不受影响）。
            let pending = std::mem::take(&mut self.cur);
            if pending.has_data {
                out.push(ParserItem::Event(SseEvent {
                    id: pending.id,
                    event: pending.event.unwrap_or_else(|| String::from("message")),
                    data: pending.data,
                }));
            }
            return;
        }

        // comment 行：以 ':' 开头，完全忽略
        if line[0] == b':' {
            return;
        }

        // 找到第一个 ':' 作为 field/value 分隔符；
        // 没有 ':' 的行按「字段名 + 空值」处理（SSE 解析刻意宽容）
        let colon_idx = line.iter().position(|&b| b == b':');
        let (field, value) = match colon_idx {
            Some(idx) => {
                // value 可能是 ":<value>" 或 ": <value>"（只剥一个前导空格）
                let mut value_start = idx + 1;
                if value_start < line.len() && line[value_start] == b' ' {
                    value_start += 1;
                }
                (&line[..idx], &line[value_start..])
            }
            None => (line, &[][..]),
        };

        match field {
            b"data" => {
                let v = decode_utf8_lossy(value);
                if self.cur.has_data {
                    self.cur.data.push('\n');
                }
                self.cur.data.push_str(&v);
                self.cur.has_data = true;
            }
            b"event" => {
                self.cur.event = Some(decode_utf8_lossy(value));
            }
            b"id" => {
                // 含 NUL 的 id 无效，整行忽略（已有的 id 不会被清除）
                if !value.contains(&0) {
                    let v = decode_utf8_lossy(value);
                    self.cur.id = Some(v.clone());
                    out.push(ParserItem::LastEventId(v));
                }
            }
            b"retry" => {
                // 仅接受纯 ASCII 数字串：不允许空白、正负号、小数点
                if !value.is_empty() && value.iter().all(u8::is_ascii_digit) {
                    let v = decode_utf8_lossy(value);
                    if let Ok(ms) = v.parse::<u64>() {
                        out.push(ParserItem::Retry(Duration::from_millis(ms)));
                    }
                }
            }
            _ => {
                // 未知字段忽略
            }
        }
    }
}

fn decode_utf8_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}
