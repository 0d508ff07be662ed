//! Backend message types.
//!
//! Output events are decoded once at the session boundary into closed sum
//! types and classified into log entries; nothing downstream re-inspects a
//! raw event kind.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One output event from a backend session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMessage {
    System(SystemMessage),
    Assistant(AssistantMessage),
    Result(ResultMessage),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemMessage {
    pub subtype: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A block inside an assistant message.
///
/// Block kinds this crate does not model decode as `Other`, keeping their type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Thinking {
        thinking: String,
    },
    Text {
        text: String,
    },
    ToolUse {
        name: Option<String>,
        input: Option<Value>,
    },
    ToolResult {
        content: Value,
    },
    Other {
        block_type: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownBlock {
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolResult {
        #[serde(default)]
        content: Value,
    },
}

impl From<KnownBlock> for ContentBlock {
    fn from(block: KnownBlock) -> Self {
        match block {
            KnownBlock::Thinking { thinking } => ContentBlock::Thinking { thinking },
            KnownBlock::Text { text } => ContentBlock::Text { text },
            KnownBlock::ToolUse { name, input } => ContentBlock::ToolUse { name, input },
            KnownBlock::ToolResult { content } => ContentBlock::ToolResult { content },
        }
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let block_type = raw.get("type").and_then(Value::as_str).unwrap_or("unknown_block");
        match block_type {
            "thinking" | "text" | "tool_use" | "tool_result" => serde_json::from_value::<KnownBlock>(raw)
                .map(ContentBlock::from)
                .map_err(serde::de::Error::custom),
            other => Ok(ContentBlock::Other {
                block_type: other.to_string(),
            }),
        }
    }
}

/// Terminal event; decides success of the whole session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultMessage {
    pub subtype: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl ResultMessage {
    pub fn success() -> Self {
        Self {
            subtype: "success".to_string(),
            ..Default::default()
        }
    }

    pub fn error(subtype: &str, errors: Vec<String>) -> Self {
        Self {
            subtype: subtype.to_string(),
            errors,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.subtype == "success"
    }

    /// Error detail for a failed result: the joined errors, or the subtype.
    pub fn error_detail(&self) -> String {
        if self.errors.is_empty() {
            self.subtype.clone()
        } else {
            self.errors.join("; ")
        }
    }
}

/// Input pushed into a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: String,
    pub session_id: String,
}

impl UserMessage {
    /// A message injected by an operator or the watchdog mid-session.
    pub fn injected(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            session_id: "injected".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryKind {
    Thinking,
    Text,
    ToolUse,
    ToolResult,
    Status,
}

impl std::fmt::Display for LogEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogEntryKind::Thinking => "thinking",
            LogEntryKind::Text => "text",
            LogEntryKind::ToolUse => "tool_use",
            LogEntryKind::ToolResult => "tool_result",
            LogEntryKind::Status => "status",
        };
        write!(f, "{}", s)
    }
}

/// Classified transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogEntryKind,
    pub content: String,
}

impl LogEntry {
    pub fn new(kind: LogEntryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

impl ContentBlock {
    fn to_log_entry(&self) -> LogEntry {
        match self {
            ContentBlock::Thinking { thinking } => LogEntry::new(LogEntryKind::Thinking, thinking.clone()),
            ContentBlock::Text { text } => LogEntry::new(LogEntryKind::Text, text.clone()),
            ContentBlock::ToolUse { name, input } => {
                let name = name.as_deref().unwrap_or("unknown");
                let input = input.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "{}".to_string());
                LogEntry::new(LogEntryKind::ToolUse, format!("{}: {}", name, input))
            }
            ContentBlock::ToolResult { content } => {
                let content = match content {
                    Value::String(s) => s.clone(),
                    Value::Null => "\"\"".to_string(),
                    other => other.to_string(),
                };
                LogEntry::new(LogEntryKind::ToolResult, content)
            }
            ContentBlock::Other { block_type } => LogEntry::new(LogEntryKind::Status, block_type.clone()),
        }
    }
}

impl SessionMessage {
    /// Classify this event into zero or more transcript entries.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        match self {
            SessionMessage::System(sys) if sys.subtype == "init" => vec![LogEntry::new(
                LogEntryKind::Status,
                format!(
                    "init: model={} v{}",
                    sys.model.as_deref().unwrap_or("unknown"),
                    sys.version.as_deref().unwrap_or("unknown")
                ),
            )],
            SessionMessage::System(_) => Vec::new(),
            SessionMessage::Assistant(asst) => asst.content.iter().map(ContentBlock::to_log_entry).collect(),
            SessionMessage::Result(res) => {
                let mut parts = vec![res.subtype.clone()];
                if let Some(cost) = res.total_cost_usd {
                    parts.push(format!("${:.4}", cost));
                }
                if let Some(ms) = res.duration_ms {
                    parts.push(format!("{}ms", ms));
                }
                vec![LogEntry::new(LogEntryKind::Status, format!("result: {}", parts.join(", ")))]
            }
        }
    }

    /// Convenience constructor for a single text block.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        SessionMessage::Assistant(AssistantMessage {
            content: vec![ContentBlock::Text { text: text.into() }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_assistant_blocks() {
        let raw = json!({
            "type": "assistant",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "hello"},
                {"type": "tool_use", "name": "Read", "input": {"path": "PLAN.md"}},
                {"type": "tool_result", "content": "ok"},
                {"type": "image", "source": {}}
            ]
        });
        let msg: SessionMessage = serde_json::from_value(raw).unwrap();
        let entries = msg.log_entries();

        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0], LogEntry::new(LogEntryKind::Thinking, "hmm"));
        assert_eq!(entries[1], LogEntry::new(LogEntryKind::Text, "hello"));
        assert_eq!(entries[2].kind, LogEntryKind::ToolUse);
        assert_eq!(entries[2].content, r#"Read: {"path":"PLAN.md"}"#);
        assert_eq!(entries[3], LogEntry::new(LogEntryKind::ToolResult, "ok"));
        assert_eq!(entries[4], LogEntry::new(LogEntryKind::Status, "image"));
    }

    #[test]
    fn test_unrecognised_blocks_keep_their_type() {
        let raw = json!({
            "type": "assistant",
            "content": [
                {"type": "redacted_thinking", "data": "..."},
                {"source": {}}
            ]
        });
        let msg: SessionMessage = serde_json::from_value(raw).unwrap();
        let entries = msg.log_entries();

        assert_eq!(
            entries,
            vec![
                LogEntry::new(LogEntryKind::Status, "redacted_thinking"),
                LogEntry::new(LogEntryKind::Status, "unknown_block"),
            ]
        );
    }

    #[test]
    fn test_tool_use_without_input() {
        let block = ContentBlock::ToolUse { name: None, input: None };
        let entry = block.to_log_entry();
        assert_eq!(entry.content, "unknown: {}");
    }

    #[test]
    fn test_structured_tool_result_is_json() {
        let block = ContentBlock::ToolResult {
            content: json!([{"type": "text", "text": "x"}]),
        };
        assert_eq!(block.to_log_entry().content, r#"[{"text":"x","type":"text"}]"#);
    }

    #[test]
    fn test_system_init_status() {
        let msg = SessionMessage::System(SystemMessage {
            subtype: "init".into(),
            model: Some("sonnet".into()),
            version: Some("1.2.3".into()),
        });
        assert_eq!(msg.log_entries(), vec![LogEntry::new(LogEntryKind::Status, "init: model=sonnet v1.2.3")]);
    }

    #[test]
    fn test_system_other_subtype_is_silent() {
        let msg = SessionMessage::System(SystemMessage {
            subtype: "compact_boundary".into(),
            ..Default::default()
        });
        assert!(msg.log_entries().is_empty());
    }

    #[test]
    fn test_result_status_line() {
        let msg = SessionMessage::Result(ResultMessage {
            subtype: "success".into(),
            errors: vec![],
            total_cost_usd: Some(0.01234),
            duration_ms: Some(1500),
        });
        assert_eq!(msg.log_entries()[0].content, "result: success, $0.0123, 1500ms");
    }

    #[test]
    fn test_result_error_detail() {
        let joined = ResultMessage::error("error_during_execution", vec!["a".into(), "b".into()]);
        assert!(!joined.is_success());
        assert_eq!(joined.error_detail(), "a; b");

        let bare = ResultMessage::error("error_max_turns", vec![]);
        assert_eq!(bare.error_detail(), "error_max_turns");
        assert!(ResultMessage::success().is_success());
    }

    #[test]
    fn test_injected_user_message() {
        let msg = UserMessage::injected("check PLAN.md");
        assert_eq!(msg.session_id, "injected");
        assert_eq!(msg.content, "check PLAN.md");
    }
}
