//! Event types emitted by `codex exec --json`
//!
//! Every stdout line is one JSON object. Decoding happens in two steps:
//! an [`EventEnvelope`] picks up the fields any event may carry (`type`,
//! `error`, `usage`), then [`CodexEvent`] decodes the variant-specific shape.

use serde::Deserialize;
use serde_json::Value;

/// Fields that may appear on any event regardless of its type
#[derive(Debug, Default, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub error: Option<InlineError>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// An `error` field attached to an arbitrary event
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InlineError {
    Text(String),
    Object {
        #[serde(default)]
        message: Option<String>,
    },
    Other(Value),
}

impl InlineError {
    /// The human-readable message, if there is a non-empty one
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Object { message } => message.as_deref(),
            Self::Other(_) => None,
        }
        .filter(|m| !m.is_empty())
    }
}

/// Token accounting reported by the agent
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    /// Input plus output tokens, or `None` when the event carries no usage
    pub fn total(&self) -> Option<u64> {
        if self.input_tokens > 0 || self.output_tokens > 0 {
            Some(self.input_tokens + self.output_tokens)
        } else {
            None
        }
    }
}

/// One decoded agent event
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum CodexEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted {
        #[serde(default)]
        thread_id: String,
    },

    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: Option<Usage>,
    },

    #[serde(rename = "item.started")]
    ItemStarted,

    #[serde(rename = "item.completed")]
    ItemCompleted { item: Item },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        code: Option<Value>,
    },

    /// Older CLI versions stream reasoning as a top-level event
    #[serde(rename = "assistant.reasoning")]
    AssistantReasoning {
        #[serde(default)]
        text: String,
    },

    #[serde(other)]
    Other,
}

/// A completed conversation item
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    AgentMessage {
        #[serde(default)]
        text: Option<String>,
        /// Legacy shape: `content: [{"text": ...}]`
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    CommandExecution {
        #[serde(default)]
        command: String,
        #[serde(default)]
        aggregated_output: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ContentPart {
    #[serde(default)]
    pub text: String,
}

impl Item {
    /// Text of an agent message; the legacy content shape wins when both are present
    pub fn message_text(&self) -> Option<&str> {
        match self {
            Self::AgentMessage { text, content } => content
                .first()
                .map(|part| part.text.as_str())
                .filter(|t| !t.is_empty())
                .or_else(|| text.as_deref().filter(|t| !t.is_empty())),
            _ => None,
        }
    }
}

impl CodexEvent {
    /// Error code rendered as text (codes arrive as strings or numbers)
    pub fn error_code(code: &Value) -> String {
        match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Decode an already-parsed JSON object into its envelope and variant.
///
/// A field of the wrong shape never aborts the stream: the envelope falls
/// back to its default and the variant to [`CodexEvent::Other`].
pub fn decode_event(value: &Value) -> (EventEnvelope, CodexEvent) {
    let envelope = EventEnvelope::deserialize(value).unwrap_or_else(|e| {
        tracing::debug!("Event envelope did not decode: {}", e);
        EventEnvelope::default()
    });
    let event = CodexEvent::deserialize(value).unwrap_or_else(|e| {
        tracing::debug!("Event '{}' did not decode: {}", envelope.event_type, e);
        CodexEvent::Other
    });
    (envelope, event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_thread_started() {
        let (envelope, event) = decode_event(&json!({"type": "thread.started", "thread_id": "t-1"}));
        assert_eq!(envelope.event_type, "thread.started");
        match event {
            CodexEvent::ThreadStarted { thread_id } => assert_eq!(thread_id, "t-1"),
            other => panic!("Expected ThreadStarted, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_agent_message_shapes() {
        let (_, event) = decode_event(&json!({
            "type": "item.completed",
            "item": {"type": "agent_message", "text": "Cleared 4GB"}
        }));
        match event {
            CodexEvent::ItemCompleted { item } => assert_eq!(item.message_text(), Some("Cleared 4GB")),
            other => panic!("Expected ItemCompleted, got {:?}", other),
        }

        let (_, event) = decode_event(&json!({
            "type": "item.completed",
            "item": {"type": "agent_message", "content": [{"text": "legacy"}]}
        }));
        match event {
            CodexEvent::ItemCompleted { item } => assert_eq!(item.message_text(), Some("legacy")),
            other => panic!("Expected ItemCompleted, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_types_decode_as_other() {
        let (_, event) = decode_event(&json!({"type": "session.configured", "model": "x"}));
        assert!(matches!(event, CodexEvent::Other));

        let (_, event) = decode_event(&json!({
            "type": "item.completed",
            "item": {"type": "file_change", "path": "a.rs"}
        }));
        assert!(matches!(event, CodexEvent::ItemCompleted { item: Item::Other }));
    }

    #[test]
    fn test_wrong_field_shape_does_not_abort() {
        let (_, event) = decode_event(&json!({"type": "thread.started", "thread_id": 42}));
        assert!(matches!(event, CodexEvent::Other));
    }

    #[test]
    fn test_inline_error_shapes() {
        let (envelope, _) = decode_event(&json!({"type": "x", "error": "boom"}));
        assert_eq!(envelope.error.unwrap().message(), Some("boom"));

        let (envelope, _) = decode_event(&json!({"type": "x", "error": {"message": "bad key"}}));
        assert_eq!(envelope.error.unwrap().message(), Some("bad key"));

        let (envelope, _) = decode_event(&json!({"type": "x", "error": {"code": 7}}));
        assert_eq!(envelope.error.unwrap().message(), None);
    }

    #[test]
    fn test_usage_total() {
        assert_eq!(Usage::default().total(), None);
        let usage = Usage {
            input_tokens: 120,
            output_tokens: 30,
        };
        assert_eq!(usage.total(), Some(150));
    }
}
