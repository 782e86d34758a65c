//! Parser for the `codex exec --json` event stream

use serde_json::{Map, Value};
use tracing::debug;

use crate::event::{decode_event, CodexEvent, Item};

/// Longest command output shown in the progress log, in bytes
pub const MAX_COMMAND_OUTPUT: usize = 4000;

/// What the stdout stream yielded once it ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Text of the last agent message, empty if none was seen
    pub response: String,
    /// Raw JSON of every decoded event, one per line
    pub full_log: String,
    /// Human-readable transcript relayed to the coordinator
    pub progress: String,
    /// Last structured error reported by the agent
    pub error_message: Option<String>,
    /// Thread ID from `thread.started`
    pub thread_id: Option<String>,
    /// Input plus output tokens
    pub tokens_used: u64,
}

/// Incremental state machine over stdout lines.
///
/// Lines must be fed in arrival order; each relayed snapshot is the whole
/// progress log so far, never a delta.
#[derive(Debug, Default)]
pub struct StreamParser {
    full_log: String,
    progress: String,
    response: Option<String>,
    error_message: Option<String>,
    thread_id: Option<String>,
    /// Usage from the last `turn.completed`, authoritative when present
    turn_tokens: Option<u64>,
    /// Usage from the last event of any type that carried some
    latest_tokens: Option<u64>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stdout line.
    ///
    /// Returns the progress snapshot to relay when the line changed it. A line
    /// that is not a JSON object is an error and the caller stops parsing.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<String>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let object: Map<String, Value> = serde_json::from_str(line)?;
        self.full_log.push_str(line);
        self.full_log.push('\n');

        let value = Value::Object(object);
        let (envelope, event) = decode_event(&value);
        debug!("Received event type: {}", envelope.event_type);

        let progress_before = self.progress.len();

        if let Some(message) = envelope.error.as_ref().and_then(|e| e.message()) {
            debug!("Got error in event: {}", message);
            self.record_error(message.to_string());
        }

        if let Some(total) = envelope.usage.and_then(|u| u.total()) {
            self.latest_tokens = Some(total);
        }

        match event {
            CodexEvent::ThreadStarted { thread_id } => {
                if !thread_id.is_empty() {
                    debug!("Got session/thread ID: {}", thread_id);
                    self.thread_id = Some(thread_id);
                }
            }
            CodexEvent::TurnCompleted { usage } => {
                if let Some(total) = usage.and_then(|u| u.total()) {
                    debug!("Got final token usage from turn.completed: {}", total);
                    self.turn_tokens = Some(total);
                }
            }
            CodexEvent::ItemStarted => {}
            CodexEvent::ItemCompleted { item } => self.handle_item(item),
            CodexEvent::Error { message, code } => {
                if let Some(message) = message.filter(|m| !m.is_empty()) {
                    debug!("Got error event: {}", message);
                    self.record_error(message);
                }
                if let Some(code) = code.as_ref().map(CodexEvent::error_code) {
                    self.error_message = Some(match self.error_message.take() {
                        Some(message) => format!("{} (code: {})", message, code),
                        None => format!("Error code: {}", code),
                    });
                }
            }
            CodexEvent::AssistantReasoning { text } => {
                self.progress.push_str(&format!("🤔 {}\n", text));
            }
            CodexEvent::Other => {}
        }

        if self.progress.len() != progress_before {
            Ok(Some(self.progress.clone()))
        } else {
            Ok(None)
        }
    }

    fn handle_item(&mut self, item: Item) {
        if let Some(text) = item.message_text() {
            debug!("Got agent message: {} chars", text.len());
            self.response = Some(text.to_string());
            return;
        }

        match item {
            Item::Reasoning { text } if !text.is_empty() => {
                self.progress.push_str(&format!("🤔 {}\n", text));
            }
            Item::CommandExecution {
                command,
                aggregated_output,
            } => {
                self.progress.push_str(&format_command(&command, &aggregated_output));
            }
            _ => {}
        }
    }

    fn record_error(&mut self, message: String) {
        self.progress.push_str(&format!("❌ Error: {}\n", message));
        self.error_message = Some(message);
    }

    /// Current progress log
    pub fn progress(&self) -> &str {
        &self.progress
    }

    /// Finish parsing and summarize what was captured
    pub fn finish(self) -> StreamSummary {
        StreamSummary {
            response: self.response.unwrap_or_default(),
            full_log: self.full_log,
            progress: self.progress,
            error_message: self.error_message,
            thread_id: self.thread_id,
            tokens_used: self.turn_tokens.or(self.latest_tokens).unwrap_or(0),
        }
    }
}

/// Render a finished command as a "ran / output" block
fn format_command(command: &str, output: &str) -> String {
    let mut block = format!("✅ Ran: {}\n\n📋 Output:\n", command);

    let output = output.trim();
    if output.is_empty() {
        block.push_str("   (no output)\n");
    } else {
        let display = truncate_output(output, MAX_COMMAND_OUTPUT);
        for line in display.split('\n') {
            block.push_str("   ");
            block.push_str(line);
            block.push('\n');
        }
    }

    block.push('\n');
    block
}

/// Cap `text` at `max` bytes on a character boundary
fn truncate_output(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (truncated)", &text[..end])
}
