//! Output parsers for the agent's stdout and stderr streams

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

pub mod codex;

pub use codex::{StreamParser, StreamSummary};

/// Receives the cumulative progress log each time it grows
pub type OutputCallback = Arc<dyn Fn(String) + Send + Sync>;

static SESSION_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"session[_\s]*(?:id)?[:\s]*([a-zA-Z0-9-]+)").expect("Invalid regex")
});

/// What the stderr stream yielded once it ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StderrSummary {
    /// Every stderr line, newline-terminated
    pub text: String,
    /// Last session ID mentioned in free text, used only as a fallback
    pub session_hint: Option<String>,
}

/// Newline-delimited reader that tolerates bytes outside UTF-8.
///
/// Invalid sequences become U+FFFD instead of ending the stream, and a
/// trailing `\r` is stripped along with the `\n`.
pub struct LossyLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// Consume whatever is left so the writer never blocks or sees a closed pipe
    pub async fn discard(mut self) {
        if let Err(e) = tokio::io::copy(&mut self.reader, &mut tokio::io::sink()).await {
            debug!("Error discarding remaining output: {}", e);
        }
    }
}

/// Read stdout to EOF, feeding each line through `parser`.
///
/// A line that fails to decode stops parsing, but the rest of the stream is
/// still consumed so the child never blocks on a full pipe.
pub async fn drain_stdout<R>(reader: R, mut parser: StreamParser, on_output: &OutputCallback) -> StreamSummary
where
    R: AsyncRead + Unpin,
{
    let mut lines = LossyLines::new(reader);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parser.feed_line(&line) {
                Ok(Some(snapshot)) => on_output(snapshot),
                Ok(None) => {}
                Err(e) => {
                    warn!("Stopping event parsing on undecodable line: {}", e);
                    lines.discard().await;
                    break;
                }
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading agent stdout: {}", e);
                lines.discard().await;
                break;
            }
        }
    }

    parser.finish()
}

/// Read stderr to EOF, keeping the text and any session ID it mentions
pub async fn drain_stderr<R>(reader: R) -> StderrSummary
where
    R: AsyncRead + Unpin,
{
    let mut lines = LossyLines::new(reader);
    let mut summary = StderrSummary::default();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("stderr: {}", line);
                if let Some(id) = session_id_hint(&line) {
                    summary.session_hint = Some(id);
                }
                summary.text.push_str(&line);
                summary.text.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading agent stderr: {}", e);
                lines.discard().await;
                break;
            }
        }
    }

    summary
}

/// Match a session ID in a free-text line, case-insensitively
pub fn session_id_hint(line: &str) -> Option<String> {
    let lower = line.to_lowercase();
    SESSION_ID_PATTERN
        .captures(&lower)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
}
