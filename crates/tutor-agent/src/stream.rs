use futures::stream::Stream;
use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

use tutor_core::error::TutorError;
use tutor_core::types::AgentMessage;

/// Decode one line of stream-JSON output.
///
/// Blank lines and lines that are not JSON objects yield `None`.
pub fn parse_line(line: &str) -> Option<AgentMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(value) if value.is_object() => Some(AgentMessage::from_json(value)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Skipping non-JSON agent output line");
            None
        }
    }
}

/// A stream of agent messages from newline-delimited JSON.
pub fn message_stream<R>(
    reader: R,
) -> impl Stream<Item = Result<AgentMessage, TutorError>> + Send + 'static
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    LinesStream::new(reader.lines()).filter_map(|line| async move {
        match line {
            Ok(line) => parse_line(&line).map(Ok),
            Err(e) => Some(Err(TutorError::Io(e))),
        }
    })
}
