use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// A typed progress event published on the Event Bus (C1).
///
/// Tagged the same way the teacher's `TurnEvent` is, so this round-trips to
/// JSON for any external consumer. The bus stamps `timestamp` at `emit()`
/// time, not the producer, so producers stay deterministic in tests.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "thinking")]
    Thinking {
        query: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "thinking_chunk")]
    ThinkingChunk {
        chunk: String,
        accumulated: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "tool_call")]
    ToolCall {
        tool_name: String,
        args: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_name: String,
        result: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "message")]
    Message {
        content: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "error")]
    Error {
        err: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "done")]
    Done {
        content: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "user_interruption")]
    UserInterruption {
        message: String,
        iteration: u32,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Thinking { timestamp, .. }
            | Event::ThinkingChunk { timestamp, .. }
            | Event::ToolCall { timestamp, .. }
            | Event::ToolResult { timestamp, .. }
            | Event::Message { timestamp, .. }
            | Event::Error { timestamp, .. }
            | Event::Done { timestamp, .. }
            | Event::UserInterruption { timestamp, .. } => *timestamp,
        }
    }

    /// Stamp `timestamp` with `now`, overwriting whatever the producer set.
    /// Called by the bus at `emit()` time (see `ac-eventbus`).
    pub fn restamp(mut self, now: DateTime<Utc>) -> Self {
        match &mut self {
            Event::Thinking { timestamp, .. }
            | Event::ThinkingChunk { timestamp, .. }
            | Event::ToolCall { timestamp, .. }
            | Event::ToolResult { timestamp, .. }
            | Event::Message { timestamp, .. }
            | Event::Error { timestamp, .. }
            | Event::Done { timestamp, .. }
            | Event::UserInterruption { timestamp, .. } => *timestamp = now,
        }
        self
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}
