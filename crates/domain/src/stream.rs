use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Low-level chunk events an LLM Adapter (C6) decodes off the wire, before
/// the Streaming Aggregator (C5) settles them into one response.
///
/// Tool-call deltas are keyed by `index` (the provider-assigned positional
/// index within the assistant message), not by call id — OpenAI-compatible
/// providers only send the id on the delta that starts a given index (see
/// DESIGN.md, Open Question 3).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A content token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// A reasoning/thinking token chunk.
    #[serde(rename = "thinking")]
    Thinking { text: String },

    /// A tool call has started at this index; carries the id/name if the
    /// provider sent them on this chunk.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted {
        index: usize,
        id: Option<String>,
        tool_name: Option<String>,
    },

    /// Incremental tool call argument data for the tool call at this index.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { index: usize, delta: String },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// A transport-level error occurred mid-stream.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
