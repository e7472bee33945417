use ac_domain::error::Result;
use ac_domain::stream::{BoxStream, StreamEvent};
use ac_domain::tool::{Message, ToolCall, ToolDefinition};

/// Whether the model should think out loud before answering, and whether
/// tool calls may be dispatched concurrently (spec.md §4.6 `opts`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingMode {
    On,
    Off,
    Auto,
}

/// Options accompanying a `generate` call (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub thinking: ThinkingMode,
    pub streaming: bool,
    pub parallel_tool_calls: bool,
    pub json_mode: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            max_tokens: None,
            thinking: ThinkingMode::Auto,
            streaming: true,
            parallel_tool_calls: false,
            json_mode: false,
        }
    }
}

/// The fully reassembled ("settled") assistant turn C6 returns to the
/// driver. Whether it arrived via a single request or via C5 aggregation
/// of a delta stream is invisible to the caller.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<ac_domain::stream::Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Trait every LLM Adapter (C6) implements.
///
/// Invariant (spec.md §4.6): an adapter never writes to the Conversation
/// Store; it only returns a settled assistant message for the driver to
/// append.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a settled response, internally streaming via C5 when
    /// `opts.streaming` is set and emitting `ThinkingChunk`-worthy deltas
    /// through `on_reasoning_delta`.
    async fn generate(
        &self,
        messages: &[Message],
        tool_defs: &[ToolDefinition],
        opts: &GenerateOptions,
        on_reasoning_delta: &mut (dyn FnMut(&str, &str) + Send),
    ) -> Result<ChatResponse>;

    /// Low-level streaming entry point, exposed for callers (and tests)
    /// that want to drive the Streaming Aggregator themselves.
    async fn generate_stream(
        &self,
        messages: &[Message],
        tool_defs: &[ToolDefinition],
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider/model instance.
    fn provider_id(&self) -> &str;
}
