//! Streaming Aggregator (C5).
//!
//! Consumes a provider's delta stream (`StreamEvent`, already decoded from
//! the wire by an LLM Adapter) and produces one settled `ChatResponse`,
//! mirroring the `tc_bufs: HashMap<_, (name, args)>` assembly loop inside
//! the teacher's `run_turn_inner`, generalized to key tool-call buffers by
//! provider index instead of call id (DESIGN.md, Open Question 3) and
//! extracted into a standalone, independently testable component.

use std::collections::BTreeMap;

use ac_domain::error::{CoreError, Result};
use ac_domain::stream::{BoxStream, StreamEvent, Usage};
use ac_domain::tool::ToolCall;
use futures_util::StreamExt;

use crate::traits::ChatResponse;

#[derive(Default)]
struct ToolCallBuf {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Consume `stream` to completion and return the settled response.
///
/// `on_reasoning_delta(delta, accumulated)` is invoked for every reasoning
/// chunk, in arrival order, so the caller can emit `ThinkingChunk` events
/// without the aggregator depending on the Event Bus directly.
pub async fn aggregate(
    mut stream: BoxStream<'static, Result<StreamEvent>>,
    model_hint: &str,
    on_reasoning_delta: &mut (dyn FnMut(&str, &str) + Send),
) -> Result<ChatResponse> {
    let mut content = String::new();
    let mut reasoning_acc = String::new();
    // BTreeMap keeps index order for free when we finally flatten it.
    let mut tool_calls: BTreeMap<usize, ToolCallBuf> = BTreeMap::new();
    let mut usage: Option<Usage> = None;
    let mut finish_reason: Option<String> = None;
    let mut saw_done = false;

    while let Some(item) = stream.next().await {
        match item {
            Ok(StreamEvent::Token { text }) => content.push_str(&text),
            Ok(StreamEvent::Thinking { text }) => {
                reasoning_acc.push_str(&text);
                on_reasoning_delta(&text, &reasoning_acc);
            }
            Ok(StreamEvent::ToolCallStarted { index, id, tool_name }) => {
                let buf = tool_calls.entry(index).or_default();
                if id.is_some() {
                    buf.id = id;
                }
                if tool_name.is_some() {
                    buf.name = tool_name;
                }
            }
            Ok(StreamEvent::ToolCallDelta { index, delta }) => {
                tool_calls.entry(index).or_default().arguments.push_str(&delta);
            }
            Ok(StreamEvent::Done { usage: u, finish_reason: fr }) => {
                usage = u;
                finish_reason = fr;
                saw_done = true;
            }
            Ok(StreamEvent::Error { message }) => {
                return Err(CoreError::ProviderTransient {
                    provider: model_hint.to_string(),
                    message,
                });
            }
            Err(e) => return Err(e),
        }
    }

    if !saw_done {
        tracing::debug!(model = %model_hint, "stream ended without an explicit Done event");
    }

    let tool_calls: Vec<ToolCall> = tool_calls
        .into_iter()
        .filter_map(|(index, buf)| {
            let call_id = buf.id.unwrap_or_else(|| format!("call_{index}"));
            let tool_name = buf.name?;
            let arguments: serde_json::Value = if buf.arguments.is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&buf.arguments).unwrap_or(serde_json::json!({}))
            };
            Some(ToolCall {
                call_id,
                tool_name,
                arguments,
            })
        })
        .collect();

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        model: model_hint.to_string(),
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn box_stream(events: Vec<Result<StreamEvent>>) -> BoxStream<'static, Result<StreamEvent>> {
        Box::pin(stream::iter(events))
    }

    #[tokio::test]
    async fn concatenates_content_tokens() {
        let events = vec![
            Ok(StreamEvent::Token { text: "hel".into() }),
            Ok(StreamEvent::Token { text: "lo".into() }),
            Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }),
        ];
        let mut chunks = Vec::new();
        let settled = aggregate(box_stream(events), "m", &mut |d, acc| {
            chunks.push((d.to_string(), acc.to_string()))
        })
        .await
        .unwrap();
        assert_eq!(settled.content, "hello");
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn emits_thinking_chunk_callback_in_order() {
        let events = vec![
            Ok(StreamEvent::Thinking { text: "a".into() }),
            Ok(StreamEvent::Thinking { text: "b".into() }),
            Ok(StreamEvent::Done { usage: None, finish_reason: None }),
        ];
        let mut seen = Vec::new();
        aggregate(box_stream(events), "m", &mut |d, acc| {
            seen.push((d.to_string(), acc.to_string()))
        })
        .await
        .unwrap();
        assert_eq!(seen, vec![("a".to_string(), "a".to_string()), ("b".to_string(), "ab".to_string())]);
    }

    #[tokio::test]
    async fn merges_tool_call_deltas_by_index_preserving_order() {
        let events = vec![
            Ok(StreamEvent::ToolCallStarted { index: 1, id: Some("c1".into()), tool_name: Some("fast".into()) }),
            Ok(StreamEvent::ToolCallStarted { index: 0, id: Some("c0".into()), tool_name: Some("slow".into()) }),
            Ok(StreamEvent::ToolCallDelta { index: 0, delta: "{\"n\":1}".into() }),
            Ok(StreamEvent::ToolCallDelta { index: 1, delta: "{\"n\":2}".into() }),
            Ok(StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) }),
        ];
        let settled = aggregate(box_stream(events), "m", &mut |_, _| {}).await.unwrap();
        assert_eq!(settled.tool_calls.len(), 2);
        assert_eq!(settled.tool_calls[0].call_id, "c0");
        assert_eq!(settled.tool_calls[1].call_id, "c1");
    }

    #[tokio::test]
    async fn transport_error_fails_aggregation() {
        let events = vec![
            Ok(StreamEvent::Token { text: "partial".into() }),
            Err(CoreError::Http("connection reset".into())),
        ];
        let err = aggregate(box_stream(events), "m", &mut |_, _| {}).await.unwrap_err();
        assert!(matches!(err, CoreError::Http(_)));
    }
}
