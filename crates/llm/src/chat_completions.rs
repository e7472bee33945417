//! The one concrete LLM Adapter (C6) this workspace ships: a provider
//! speaking the standard chat-completions wire shape (OpenAI, Ollama,
//! vLLM, LM Studio, Together, and similar). Grounded on the teacher's
//! `openai_compat::OpenAiCompatProvider`, trimmed to a single adapter (no
//! Azure URL variant, no embeddings — neither is in scope here).

use ac_domain::config::ModelDefinition;
use ac_domain::error::{CoreError, Result};
use ac_domain::stream::{BoxStream, StreamEvent, Usage};
use ac_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use serde_json::Value;

use crate::streaming;
use crate::traits::{ChatResponse, GenerateOptions, LlmProvider, ThinkingMode};
use crate::util::{from_reqwest, is_retryable};

pub struct ChatCompletionsAdapter {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
}

impl ChatCompletionsAdapter {
    /// Build an adapter for one `models.definitions.<alias>` entry.
    ///
    /// `api_key` is expected to already be resolved: `Config::load` expands
    /// `${ENV_VAR}` across the whole YAML document before parsing, so by the
    /// time a `ModelDefinition` reaches here its `api_key` is a plain string.
    pub fn from_definition(alias: &str, def: &ModelDefinition) -> Result<Self> {
        let base_url = def
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(def.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: alias.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: def.api_key.clone(),
            default_model: def.model_name.clone(),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(url).header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        req
    }

    fn effective_model(&self, opts: &GenerateOptions) -> String {
        opts.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn build_body(
        &self,
        messages: &[Message],
        tool_defs: &[ToolDefinition],
        opts: &GenerateOptions,
        stream: bool,
    ) -> Value {
        let wire_messages: Vec<Value> = messages.iter().map(msg_to_openai).collect();
        let mut body = serde_json::json!({
            "model": self.effective_model(opts),
            "messages": wire_messages,
            "stream": stream,
        });
        if !tool_defs.is_empty() {
            let tools: Vec<Value> = tool_defs.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
            body["parallel_tool_calls"] = Value::Bool(opts.parallel_tool_calls);
        }
        if let Some(temp) = opts.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = opts.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if opts.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }

    async fn send_once(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .authed_post(url)
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let text = resp.text().await.unwrap_or_default();
            let err = if status.as_u16() == 429 || status.is_server_error() {
                CoreError::ProviderTransient {
                    provider: self.id.clone(),
                    message: match retry_after {
                        Some(wait) => format!("HTTP {} - {} (retry after {wait})", status.as_u16(), text),
                        None => format!("HTTP {} - {}", status.as_u16(), text),
                    },
                }
            } else {
                CoreError::ProviderFatal {
                    provider: self.id.clone(),
                    message: format!("HTTP {} - {}", status.as_u16(), text),
                }
            };
            return Err(err);
        }
        Ok(resp)
    }

    /// Send `body`, retrying once on a transient transport/provider error
    /// (spec.md §4.6: "at most one retry on transient transport errors").
    async fn send_with_retry(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        match self.send_once(url, body).await {
            Ok(resp) => Ok(resp),
            Err(e) if is_retryable(&e) => {
                tracing::warn!(provider = %self.id, error = %e, "retrying after transient error");
                self.send_once(url, body).await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ChatCompletionsAdapter {
    async fn generate(
        &self,
        messages: &[Message],
        tool_defs: &[ToolDefinition],
        opts: &GenerateOptions,
        on_reasoning_delta: &mut (dyn FnMut(&str, &str) + Send),
    ) -> Result<ChatResponse> {
        if !opts.streaming {
            return self.generate_blocking(messages, tool_defs, opts).await;
        }
        let stream = self.generate_stream(messages, tool_defs, opts).await?;
        streaming::aggregate(stream, &self.effective_model(opts), on_reasoning_delta).await
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tool_defs: &[ToolDefinition],
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(messages, tool_defs, opts, true);
        tracing::debug!(provider = %self.id, %url, "chat completions stream request");
        let resp = self.send_with_retry(&url, &body).await?;
        Ok(crate::sse::sse_response_stream(resp, parse_sse_data_vec))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

impl ChatCompletionsAdapter {
    async fn generate_blocking(
        &self,
        messages: &[Message],
        tool_defs: &[ToolDefinition],
        opts: &GenerateOptions,
    ) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(messages, tool_defs, opts, false);
        tracing::debug!(provider = %self.id, %url, "chat completions request");
        let resp = self.send_with_retry(&url, &body).await?;
        let text = resp.text().await.map_err(from_reqwest)?;
        let json: Value = serde_json::from_str(&text)?;
        parse_chat_response(&json, &self.id)
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": { "name": name, "arguments": input.to_string() },
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Parts(parts) => {
            for part in parts {
                if let ContentPart::ToolResult { tool_use_id, content, .. } = part {
                    return serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    });
                }
            }
            serde_json::json!({"role": "tool", "tool_call_id": "", "content": ""})
        }
        MessageContent::Text(t) => {
            serde_json::json!({"role": "tool", "tool_call_id": "", "content": t})
        }
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn parse_chat_response(body: &Value, provider_id: &str) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| CoreError::ProviderFatal {
            provider: provider_id.to_string(),
            message: "no choices in response".into(),
        })?;
    let message = choice.get("message").ok_or_else(|| CoreError::ProviderFatal {
        provider: provider_id.to_string(),
        message: "no message in choice".into(),
    })?;

    let content = message.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let finish_reason = choice.get("finish_reason").and_then(|v| v.as_str()).map(String::from);
    let model = body.get("model").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
    let tool_calls = parse_openai_tool_calls(message);
    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse { content, tool_calls, usage, model, finish_reason })
}

fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let call_id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let tool_name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
            let arguments: Value = serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            Some(ToolCall { call_id, tool_name, arguments })
        })
        .collect()
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

fn parse_sse_data(data: &str) -> Option<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return None;
    }
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(CoreError::Json(e))),
    };

    let choice = v.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first());

    if choice.is_none() {
        if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
            return Some(Ok(StreamEvent::Done { usage: Some(usage), finish_reason: None }));
        }
        return None;
    }
    let choice = choice?;
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        let usage = v.get("usage").and_then(parse_openai_usage);
        return Some(Ok(StreamEvent::Done { usage, finish_reason: Some(fr.to_string()) }));
    }

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let id = tc.get("id").and_then(|v| v.as_str()).map(String::from);
            let tool_name = tc
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str())
                .map(String::from);
            if id.is_some() || tool_name.is_some() {
                return Some(Ok(StreamEvent::ToolCallStarted { index, id, tool_name }));
            }
            if let Some(args) = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
            {
                return Some(Ok(StreamEvent::ToolCallDelta { index, delta: args.to_string() }));
            }
        }
    }

    if let Some(text) = delta.get("reasoning_content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            return Some(Ok(StreamEvent::Thinking { text: text.to_string() }));
        }
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            return Some(Ok(StreamEvent::Token { text: text.to_string() }));
        }
    }

    None
}

fn parse_sse_data_vec(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) })];
    }
    match parse_sse_data(data) {
        Some(event) => vec![event],
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_message_with_tool_call_serializes_to_openai_shape() {
        let msg = Message::assistant_with_tool_calls(
            "",
            &[ToolCall {
                call_id: "c1".into(),
                tool_name: "echo".into(),
                arguments: serde_json::json!({"text": "hi"}),
            }],
        );
        let wire = msg_to_openai(&msg);
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["id"], "c1");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "echo");
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let msg = Message::tool_result("c1", "echo", "hi", false);
        let wire = tool_result_to_openai(&msg);
        assert_eq!(wire["tool_call_id"], "c1");
        assert_eq!(wire["content"], "hi");
    }

    #[test]
    fn parses_tool_call_started_then_delta() {
        let started = parse_sse_data(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"c0","function":{"name":"echo"}}]}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(started, StreamEvent::ToolCallStarted { index: 0, .. }));

        let delta = parse_sse_data(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"a\":1}"}}]}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(delta, StreamEvent::ToolCallDelta { index: 0, .. }));
    }

    #[test]
    fn done_sentinel_parses_to_done_event() {
        let events = parse_sse_data_vec("[DONE]");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn thinking_mode_default_is_auto() {
        assert_eq!(ThinkingMode::Auto, ThinkingMode::Auto);
    }
}
