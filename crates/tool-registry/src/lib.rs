//! Tool Registry (C3): holds the set of tools the ReAct Driver (C7) may
//! call, each keyed by name, with JSON-schema argument validation and an
//! enable/disable gate.
//!
//! Grounded on the teacher's ad hoc `match tool_name { ... }` dispatch in
//! `runtime::tools::{build_tool_definitions, dispatch_tool}`, promoted into
//! an explicit `Tool` trait + `HashMap<String, Arc<dyn Tool>>` registry —
//! the same trait-object idiom the teacher uses for `sa_providers::LlmProvider`
//! — because spec §4.3 requires open registration (`register`), not a fixed
//! compiled-in set.

use std::collections::HashMap;
use std::sync::Arc;

use ac_domain::cancel::CancelToken;
use ac_domain::error::{CoreError, Result};
use ac_domain::tool::ToolDefinition;
use ac_eventbus::EventBus;
use ac_questions::QuestionChannel;
use ac_store::ConversationStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

/// Everything a tool's `execute` needs from the running agent, passed by
/// reference so tools never own the driver's state.
pub struct ToolContext<'a> {
    pub store: &'a ConversationStore,
    pub questions: &'a QuestionChannel,
    pub events: &'a EventBus,
    pub cancel: &'a CancelToken,
}

/// One callable tool. Implementors may read or write the `ConversationStore`
/// and may call the `QuestionChannel`; they must honour `ctx.cancel`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    /// Run the tool against already-schema-validated `args`. Returns the
    /// text result handed back to the LLM as a tool message, or an error
    /// that the driver turns into an error tool message.
    async fn execute(&self, ctx: &ToolContext<'_>, args: Value) -> Result<String>;
}

struct Entry {
    tool: Arc<dyn Tool>,
    enabled: bool,
    post_prompt: Option<String>,
}

/// Thread-safe tool registry. Registration is one-shot at startup in the
/// teacher's pattern; this registry allows `register` at any time but still
/// rejects a duplicate name, matching spec §4.3's "registration fails if the
/// name is already taken".
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Register `tool`, optionally with a post-prompt nudge appended to the
    /// transcript after the tool's result (spec §4.3). Fails if the name is
    /// already registered.
    pub fn register(&self, tool: Arc<dyn Tool>, post_prompt: Option<String>) -> Result<()> {
        let name = tool.definition().name.clone();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(CoreError::ConfigInvalid(format!("tool '{name}' is already registered")));
        }
        entries.insert(name, Entry { tool, enabled: true, post_prompt });
        Ok(())
    }

    /// Enable or disable a registered tool. A disabled tool is invisible to
    /// `definitions()` and uncallable via `invoke` (spec §4.3 "Enablement").
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| CoreError::ToolNotFound(name.to_string()))?;
        entry.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let entries = self.entries.read();
        entries.get(name).filter(|e| e.enabled).map(|e| e.tool.clone())
    }

    /// The post-prompt text associated with `name`, if any. Looked up by the
    /// driver after a tool returns, regardless of the tool's enabled state.
    pub fn post_prompt(&self, name: &str) -> Option<String> {
        self.entries.read().get(name).and_then(|e| e.post_prompt.clone())
    }

    /// Definitions for every enabled tool, for inclusion in an LLM request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries
            .read()
            .values()
            .filter(|e| e.enabled)
            .map(|e| e.tool.definition().clone())
            .collect()
    }

    /// Validate `args_json` against `name`'s schema, then run the tool.
    ///
    /// A schema-validation failure is a structured error returned to the
    /// caller, not a panic — spec §4.3 requires it be surfaced to the LLM as
    /// a tool message rather than to the end user.
    pub async fn invoke(&self, ctx: &ToolContext<'_>, name: &str, args_json: &Value) -> Result<String> {
        let tool = self.get(name).ok_or_else(|| CoreError::ToolNotFound(name.to_string()))?;

        let schema = tool.definition().parameters.clone();
        if let Err(e) = validate_against_schema(&schema, args_json) {
            return Err(CoreError::ToolFailed(format!("argument validation failed for '{name}': {e}")));
        }

        if ctx.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        tool.execute(ctx, args_json.clone()).await
    }
}

/// Minimal structural check: every schema property marked required must be
/// present in `args`, and `args` itself must be a JSON object whenever the
/// schema declares `type: object`. Not a full JSON Schema implementation —
/// the teacher's tools don't validate beyond `serde_json::from_value`
/// deserialization failures, so this only adds the presence check spec §4.3
/// calls out explicitly.
fn validate_against_schema(schema: &Value, args: &Value) -> std::result::Result<(), String> {
    if schema.get("type").and_then(|t| t.as_str()) == Some("object") && !args.is_object() {
        return Err("expected a JSON object".to_string());
    }

    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let obj = args.as_object().cloned().unwrap_or_default();
    for field in required {
        let Some(field) = field.as_str() else { continue };
        if !obj.contains_key(field) {
            return Err(format!("missing required field '{field}'"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        def: ToolDefinition,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> &ToolDefinition {
            &self.def
        }

        async fn execute(&self, _ctx: &ToolContext<'_>, args: Value) -> Result<String> {
            Ok(args.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string())
        }
    }

    fn echo_tool() -> Arc<dyn Tool> {
        Arc::new(EchoTool {
            def: ToolDefinition {
                name: "echo".into(),
                description: "echoes text back".into(),
                parameters: json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"],
                }),
            },
        })
    }

    fn ctx_fixtures() -> (ConversationStore, QuestionChannel, EventBus, CancelToken) {
        (ConversationStore::new(), QuestionChannel::default(), EventBus::default(), CancelToken::new())
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool(), None).unwrap();
        let err = registry.register(echo_tool(), None).unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid(_)));
    }

    #[test]
    fn disabled_tool_is_hidden_from_definitions_and_get() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool(), None).unwrap();
        registry.set_enabled("echo", false).unwrap();
        assert!(registry.definitions().is_empty());
        assert!(registry.get("echo").is_none());
    }

    #[tokio::test]
    async fn invoke_runs_tool_and_returns_text_result() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool(), None).unwrap();
        let (store, questions, events, cancel) = ctx_fixtures();
        let ctx = ToolContext { store: &store, questions: &questions, events: &events, cancel: &cancel };

        let result = registry.invoke(&ctx, "echo", &json!({ "text": "hi" })).await.unwrap();
        assert_eq!(result, "hi");
    }

    #[tokio::test]
    async fn invoke_missing_required_field_is_a_structured_error_not_a_panic() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool(), None).unwrap();
        let (store, questions, events, cancel) = ctx_fixtures();
        let ctx = ToolContext { store: &store, questions: &questions, events: &events, cancel: &cancel };

        let err = registry.invoke(&ctx, "echo", &json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::ToolFailed(_)));
    }

    #[tokio::test]
    async fn invoke_unknown_tool_reports_not_found() {
        let registry = ToolRegistry::new();
        let (store, questions, events, cancel) = ctx_fixtures();
        let ctx = ToolContext { store: &store, questions: &questions, events: &events, cancel: &cancel };

        let err = registry.invoke(&ctx, "nope", &json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::ToolNotFound(_)));
    }

    #[test]
    fn post_prompt_is_returned_even_when_tool_later_disabled() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool(), Some("remember to cite echo output".into())).unwrap();
        registry.set_enabled("echo", false).unwrap();
        assert_eq!(registry.post_prompt("echo").as_deref(), Some("remember to cite echo output"));
    }
}
