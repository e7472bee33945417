//! `echo`: returns its `text` argument verbatim. Matches spec §8's
//! scenario 2 ("one tool round") exactly, so it doubles as a fixture tool
//! for driver tests as well as a minimal example of the `Tool` trait.

use ac_domain::error::{CoreError, Result};
use ac_domain::tool::ToolDefinition;
use ac_tool_registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct EchoTool {
    definition: ToolDefinition,
}

impl Default for EchoTool {
    fn default() -> Self {
        Self {
            definition: ToolDefinition {
                name: "echo".into(),
                description: "Echoes the given text back verbatim.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"],
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, _ctx: &ToolContext<'_>, args: Value) -> Result<String> {
        args.get("text")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| CoreError::ToolFailed("echo requires a string 'text' argument".into()))
    }
}
