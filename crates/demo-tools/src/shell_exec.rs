//! `shell_exec`: a simplified, foreground-only command runner.
//!
//! Grounded on `sa_tools::exec::{exec, is_dangerous_env_var}` with the
//! background/session-management half removed — no `ProcessManager`,
//! session IDs, or `yield_ms` auto-backgrounding, since spec §4.3's tool
//! contract is a single `execute(ctx, args) -> (text, err)` call with no
//! notion of a long-lived session to hand back. The dangerous-env-var
//! blocklist is kept verbatim: these variables can redirect library
//! loading or escape the intended working directory regardless of what a
//! command string itself says.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use ac_domain::error::{CoreError, Result};
use ac_domain::tool::ToolDefinition;
use ac_tool_registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const BLOCKED_ENV_VARS: &[&str] = &[
    "LD_PRELOAD", "LD_LIBRARY_PATH", "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES", "DYLD_LIBRARY_PATH", "DYLD_FRAMEWORK_PATH",
    "PATH", "HOME", "USER", "SHELL",
    "SSH_AUTH_SOCK", "SSH_AGENT_PID",
    "PYTHONPATH", "PYTHONSTARTUP", "PYTHONHOME",
    "NODE_PATH", "NODE_OPTIONS",
    "RUBYLIB", "RUBYOPT",
    "PERL5LIB", "PERL5OPT",
    "CLASSPATH",
    "BASH_ENV", "ENV", "CDPATH",
    "IFS",
];

fn is_dangerous_env_var(name: &str) -> bool {
    BLOCKED_ENV_VARS.contains(&name.to_ascii_uppercase().as_str())
}

#[derive(Debug, Deserialize)]
struct ShellExecArgs {
    command: String,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    env: Option<HashMap<String, String>>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

pub struct ShellExecTool {
    definition: ToolDefinition,
}

impl Default for ShellExecTool {
    fn default() -> Self {
        Self {
            definition: ToolDefinition {
                name: "shell_exec".into(),
                description: "Run a shell command in the foreground and return its combined output.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "command": { "type": "string" },
                        "workdir": { "type": "string" },
                        "env": { "type": "object" },
                        "timeout_secs": { "type": "integer" },
                    },
                    "required": ["command"],
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, _ctx: &ToolContext<'_>, args: Value) -> Result<String> {
        let args: ShellExecArgs = serde_json::from_value(args)
            .map_err(|e| CoreError::ToolFailed(format!("invalid shell_exec arguments: {e}")))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&args.command);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        if let Some(workdir) = &args.workdir {
            cmd.current_dir(workdir);
        }
        if let Some(env) = &args.env {
            for (key, value) in env {
                if is_dangerous_env_var(key) {
                    return Err(CoreError::ToolFailed(format!(
                        "environment variable '{key}' is blocked by security policy"
                    )));
                }
                cmd.env(key, value);
            }
        }

        let timeout = Duration::from_secs(args.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let child = cmd
            .spawn()
            .map_err(|e| CoreError::ToolFailed(format!("failed to spawn '{}': {e}", args.command)))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CoreError::ToolTimeout(args.command.clone()))?
            .map_err(|e| CoreError::ToolFailed(format!("failed to wait on '{}': {e}", args.command)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        match output.status.code() {
            Some(0) => Ok(combined),
            Some(code) => Err(CoreError::ToolFailed(format!(
                "command exited with status {code}: {combined}"
            ))),
            None => Err(CoreError::ToolFailed(format!("command terminated by signal: {combined}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_eventbus::EventBus;
    use ac_questions::QuestionChannel;
    use ac_store::ConversationStore;

    fn fixtures() -> (ConversationStore, QuestionChannel, EventBus, ac_domain::cancel::CancelToken) {
        (ConversationStore::new(), QuestionChannel::default(), EventBus::default(), ac_domain::cancel::CancelToken::new())
    }

    #[tokio::test]
    async fn runs_a_command_and_returns_its_stdout() {
        let tool = ShellExecTool::default();
        let (store, questions, events, cancel) = fixtures();
        let ctx = ToolContext { store: &store, questions: &questions, events: &events, cancel: &cancel };

        let result = tool.execute(&ctx, json!({ "command": "echo hi" })).await.unwrap();
        assert_eq!(result.trim(), "hi");
    }

    #[tokio::test]
    async fn nonzero_exit_status_is_a_tool_error() {
        let tool = ShellExecTool::default();
        let (store, questions, events, cancel) = fixtures();
        let ctx = ToolContext { store: &store, questions: &questions, events: &events, cancel: &cancel };

        let err = tool.execute(&ctx, json!({ "command": "exit 7" })).await.unwrap_err();
        assert!(matches!(err, CoreError::ToolFailed(_)));
    }

    #[tokio::test]
    async fn dangerous_env_var_is_rejected_before_spawning() {
        let tool = ShellExecTool::default();
        let (store, questions, events, cancel) = fixtures();
        let ctx = ToolContext { store: &store, questions: &questions, events: &events, cancel: &cancel };

        let err = tool
            .execute(&ctx, json!({ "command": "echo hi", "env": { "LD_PRELOAD": "/tmp/evil.so" } }))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolFailed(_)));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let tool = ShellExecTool::default();
        let (store, questions, events, cancel) = fixtures();
        let ctx = ToolContext { store: &store, questions: &questions, events: &events, cancel: &cancel };

        let err = tool
            .execute(&ctx, json!({ "command": "sleep 5", "timeout_secs": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolTimeout(_)));
    }
}
