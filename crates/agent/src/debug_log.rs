//! Debug log persistence: one JSON file per run under `app.debug_logs.logs_dir`,
//! the one place this core touches a filesystem. Opt-in
//! (`app.debug_logs.enabled`) and explicitly named in spec §6, so it does
//! not conflict with the "no durable transcript persistence" Non-goal — it
//! persists a debug trace, not the conversation transcript itself.
//!
//! Grounded on `sa_gateway::runtime::runs::Run`'s per-run structured record
//! (loop count, per-node timing, token usage); unlike that record, this one
//! is assembled from the Event Bus rather than written inline by the
//! driver, since the driver has no debug-log awareness of its own. Fields
//! the bus doesn't carry per iteration (temperature, max_tokens) are filled
//! from the resolved model's static config rather than left absent.

use std::path::PathBuf;
use std::time::Instant;

use ac_domain::config::DebugLogsConfig;
use ac_domain::error::Result;
use ac_domain::event::Event;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugLlmRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugLlmResponse {
    pub content: String,
    pub tool_calls: Vec<serde_json::Value>,
    pub duration_ms: u128,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugToolExecution {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub duration_ms: u128,
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugIteration {
    pub n: u32,
    pub llm_request: DebugLlmRequest,
    pub llm_response: DebugLlmResponse,
    pub tool_executions: Vec<DebugToolExecution>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub query: String,
    pub iterations: Vec<DebugIteration>,
    pub final_answer: Option<String>,
    pub total_ms: u128,
}

/// Collects events for one run into a [`DebugRunRecord`], then serializes it
/// to `debug_<runId>.json` under `logs_dir` once the run settles.
pub struct DebugRunRecorder {
    cfg: DebugLogsConfig,
    run_id: String,
    started_at: DateTime<Utc>,
    start: Instant,
    query: String,
    model_label: String,
    model_temperature: f32,
    model_max_tokens: u32,
    iterations: Vec<DebugIteration>,
    current: Option<PendingIteration>,
}

struct PendingIteration {
    tool_calls: Vec<(String, serde_json::Value)>,
    tool_executions: Vec<DebugToolExecution>,
}

impl DebugRunRecorder {
    pub fn new(cfg: DebugLogsConfig, query: impl Into<String>, model_label: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            cfg,
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            start: Instant::now(),
            query: query.into(),
            model_label: model_label.into(),
            model_temperature: temperature,
            model_max_tokens: max_tokens,
            iterations: Vec::new(),
            current: None,
        }
    }

    /// Fold one bus event into the in-progress record. Called from the
    /// recorder's own subscriber-drain task.
    pub fn observe(&mut self, event: &Event, messages_count: usize) {
        match event {
            Event::ToolCall { tool_name, args, .. } => {
                let args = if self.cfg.include_tool_args { Some(args.clone()) } else { None };
                self.current
                    .get_or_insert_with(|| PendingIteration { tool_calls: Vec::new(), tool_executions: Vec::new() })
                    .tool_calls
                    .push((tool_name.clone(), args.unwrap_or(serde_json::Value::Null)));
            }
            Event::ToolResult { tool_name, result, duration, success, .. } => {
                let result_text = if self.cfg.include_tool_results {
                    Some(truncate(result, self.cfg.max_result_size))
                } else {
                    None
                };
                if let Some(pending) = self.current.as_mut() {
                    // Tool calls are emitted in order before their results, and
                    // results are emitted in the same order the calls were
                    // dispatched, so position lines the two arrays up.
                    let args = self
                        .cfg
                        .include_tool_args
                        .then(|| pending.tool_calls.get(pending.tool_executions.len()).map(|(_, args)| args.clone()))
                        .flatten();
                    pending.tool_executions.push(DebugToolExecution {
                        name: tool_name.clone(),
                        args,
                        result: result_text,
                        duration_ms: duration.as_millis(),
                        success: *success,
                    });
                }
            }
            Event::Message { content, .. } | Event::Done { content, .. } => {
                self.close_iteration(content.clone(), messages_count);
            }
            _ => {}
        }
    }

    fn close_iteration(&mut self, content: String, messages_count: usize) {
        let pending = self.current.take().unwrap_or_else(|| PendingIteration { tool_calls: Vec::new(), tool_executions: Vec::new() });
        let tool_calls_json = pending
            .tool_calls
            .iter()
            .map(|(name, args)| serde_json::json!({ "name": name, "args": args }))
            .collect();

        self.iterations.push(DebugIteration {
            n: self.iterations.len() as u32 + 1,
            llm_request: DebugLlmRequest {
                model: self.model_label.clone(),
                temperature: self.model_temperature,
                max_tokens: self.model_max_tokens,
                messages_count,
            },
            llm_response: DebugLlmResponse {
                content,
                tool_calls: tool_calls_json,
                duration_ms: 0,
            },
            tool_executions: pending.tool_executions,
        });
    }

    /// Finish the record and, if `app.debug_logs.save_logs` is set, write it
    /// to `logs_dir/debug_<runId>.json`.
    pub fn finish(mut self, final_answer: Option<String>) -> Result<()> {
        if !self.cfg.enabled || !self.cfg.save_logs {
            return Ok(());
        }

        if self.current.is_some() {
            self.close_iteration(final_answer.clone().unwrap_or_default(), 0);
        }

        let record = DebugRunRecord {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            query: self.query,
            iterations: self.iterations,
            final_answer,
            total_ms: self.start.elapsed().as_millis(),
        };

        let dir = PathBuf::from(&self.cfg.logs_dir);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("debug_{}.json", record.run_id));
        let json = serde_json::to_vec_pretty(&record)?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.display(), "wrote debug log");
        Ok(())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut truncated = text[..max].to_string();
        truncated.push_str("...<truncated>");
        truncated
    }
}
