//! ReAct Driver (C7): drives the LLM, the Tool Registry (C3), and the
//! Conversation Store (C4) through one run's worth of iterations to a
//! final user-visible answer.
//!
//! Grounded on `sa_gateway::runtime::turn::{run_turn, run_turn_inner,
//! TurnContext}` — the iteration loop, the tool-call assembly, and the
//! provider-order result dispatch are direct descendants of that function,
//! restructured around `EventBus`/`ConversationStore`/`ToolRegistry`
//! instead of `AppState`/`TranscriptWriter`/a raw SSE `mpsc::Sender`.
//! Draining an interruption channel at each iteration boundary and the
//! MaxIterations forced-closing call (tools disabled) have no equivalent
//! in `run_turn_inner`'s shape; the forced-stop itself is grounded on the
//! teacher's `MAX_TOOL_LOOPS` force-stop, extended with one extra
//! tools-disabled call per spec rather than simply erroring out. That
//! closing call's outcome is handled by two different paths depending on
//! why it was made: `finalize_graceful` (stop-sentinel interruption) ends
//! the run on the closing call's own success or failure; `finalize_exhausted`
//! (the iteration budget genuinely ran out) always surfaces
//! `MaxIterationsReached`, even when the closing call itself succeeded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ac_domain::cancel::CancelToken;
use ac_domain::error::{CoreError, Result};
use ac_domain::event::Event;
use ac_domain::tool::{ChainInput, ChainOutput, Message, RunConfig, ToolCall};
use ac_eventbus::EventBus;
use ac_llm::{GenerateOptions, LlmProvider, ThinkingMode};
use ac_questions::QuestionChannel;
use ac_store::{ContextCaps, ConversationStore};
use ac_tool_registry::{ToolContext, ToolRegistry};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful agent. Use the available tools when they help answer the user's request.";

/// The sentinel interruption that requests graceful termination (spec
/// §4.7 "Interruption semantics").
const STOP_SENTINEL: &str = "stop";

/// A single tool-call-name-invented-by-the-LLM, repeated this many times in
/// a row, escalates from "reported back to the LLM" to a fatal driver error
/// (spec §4.7's failure taxonomy).
const MAX_REPEATED_UNKNOWN_TOOL: u32 = 3;

/// Everything one driver run shares across its components. Cheap to clone
/// (every field is an `Arc` or already `Clone`), so the same `RunContext`
/// can be handed to tools via `ToolContext`.
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<ConversationStore>,
    pub tools: Arc<ToolRegistry>,
    pub events: Arc<EventBus>,
    pub questions: Arc<QuestionChannel>,
    pub llm: Arc<dyn LlmProvider>,
    pub cancel: CancelToken,
}

/// Drives one `ChainInput` to a `ChainOutput` (spec §4.7).
pub struct Driver {
    ctx: RunContext,
}

impl Driver {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, input: ChainInput) -> Result<ChainOutput> {
        let ChainInput { query, mut interruptions, run_config } = input;
        let deadline = run_config.timeout.map(|t| Instant::now() + t);
        let system_prompt = run_config
            .system_prompt_override
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        self.ctx
            .events
            .emit(&self.ctx.cancel, Event::Thinking { query: query.clone(), timestamp: chrono_now() })
            .await;
        self.ctx.store.append(Message::user(query));

        let mut unknown_tool_streak: (Option<String>, u32) = (None, 0);

        for iteration in 0..run_config.max_iterations {
            if self.ctx.cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            let mut stop_requested = self
                .drain_interruptions(&mut interruptions, iteration)
                .await;

            let messages = self.ctx.store.build_context(system_prompt, ContextCaps::default());
            let tool_defs = self.ctx.tools.definitions();

            if stop_requested {
                let closing = self.call_llm(&messages, &[], &run_config).await;
                return self.finalize_graceful(closing, run_config.max_iterations).await;
            }

            let response = match self.call_llm(&messages, &tool_defs, &run_config).await {
                Ok(r) => r,
                Err(e) => {
                    self.ctx
                        .events
                        .emit(&self.ctx.cancel, Event::Error { err: e.to_string(), timestamp: chrono_now() })
                        .await;
                    return Err(e);
                }
            };

            self.ctx.store.append(if response.tool_calls.is_empty() {
                Message::assistant(response.content.clone())
            } else {
                Message::assistant_with_tool_calls(response.content.clone(), &response.tool_calls)
            });

            if response.tool_calls.is_empty() {
                self.ctx
                    .events
                    .emit(&self.ctx.cancel, Event::Message { content: response.content.clone(), timestamp: chrono_now() })
                    .await;
                self.ctx
                    .events
                    .emit(&self.ctx.cancel, Event::Done { content: response.content.clone(), timestamp: chrono_now() })
                    .await;
                return Ok(ChainOutput { final_text: response.content, iterations_used: iteration + 1 });
            }

            stop_requested |= self.has_stop_sentinel(&response.tool_calls);
            self.dispatch_tool_calls(&response.tool_calls, deadline, run_config.parallel_tool_calls, &mut unknown_tool_streak)
                .await?;

            if unknown_tool_streak.1 >= MAX_REPEATED_UNKNOWN_TOOL {
                let name = unknown_tool_streak.0.clone().unwrap_or_default();
                return Err(CoreError::ToolNotFound(format!(
                    "'{name}' invoked {MAX_REPEATED_UNKNOWN_TOOL} times in a row with no matching tool"
                )));
            }

            if stop_requested {
                let closing_messages = self.ctx.store.build_context(system_prompt, ContextCaps::default());
                let closing = self.call_llm(&closing_messages, &[], &run_config).await;
                return self.finalize_graceful(closing, iteration + 1).await;
            }
        }

        self.ctx.store.append(Message::system(format!(
            "The agent reached its limit of {} iterations. Answer with what you have.",
            run_config.max_iterations
        )));
        let closing_messages = self.ctx.store.build_context(system_prompt, ContextCaps::default());
        let closing = self.call_llm(&closing_messages, &[], &run_config).await;
        self.finalize_exhausted(closing, run_config.max_iterations).await
    }

    /// Used by the stop-sentinel graceful-exit paths (interruption-driven
    /// and mid-loop `stop_requested`): the closing call's own outcome is the
    /// run's outcome, propagated untouched on failure.
    async fn finalize_graceful(
        &self,
        closing: Result<ac_llm::ChatResponse>,
        iterations_used: u32,
    ) -> Result<ChainOutput> {
        match closing {
            Ok(resp) => {
                self.ctx.store.append(Message::assistant(resp.content.clone()));
                self.ctx
                    .events
                    .emit(&self.ctx.cancel, Event::Done { content: resp.content.clone(), timestamp: chrono_now() })
                    .await;
                Ok(ChainOutput { final_text: resp.content, iterations_used })
            }
            Err(e) => {
                self.ctx
                    .events
                    .emit(&self.ctx.cancel, Event::Error { err: e.to_string(), timestamp: chrono_now() })
                    .await;
                Err(e)
            }
        }
    }

    /// Used only when the iteration budget is genuinely exhausted (spec.md
    /// §4.7/§7/§8 scenario 6): unconditionally returns
    /// `MaxIterationsReached`, carrying the closing call's content when it
    /// succeeded and `None` when even the closing call failed.
    async fn finalize_exhausted(
        &self,
        closing: Result<ac_llm::ChatResponse>,
        iterations_used: u32,
    ) -> Result<ChainOutput> {
        match closing {
            Ok(resp) => {
                self.ctx.store.append(Message::assistant(resp.content.clone()));
                self.ctx
                    .events
                    .emit(
                        &self.ctx.cancel,
                        Event::Error { err: format!("max iterations ({iterations_used}) reached"), timestamp: chrono_now() },
                    )
                    .await;
                Err(CoreError::MaxIterationsReached { last_content: Some(resp.content) })
            }
            Err(e) => {
                self.ctx
                    .events
                    .emit(&self.ctx.cancel, Event::Error { err: e.to_string(), timestamp: chrono_now() })
                    .await;
                Err(CoreError::MaxIterationsReached { last_content: None })
            }
        }
    }

    /// Non-blocking drain of every message currently sitting in the
    /// interruption channel. Returns whether the stop sentinel was seen.
    async fn drain_interruptions(
        &self,
        interruptions: &mut Option<tokio::sync::mpsc::UnboundedReceiver<String>>,
        iteration: u32,
    ) -> bool {
        let Some(rx) = interruptions.as_mut() else { return false };
        let mut stop = false;
        while let Ok(message) = rx.try_recv() {
            if message.trim().eq_ignore_ascii_case(STOP_SENTINEL) {
                stop = true;
            }
            self.ctx
                .events
                .emit(
                    &self.ctx.cancel,
                    Event::UserInterruption { message: message.clone(), iteration, timestamp: chrono_now() },
                )
                .await;
            self.ctx.store.append(Message::interruption(message));
        }
        stop
    }

    async fn call_llm(
        &self,
        messages: &[Message],
        tool_defs: &[ac_domain::tool::ToolDefinition],
        run_config: &RunConfig,
    ) -> Result<ac_llm::ChatResponse> {
        let opts = GenerateOptions {
            streaming: run_config.streaming,
            thinking: ThinkingMode::Auto,
            parallel_tool_calls: run_config.parallel_tool_calls,
            ..GenerateOptions::default()
        };

        // `on_reasoning_delta` is a plain (non-async) callback, so deltas are
        // pushed onto an unbounded channel in arrival order and drained into
        // `ThinkingChunk` events by a side task, rather than spawning one
        // detached task per chunk (which would let emission order race).
        let (delta_tx, mut delta_rx) = tokio::sync::mpsc::unbounded_channel::<(String, String)>();
        let mut on_delta = move |chunk: &str, accumulated: &str| {
            let _ = delta_tx.send((chunk.to_string(), accumulated.to_string()));
        };

        let bus = self.ctx.events.clone();
        let cancel = self.ctx.cancel.clone();
        let drain = tokio::spawn(async move {
            while let Some((chunk, accumulated)) = delta_rx.recv().await {
                bus.emit(&cancel, Event::ThinkingChunk { chunk, accumulated, timestamp: chrono_now() }).await;
            }
        });

        let result = self.ctx.llm.generate(messages, tool_defs, &opts, &mut on_delta).await;
        drop(on_delta);
        let _ = drain.await;
        result
    }

    fn has_stop_sentinel(&self, calls: &[ToolCall]) -> bool {
        calls.iter().any(|c| c.tool_name.eq_ignore_ascii_case(STOP_SENTINEL))
    }

    /// Tool invocation policy (spec §4.7): serial by default, parallel only
    /// when `parallel` (sourced from `opts.parallel_tool_calls`) allows it;
    /// either way, results are appended to the transcript in provider order
    /// regardless of completion order.
    async fn dispatch_tool_calls(
        &self,
        calls: &[ToolCall],
        deadline: Option<Instant>,
        parallel: bool,
        unknown_tool_streak: &mut (Option<String>, u32),
    ) -> Result<()> {
        for call in calls {
            self.ctx
                .events
                .emit(
                    &self.ctx.cancel,
                    Event::ToolCall { tool_name: call.tool_name.clone(), args: call.arguments.clone(), timestamp: chrono_now() },
                )
                .await;
        }

        let per_tool_timeout = remaining_budget(deadline).unwrap_or(Duration::from_secs(120));
        let results = if parallel && calls.len() > 1 {
            // `join_all` preserves input order in its output regardless of
            // which future actually settles first, so zipping against
            // `calls` below still yields provider order.
            futures_util::future::join_all(calls.iter().map(|call| self.invoke_one_tool(call, per_tool_timeout))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.invoke_one_tool(call, per_tool_timeout).await);
            }
            results
        };

        for (call, (content, success, duration)) in calls.iter().zip(results) {
            if !success && matches!(content.as_str(), s if s.starts_with("tool not found")) {
                if unknown_tool_streak.0.as_deref() == Some(call.tool_name.as_str()) {
                    unknown_tool_streak.1 += 1;
                } else {
                    *unknown_tool_streak = (Some(call.tool_name.clone()), 1);
                }
            } else {
                *unknown_tool_streak = (None, 0);
            }

            self.ctx
                .events
                .emit(
                    &self.ctx.cancel,
                    Event::ToolResult {
                        tool_name: call.tool_name.clone(),
                        result: content.clone(),
                        duration,
                        success,
                        timestamp: chrono_now(),
                    },
                )
                .await;
            self.ctx
                .store
                .append(Message::tool_result(call.call_id.clone(), call.tool_name.clone(), content, !success));

            if let Some(post_prompt) = self.ctx.tools.post_prompt(&call.tool_name) {
                self.ctx.store.append(Message::system(post_prompt));
            }
        }

        Ok(())
    }

    /// Run one tool call with a timeout and panic isolation (spec §4.7: "A
    /// tool panic must be caught and converted to an error result").
    async fn invoke_one_tool(&self, call: &ToolCall, timeout: Duration) -> (String, bool, Duration) {
        let start = Instant::now();
        let store = self.ctx.store.clone();
        let questions = self.ctx.questions.clone();
        let events = self.ctx.events.clone();
        let cancel = self.ctx.cancel.clone();
        let tools = self.ctx.tools.clone();
        let call = call.clone();

        let task = tokio::spawn(async move {
            let ctx = ToolContext { store: &*store, questions: &*questions, events: &*events, cancel: &cancel };
            tools.invoke(&ctx, &call.tool_name, &call.arguments).await
        });

        let outcome = tokio::time::timeout(timeout, task).await;
        let elapsed = start.elapsed();
        let (content, success) = match outcome {
            Ok(Ok(Ok(content))) => (content, true),
            Ok(Ok(Err(CoreError::ToolNotFound(name)))) => (format!("tool not found: {name}"), false),
            Ok(Ok(Err(e))) => (e.to_string(), false),
            Ok(Err(join_err)) => (format!("tool panicked: {join_err}"), false),
            Err(_) => (format!("tool '{}' timed out after {:?}", call.tool_name, timeout), false),
        };
        (content, success, elapsed)
    }
}

fn remaining_budget(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
