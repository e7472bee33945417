//! Agent Facade (C8): the single entry point that wires every other
//! component together and exposes `new`/`run`/`execute`/`register_tool`.
//!
//! Grounded on `sa_gateway::state::AppState`'s construction-order wiring
//! (config -> stores -> registries -> adapters -> driver) and on
//! `sa_gateway::bootstrap`'s "build once at startup" philosophy, re-expressed
//! as a library entry point instead of an HTTP server's shared state. The
//! HTTP surface itself is out of scope here: any process embedding this
//! crate is free to put a server in front of `Agent`.

pub mod config_loader;
pub mod debug_log;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ac_domain::cancel::CancelToken;
use ac_domain::config::Config;
use ac_domain::error::{CoreError, Result};
use ac_domain::event::Event;
use ac_domain::tool::{ChainInput, ChainOutput, RunConfig};
use ac_driver::{Driver, RunContext};
use ac_eventbus::{EventBus, Subscriber};
use ac_llm::{DefaultKind, LlmProvider, ModelRegistry};
use ac_questions::QuestionChannel;
use ac_store::ConversationStore;
use ac_tool_registry::{Tool, ToolRegistry};

use crate::debug_log::DebugRunRecorder;

/// Construction-time options for [`Agent::new`].
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub config_path: Option<PathBuf>,
    pub system_prompt_override: Option<String>,
    pub max_iterations: Option<u32>,
}

/// The facade itself: one per running agent instance, built once at
/// startup and shared behind an `Arc` by callers that need to run more
/// than one query concurrently against the same wiring.
pub struct Agent {
    config: Config,
    store: Arc<ConversationStore>,
    tools: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    questions: Arc<QuestionChannel>,
    models: Arc<ModelRegistry>,
    cancel: CancelToken,
    default_max_iterations: u32,
    system_prompt_override: Option<String>,
}

impl Agent {
    /// Build a fully wired agent from `options`. Fails only on config load
    /// or model-registry construction errors (spec §7: "Errors during
    /// config load cause `new` to fail").
    pub fn new(options: AgentOptions) -> Result<Self> {
        let config = crate::config_loader::load(options.config_path.as_deref())?;

        let models = Arc::new(ModelRegistry::from_config(&config.models)?);

        let agent = Self {
            config,
            store: Arc::new(ConversationStore::new()),
            tools: Arc::new(ToolRegistry::new()),
            events: Arc::new(EventBus::new(ac_eventbus::DEFAULT_BUFFER)),
            questions: Arc::new(QuestionChannel::default()),
            models,
            cancel: CancelToken::new(),
            default_max_iterations: options.max_iterations.unwrap_or_else(|| RunConfig::default().max_iterations),
            system_prompt_override: options.system_prompt_override,
        };

        agent.register_configured_tools()?;
        Ok(agent)
    }

    /// Register the built-in reference tools named in `config.tools`,
    /// applying each entry's `enabled`/`post_prompt` override.
    fn register_configured_tools(&self) -> Result<()> {
        self.register_tool(Arc::new(ac_demo_tools::EchoTool::default()), None)?;
        self.register_tool(Arc::new(ac_demo_tools::ShellExecTool::default()), None)?;

        for (name, cfg) in &self.config.tools {
            if !cfg.enabled {
                self.tools.set_enabled(name, false)?;
            }
        }
        Ok(())
    }

    /// Register an additional tool at runtime (spec §6: `registerTool`).
    pub fn register_tool(&self, tool: Arc<dyn Tool>, post_prompt: Option<String>) -> Result<()> {
        self.tools.register(tool, post_prompt)
    }

    /// Replace the event bus this agent publishes to (spec §6: `setEventBus`).
    ///
    /// Takes effect for runs started after the call; a run already using
    /// the prior bus keeps using it.
    pub fn set_event_bus(&mut self, bus: Arc<EventBus>) {
        self.events = bus;
    }

    /// Subscribe to this agent's event stream (spec §6: `subscribe`).
    pub fn subscribe(&self) -> Subscriber {
        self.events.subscribe()
    }

    /// Request cancellation of any run currently in progress.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn conversation_store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn question_channel(&self) -> &Arc<QuestionChannel> {
        &self.questions
    }

    /// Shortcut (spec §6: `run`): no interruption channel, default
    /// per-run settings resolved from config and construction options.
    pub async fn run(&self, query: impl Into<String>) -> Result<ChainOutput> {
        self.execute(ChainInput {
            query: query.into(),
            interruptions: None,
            run_config: self.default_run_config(None),
        })
        .await
    }

    /// Full entry point (spec §6: `execute`): caller supplies the query,
    /// an optional interruption channel, and per-run settings.
    pub async fn execute(&self, input: ChainInput) -> Result<ChainOutput> {
        let llm = self.resolve_model()?;

        let debug_recorder = self
            .config
            .app
            .debug_logs
            .enabled
            .then(|| self.spawn_debug_recorder(&input.query));

        let run_ctx = RunContext {
            store: self.store.clone(),
            tools: self.tools.clone(),
            events: self.events.clone(),
            questions: self.questions.clone(),
            llm,
            cancel: self.cancel.clone(),
        };

        let driver = Driver::new(run_ctx);
        let result = driver.run(input).await;

        if let Some(handle) = debug_recorder {
            let _ = handle.await;
        }

        result
    }

    fn resolve_model(&self) -> Result<Arc<dyn LlmProvider>> {
        self.models
            .resolve_default(DefaultKind::Chat)
            .map_err(|_| CoreError::ModelNotFound("models.default_chat".into()))
    }

    /// Spawn the background task that drains this run's own event
    /// subscriber into a [`DebugRunRecorder`], stopping itself once it
    /// observes the run's terminal `Done`/`Error` event (spec §8: "exactly
    /// one of Done/Error is the final event").
    fn spawn_debug_recorder(&self, query: &str) -> tokio::task::JoinHandle<()> {
        let mut subscriber = self.events.subscribe();
        let store = self.store.clone();
        let cfg = self.config.app.debug_logs.clone();
        let (model_label, temperature, max_tokens) = self.debug_model_metadata();
        let query = query.to_string();

        tokio::spawn(async move {
            let mut recorder = DebugRunRecorder::new(cfg, query, model_label, temperature, max_tokens);
            let mut final_answer = None;

            while let Some(event) = subscriber.recv().await {
                let messages_count = store.history().len();
                let terminal = matches!(event, Event::Done { .. } | Event::Error { .. });
                if let Event::Done { content, .. } = &event {
                    final_answer = Some(content.clone());
                }
                recorder.observe(&event, messages_count);
                if terminal {
                    break;
                }
            }

            if let Err(e) = recorder.finish(final_answer) {
                tracing::warn!(error = %e, "failed to write debug log");
            }
        })
    }

    /// Whether the resolved `default_chat` model allows concurrent tool-call
    /// dispatch (spec §4.7's "provider and `opts.parallel_tool_calls` both
    /// allow it"); false when no default chat model is configured.
    fn default_chat_parallel_tool_calls(&self) -> bool {
        self.config
            .models
            .default_chat
            .as_deref()
            .and_then(|alias| self.config.models.definitions.get(alias))
            .map(|def| def.parallel_tool_calls)
            .unwrap_or(false)
    }

    fn debug_model_metadata(&self) -> (String, f32, u32) {
        let alias = self.config.models.default_chat.as_deref();
        match alias.and_then(|a| self.config.models.definitions.get(a).map(|def| (a, def))) {
            Some((alias, def)) => (format!("{alias}:{}", def.model_name), def.temperature, def.max_tokens),
            None => ("unknown".to_string(), 0.7, 4096),
        }
    }

    /// Build the `RunConfig` a bare `run`/CLI call uses: chain overrides
    /// (if a chain name is given) layered under construction-time
    /// overrides, per spec §6's `chains.<name>` config group.
    pub fn default_run_config(&self, chain: Option<&str>) -> RunConfig {
        let mut cfg = RunConfig {
            max_iterations: self.default_max_iterations,
            system_prompt_override: self.system_prompt_override.clone(),
            streaming: self.config.app.streaming.enabled,
            parallel_tool_calls: self.default_chat_parallel_tool_calls(),
            ..RunConfig::default()
        };

        if let Some(chain_cfg) = chain.and_then(|name| self.config.chains.get(name)) {
            if let Some(max_iterations) = chain_cfg.max_iterations {
                cfg.max_iterations = max_iterations;
            }
            if let Some(timeout_secs) = chain_cfg.timeout_secs {
                cfg.timeout = Some(Duration::from_secs(timeout_secs));
            }
        }

        cfg
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_an_empty_config_when_no_path_given() {
        let agent = Agent::new(AgentOptions::default()).unwrap();
        assert!(agent.config().models.definitions.is_empty());
        assert_eq!(agent.default_max_iterations, RunConfig::default().max_iterations);
    }

    #[test]
    fn run_config_picks_up_chain_overrides() {
        let options = AgentOptions { max_iterations: Some(10), ..Default::default() };
        let mut agent = Agent::new(options).unwrap();
        agent.config.chains.insert(
            "fast".to_string(),
            ac_domain::config::ChainConfig { timeout_secs: Some(5), max_iterations: Some(3) },
        );

        let cfg = agent.default_run_config(Some("fast"));
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn run_config_falls_back_to_default_max_iterations_without_a_chain() {
        let agent = Agent::new(AgentOptions { max_iterations: Some(7), ..Default::default() }).unwrap();
        let cfg = agent.default_run_config(None);
        assert_eq!(cfg.max_iterations, 7);
    }

    #[test]
    fn echo_and_shell_exec_tools_are_registered_by_default() {
        let agent = Agent::new(AgentOptions::default()).unwrap();
        let defs = agent.tool_registry().definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"shell_exec"));
    }
}
