//! `ac-agent-cli`: reference command-line entry point for the Agent
//! Execution Core.
//!
//! Grounded on `sa_gateway::cli::Cli`/`main()`'s exit-code handling
//! (`std::process::exit(1)` on failure paths), trimmed to the one
//! positional-query / `-config` / `-timeout` surface spec §6 names; the
//! teacher's `serve`/`doctor`/`config`/`login` subcommands have no
//! counterpart in this core (no HTTP server, no secret storage here).

use std::path::PathBuf;
use std::time::Duration;

use ac_agent::{Agent, AgentOptions};
use ac_domain::tool::ChainInput;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ac-agent-cli", about = "Run a single query through the Agent Execution Core")]
struct Cli {
    /// The query to send to the agent. May also be given with `-query`.
    #[arg(index = 1)]
    query_positional: Option<String>,

    #[arg(long = "query")]
    query_flag: Option<String>,

    #[arg(long = "config")]
    config: Option<PathBuf>,

    #[arg(long = "timeout")]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let query = match cli.query_flag.or(cli.query_positional) {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            eprintln!("error: a query is required (positional argument or -query)");
            std::process::exit(1);
        }
    };

    let result = run(query, cli.config, cli.timeout).await;
    match result {
        Ok(answer) => {
            println!("{answer}");
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(query: String, config_path: Option<PathBuf>, timeout_secs: Option<u64>) -> anyhow::Result<String> {
    let agent = Agent::new(AgentOptions { config_path, ..Default::default() })?;

    let mut run_config = agent.default_run_config(None);
    if let Some(secs) = timeout_secs {
        run_config.timeout = Some(Duration::from_secs(secs));
    }

    let output = agent
        .execute(ChainInput { query, interruptions: None, run_config })
        .await?;

    Ok(output.final_text)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ac_agent=debug")))
        .init();
}
