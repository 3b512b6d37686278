use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skillflow_core::config::EngineConfig;
use skillflow_engine::{plan, validate, Graph, RunLogger, RunState, SkillEngine, ValidatedGraph};
use skillflow_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "skillflow", version, about = "Deterministic skill workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "skillflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow definition and report every structural problem
    Validate {
        /// Workflow file (.json or .toml)
        file: PathBuf,
    },
    /// Print the execution order of a workflow
    Plan {
        /// Workflow file (.json or .toml)
        file: PathBuf,
    },
    /// Run a workflow, printing each event as a JSON line
    Run {
        /// Workflow file (.json or .toml)
        file: PathBuf,
        /// Input value as JSON
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,
        /// Read the input value from a JSON file
        #[arg(long)]
        input_file: Option<PathBuf>,
        /// Extra tool manifest directories
        #[arg(long = "tools")]
        tools: Vec<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the event stream
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SKILLFLOW_LOG")
                .unwrap_or_else(|_| EnvFilter::new("skillflow=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        EngineConfig::load(&cli.config)?
    } else {
        EngineConfig::default()
    };

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "skillflow", &mut std::io::stdout());
        }
        Commands::Validate { file } => {
            let graph = Graph::load(&file)?;
            let validated = check(&graph)?;
            println!(
                "{}: valid ({} nodes, entry '{}')",
                file.display(),
                graph.nodes.len(),
                validated.entry()
            );
        }
        Commands::Plan { file } => {
            let graph = Graph::load(&file)?;
            let validated = check(&graph)?;
            let plan = plan(&validated);
            print_level(&validated, &plan, plan.order(), "", 0);
        }
        Commands::Run {
            file,
            input,
            input_file,
            tools,
        } => {
            let graph = Graph::load(&file)?;
            let input = read_input(input.as_deref(), input_file.as_deref())?;
            let state = run(&config, graph, input, &tools).await?;
            match state {
                RunState::Completed => {}
                RunState::Cancelled => std::process::exit(130),
                _ => std::process::exit(1),
            }
        }
    }

    Ok(())
}

/// Validate, printing every error to stderr on failure.
fn check(graph: &Graph) -> anyhow::Result<ValidatedGraph> {
    match validate(graph) {
        Ok(v) => Ok(v),
        Err(errors) => {
            for e in &errors {
                eprintln!("[{}] {}", e.kind(), e);
            }
            anyhow::bail!("workflow '{}' has {} problem(s)", graph.id, errors.len())
        }
    }
}

fn print_level(
    graph: &ValidatedGraph,
    plan: &skillflow_engine::Plan,
    order: &[String],
    prefix: &str,
    depth: usize,
) {
    for (i, id) in order.iter().enumerate() {
        let number = format!("{}{}", prefix, i + 1);
        let kind = graph
            .node(id)
            .map(|n| n.kind().as_str())
            .unwrap_or("?");
        println!("{}{}. {} ({})", "   ".repeat(depth), number, id, kind);
        let body = plan.body(id);
        if !body.is_empty() {
            print_level(graph, plan, body, &format!("{}.", number), depth + 1);
        }
    }
}

fn read_input(input: Option<&str>, input_file: Option<&Path>) -> anyhow::Result<Value> {
    if let Some(text) = input {
        return serde_json::from_str(text).context("--input is not valid JSON");
    }
    if let Some(path) = input_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()));
    }
    Ok(Value::Object(Default::default()))
}

async fn run(
    config: &EngineConfig,
    graph: Graph,
    input: Value,
    extra_tool_dirs: &[PathBuf],
) -> anyhow::Result<RunState> {
    let mut registry = ToolRegistry::new();
    for dir in config.tool_dirs().iter().chain(extra_tool_dirs) {
        if dir.is_dir() {
            skillflow_tools::load_and_register_tools(dir, &mut registry);
        } else {
            warn!(path = %dir.display(), "Tool directory not found");
        }
    }
    info!(tools = registry.list().len(), "Tools loaded");

    let engine = SkillEngine::new(Arc::new(registry)).with_config(config.engine.clone());

    // Subscribe before the run starts so the log sees every event
    let log_rx = config.log_dir().map(|dir| (dir, engine.event_bus().subscribe()));
    let mut handle = engine.spawn(graph, input);

    let logger = log_rx.map(|(dir, rx)| {
        let cancel = tokio_util::sync::CancellationToken::new();
        tokio::spawn(RunLogger::new(dir).run(rx, handle.run_id().clone(), cancel))
    });

    // Cancel the run on Ctrl-C; it stops at the next node boundary
    let run_cancel = handle.cancel_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        run_cancel.cancel();
    });

    while let Some(event) = handle.next_event().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    let outcome = handle.wait().await?;
    // Closing the bus lets the logger drain what is left and stop
    drop(engine);

    if let Some(logger) = logger {
        match logger.await {
            Ok(Some(path)) => info!(path = %path.display(), "Run log written"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Run logger task failed"),
        }
    }

    info!(run_id = %outcome.run_id, state = %outcome.state, total_ms = outcome.total_ms, "Run finished");
    Ok(outcome.state)
}
