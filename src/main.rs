use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use braid_core::config::BraidConfig;
use braid_core::error::BraidError;
use braid_core::event::{types, EventBus};
use braid_core::value::Value;
use braid_graph::{GraphExecutor, GraphRegistry, InMemoryEntities, LogicGraph};

#[derive(Parser)]
#[command(name = "braid", version, about = "Logic graph runtime for entity behavior scripts")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "braid.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate graph documents and list every violation
    Validate {
        /// Graph JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Load a graph for one entity and trigger a signal
    Run {
        /// Graph JSON file
        graph: PathBuf,
        /// Entity that owns the graph
        #[arg(long, default_value = "entity")]
        entity: String,
        /// Signal to trigger
        #[arg(long, default_value = types::START)]
        signal: String,
        /// Event data as JSON
        #[arg(long)]
        data: Option<String>,
        /// Graph files made available to SubGraph nodes
        #[arg(long = "subgraph")]
        subgraphs: Vec<PathBuf>,
        /// Override the configured PRNG seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show effective configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "braid", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = BraidConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Validate { files } => validate(&files),
        Commands::Run {
            graph,
            entity,
            signal,
            data,
            subgraphs,
            seed,
        } => {
            if let Some(seed) = seed {
                config.runtime.seed = seed;
            }
            run(&config, &graph, &entity, &signal, data.as_deref(), &subgraphs).await
        }
        Commands::Config => {
            println!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }
}

fn validate(files: &[PathBuf]) -> anyhow::Result<()> {
    let mut failed = 0;
    for path in files {
        match LogicGraph::load(path).and_then(|g| g.check().map(|_| g)) {
            Ok(graph) => println!(
                "ok    {} ({}: {} nodes, {} edges)",
                path.display(),
                graph.graph_id,
                graph.nodes.len(),
                graph.edges.len()
            ),
            Err(BraidError::GraphLoad { graph_id, violations }) => {
                failed += 1;
                println!("FAIL  {} ({})", path.display(), graph_id);
                for violation in violations {
                    println!("  - {}", violation);
                }
            }
            Err(e) => {
                failed += 1;
                println!("FAIL  {}: {}", path.display(), e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} graph(s) failed validation", failed, files.len());
    }
    Ok(())
}

fn load_graph(path: &Path) -> anyhow::Result<LogicGraph> {
    LogicGraph::load(path).with_context(|| format!("loading graph {}", path.display()))
}

async fn run(
    config: &BraidConfig,
    graph_path: &Path,
    entity: &str,
    signal: &str,
    data: Option<&str>,
    subgraph_paths: &[PathBuf],
) -> anyhow::Result<()> {
    let registry = Arc::new(GraphRegistry::new());
    for path in subgraph_paths {
        let runtime = registry.register_graph(load_graph(path)?)?;
        info!(graph_id = %runtime.graph_id(), path = %path.display(), "Registered sub-graph");
    }

    let entities = Arc::new(InMemoryEntities::new());
    let executor = GraphExecutor::new(Arc::new(EventBus::new()))
        .with_config(config.runtime.clone())
        .with_subgraphs(registry)
        .with_entities(entities.clone());
    let runtime = executor.load_graph(entity, load_graph(graph_path)?)?;

    let data = match data {
        Some(json) => {
            let parsed: serde_json::Value =
                serde_json::from_str(json).context("parsing --data as JSON")?;
            Value::from(parsed)
        }
        None => Value::Null,
    };

    let handled = executor.trigger_signal(entity, signal, data).await?;
    if handled == 0 {
        warn!(signal, graph_id = %runtime.graph_id(), "No signal node handles this signal");
    }
    let drained = executor.drain(entity).await?;

    println!("graph:    {}", runtime.graph_id());
    println!("entity:   {}", entity);
    println!("signal:   {} ({} handler(s), {} late watch notice(s))", signal, handled, drained);

    if !runtime.graph().variables.is_empty() {
        println!("variables:");
        for def in &runtime.graph().variables {
            let value = executor.get_variable(entity, &def.name)?;
            let json = serde_json::Value::from(value);
            println!("  {} = {}", def.name, json);
        }
    }

    let positions = entities.positions();
    if !positions.is_empty() {
        println!("positions:");
        for (id, pos) in positions {
            println!("  {} = ({}, {})", id, pos.x, pos.y);
        }
    }

    executor.unload_graph(entity);
    Ok(())
}
