use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordination::budget::TracingUsageSink;
use coordination::debate::JsonlObserver;
use coordination::{DebateProtocol, DebateProtocolConfig, QualityTier};
use debate_agents::{EngineConfig, MultiStageOrchestrator};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Routing TOML (prices, hierarchy, limits); overrides DEBATE_ROUTING_CONFIG
    #[arg(long, global = true)]
    routing: Option<PathBuf>,

    /// JSON ledger file; overrides DEBATE_LEDGER_PATH
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full debate on a topic
    Run {
        #[arg(long)]
        topic: String,

        /// File with context signal text
        #[arg(long)]
        context_file: Option<PathBuf>,

        /// Debate protocol TOML
        #[arg(long)]
        config: Option<PathBuf>,

        /// Append every debate event to this JSONL file
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Write the final result as JSON
        #[arg(long)]
        output: Option<PathBuf>,

        /// Seed for agent sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Quality tier for every agent turn (low, normal, high, critical)
        #[arg(long, default_value = "normal")]
        quality: QualityTier,
    },
    /// Print budget status and today's usage
    Budget,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let engine = EngineConfig::default()
        .with_routing_config(args.routing)
        .with_ledger_path(args.ledger);
    let routing = engine.load_routing()?;
    let ledger = Arc::new(engine.build_ledger(routing)?);

    match args.command {
        Command::Budget => {
            let snapshot = ledger.snapshot();
            println!("{}", snapshot.status_line());
            let report = ledger
                .usage_report(snapshot.date)
                .context("Failed to read ledger")?;
            for (key, entry) in report {
                println!(
                    "  {}/{}: {} requests, {} in / {} out, ${:.4}",
                    key.backend,
                    key.model,
                    entry.request_count,
                    entry.input_tokens,
                    entry.output_tokens,
                    entry.cost
                );
            }
        }
        Command::Run {
            topic,
            context_file,
            config,
            transcript,
            output,
            seed,
            quality,
        } => {
            let protocol_config = match &config {
                Some(path) => DebateProtocolConfig::from_file(path)
                    .with_context(|| format!("Failed to load debate config {}", path.display()))?,
                None => DebateProtocolConfig::default(),
            };
            let protocol = DebateProtocol::new(protocol_config)?;

            let context = match &context_file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read context {}", path.display()))?,
                None => String::new(),
            };

            let router = engine
                .build_router(Arc::clone(&ledger))?
                .with_usage_sink(Arc::new(TracingUsageSink));
            for (backend, available) in router.availability().await {
                if !available {
                    warn!(backend = %backend, "Backend not reachable; calls will fall back");
                }
            }

            let mut orchestrator =
                MultiStageOrchestrator::new(Arc::new(router), protocol).with_quality(quality);
            if let Some(seed) = seed {
                orchestrator = orchestrator.with_seed(seed);
            }
            if let Some(path) = &transcript {
                let observer = JsonlObserver::open(path)
                    .with_context(|| format!("Failed to open transcript {}", path.display()))?;
                orchestrator = orchestrator.with_observer(Arc::new(observer));
            }

            let result = orchestrator.run_debate(&topic, &context, None).await?;
            for phase in &result.phases {
                println!("{}", phase.status_line());
            }
            println!("{}", result.summary_line());
            if let Some(plan) = &result.plan {
                println!("\n# Plan ({})\n{}", plan.author_name, plan.content);
            }

            if let Some(path) = &output {
                std::fs::write(path, result.to_json_pretty()?)
                    .with_context(|| format!("Failed to write result {}", path.display()))?;
                info!(path = %path.display(), "Result written");
            }
            println!("{}", ledger.snapshot().status_line());
        }
    }

    Ok(())
}
