//! gantry CLI
//!
//! Plans and runs test inventories produced by test discovery.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod harness;
mod render;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use gantry_core::{GantryConfig, TestInventory};
use gantry_plan::{PlanOptions, TestFilter};
use gantry_runtime::Orchestrator;
use harness::ProcessHarness;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "gantry - dependency-aware, admission-controlled test orchestration", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PlanArgs {
    /// Test inventory (JSON) produced by discovery
    #[arg(short, long)]
    inventory: PathBuf,
    /// Strategy name, defaults to the configured strategy
    #[arg(short, long)]
    strategy: Option<String>,
    /// Filter, `unit` or `type=api,pattern=routes/,tag=fast,max-duration=5000`
    #[arg(short, long = "filter")]
    filters: Vec<TestFilter>,
    /// Changed file, consulted by smart-selection
    #[arg(long = "changed")]
    changed: Vec<PathBuf>,
}

impl PlanArgs {
    fn options(&self) -> PlanOptions {
        PlanOptions {
            strategy: self.strategy.clone(),
            filters: self.filters.clone(),
            changed_files: self.changed.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build and print an execution plan
    Plan {
        #[command(flatten)]
        plan: PlanArgs,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan, then run every test as `<command> <test file>`
    Run {
        #[command(flatten)]
        plan: PlanArgs,
        /// Command each test file is appended to
        #[arg(long)]
        command: String,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available strategies
    Strategies,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gantry=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = GantryConfig::resolve(cli.config.as_deref()).wrap_err("invalid configuration")?;

    match cli.command {
        Commands::Strategies => {
            render::strategies(&config.planner.default_strategy);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan { plan, json } => {
            let inventory = load_inventory(&plan)?;
            let orchestrator = Orchestrator::new(config);
            let built = orchestrator.plan(&inventory, &plan.options())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&built)?);
            } else {
                render::plan(&built);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { plan, command, json } => {
            let harness = ProcessHarness::parse(&command).ok_or_else(|| eyre!("--command must not be empty"))?;
            let inventory = load_inventory(&plan)?;
            run(config, &inventory, &plan.options(), harness, json).await
        }
    }
}

fn load_inventory(args: &PlanArgs) -> Result<TestInventory> {
    TestInventory::load(&args.inventory)
        .wrap_err_with(|| format!("cannot load inventory {}", args.inventory.display()))
}

async fn run(
    config: GantryConfig,
    inventory: &TestInventory,
    options: &PlanOptions,
    harness: ProcessHarness,
    json: bool,
) -> Result<ExitCode> {
    let orchestrator = Orchestrator::new(config);
    let plan = orchestrator.plan(inventory, options)?;
    if plan.is_empty() {
        println!("{}", console::style("no tests matched").yellow());
        return Ok(ExitCode::SUCCESS);
    }
    orchestrator.start()?;

    let progress = ProgressBar::new(plan.summary.total_tests as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    let bar = progress.clone();
    orchestrator.monitor().on_test_completed(move |event| {
        bar.inc(1);
        bar.set_message(event.test_id.to_string());
    });

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, letting running tests finish");
            token.cancel();
        }
    });

    let outcome = orchestrator.run(&plan, Arc::new(harness)).await?;
    progress.finish_and_clear();
    let report = orchestrator.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render::outcome(&outcome);
        render::report(&report);
    }

    if outcome.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::TestType;

    #[test]
    fn test_parse_plan_args() {
        let cli = Cli::try_parse_from([
            "gantry",
            "--config",
            "gantry.toml",
            "plan",
            "--inventory",
            "tests.json",
            "--strategy",
            "smoke",
            "--filter",
            "unit",
            "--filter",
            "type=api,tag=fast",
            "--changed",
            "src/server.js",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("gantry.toml")));
        let Commands::Plan { plan, json } = cli.command else {
            panic!("expected plan");
        };
        assert!(json);
        let options = plan.options();
        assert_eq!(options.strategy.as_deref(), Some("smoke"));
        assert_eq!(options.filters.len(), 2);
        assert_eq!(options.filters[0].test_type, Some(TestType::Unit));
        assert_eq!(options.changed_files, vec![PathBuf::from("src/server.js")]);
    }

    #[test]
    fn test_bad_filter_rejected_by_parser() {
        let parsed = Cli::try_parse_from(["gantry", "plan", "--inventory", "t.json", "--filter", "nosuchtype"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["gantry", "run", "--inventory", "t.json"]).is_err());
        assert!(Cli::try_parse_from(["gantry", "--log-json", "run", "--inventory", "t.json", "--command", "node"]).is_ok());
    }
}
