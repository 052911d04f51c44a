//! Demo CLI over the coordination engine and ledger: runs a small
//! multi-agent negotiation end to end and lets you inspect the resulting
//! chain. There is no persistence between invocations — every subcommand
//! bootstraps its own fresh registry, ledger, and demo negotiation, the way
//! the library crates themselves are meant to be composed by a caller.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coord_agents::testing::StubAgent;
use coord_agents::AgentRegistry;
use coord_engine::{CoordinationEngine, CoordinationResult, EngineConfig, ScenarioSpec};
use coord_ledger::{Ledger, LedgerConfig};
use serde_json::json;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "coord-node", about = "Coordination engine and ledger demo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo negotiation between three stub agents and print the
    /// resulting session, in full.
    Demo,
    /// Inspect the ledger produced by a freshly run demo negotiation.
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Print block/transaction counts and whether the chain is valid.
    Stats,
    /// Walk the chain and report any integrity violation.
    Validate,
    /// Print one block by index.
    Show { index: u64 },
    /// Corrupt a committed block's transaction amount in place, then
    /// re-validate, to demonstrate that tampering is detected.
    Tamper { index: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("coord_cli=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo => {
            let (_, result) = run_demo().await?;
            print_session(&result);
        }
        Commands::Ledger { command } => {
            let (ledger, result) = run_demo().await?;
            print_session(&result);
            println!();
            match command {
                LedgerCommands::Stats => {
                    let stats = ledger.stats().await;
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                LedgerCommands::Validate => {
                    let report = ledger.validate().await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                LedgerCommands::Show { index } => {
                    let block = ledger.get_block(index).await.context("fetching block")?;
                    println!("{}", serde_json::to_string_pretty(&block)?);
                }
                LedgerCommands::Tamper { index } => {
                    ledger.debug_tamper_block(index).await.context("tampering with block")?;
                    let report = ledger.validate().await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
    }

    Ok(())
}

/// Registers `SC` (initiator), `FIN` (budget reviewer), `FAC` (storage
/// reviewer), and runs the same negotiation as the library's "storage
/// bounded agreement" scenario: `SC` wants 1000 units at $2.00, `FIN` has
/// $2000 to spend, `FAC` has room for 800.
async fn run_demo() -> Result<(Arc<Ledger>, CoordinationResult)> {
    let registry = Arc::new(AgentRegistry::new());
    registry.register(Arc::new(StubAgent::initiator("SC"))).await;
    registry.register(Arc::new(StubAgent::budget_reviewer("FIN"))).await;
    registry.register(Arc::new(StubAgent::storage_reviewer("FAC"))).await;

    let ledger = Arc::new(Ledger::new(LedgerConfig::default()));
    let engine = CoordinationEngine::new(registry, Arc::clone(&ledger), EngineConfig::default());

    let spec = ScenarioSpec {
        initiator: "SC".to_string(),
        participants: vec!["SC".to_string(), "FIN".to_string(), "FAC".to_string()],
        intent: "restock supplies".to_string(),
        context: json!({
            "required_quantity": 1000.0,
            "price_per_unit": 2.00,
            "budget_remaining": 2000.0,
            "storage_available": 800.0,
        }),
    };

    let result = engine.coordinate(spec).await;
    Ok((ledger, result))
}

fn print_session(result: &CoordinationResult) {
    println!(
        "{}",
        serde_json::to_string_pretty(&result.session).unwrap_or_else(|_| "<unserializable session>".to_string())
    );
}
