use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rksv::{Coordinator, ServiceRegistry, config};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rksv", version)]
#[command(about = "Run, watch and restart local services", long_about = None)]
struct Cli {
    /// Config file to use instead of ./rksv.yaml, ./rksv.yml or ./.rksv/
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run services by name or tag, or every non-skipped service")]
    Run {
        #[arg(value_name = "NAME_OR_TAG")]
        selectors: Vec<String>,
    },
    #[command(about = "List available services and tags")]
    List,
}

fn print_usage(registry: &ServiceRegistry) {
    println!("Services available:");
    for service in registry.services() {
        println!(" - {}", service.name);
    }
    let mut tags = registry.tags().peekable();
    if tags.peek().is_some() {
        println!("Tags available:");
        for tag in tags {
            println!(" - {tag}");
        }
    }
    println!("Usage: rksv run");
    println!("Or: rksv run <name-or-tag> [<name-or-tag> ...]");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let configs = config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let registry = ServiceRegistry::new(config::resolve(&configs)?);

    match cli.command.unwrap_or(Commands::List) {
        Commands::List => print_usage(&registry),
        Commands::Run { selectors } => {
            let selection = registry.select(selectors.as_slice())?;
            let coordinator = Coordinator::new(&registry)?;
            if let Err(e) = coordinator.run(&selection).await {
                error!("{e:#}");
                coordinator.shutdown(&selection).await;
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
