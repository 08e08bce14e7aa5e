use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use orgweave::config::StudioSettings;
use orgweave::forest::ForestStore;
use orgweave::snapshot::{FileStorage, load_or_default};
use orgweave::studio::run_studio;

#[derive(Debug, Parser)]
#[command(name = "orgweave", about = "Drag-and-drop organization chart studio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Launch the interactive chart studio.
    Studio,
    /// Print a summary of the stored chart.
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let settings = StudioSettings::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Studio => run_studio(&settings)?,
        Commands::Inspect => run_inspect(&settings),
    }

    Ok(())
}

fn run_inspect(settings: &StudioSettings) {
    let storage = FileStorage::new(&settings.storage_path);
    let store = load_or_default(&storage);
    print_forest_summary(&store);
}

fn print_forest_summary(store: &ForestStore) {
    println!("Positions: {}", store.positions().len());
    for position in store.positions() {
        println!("  [{}] {}", position.code, position.name);
    }

    println!("Levels: {}", store.levels().len());
    for level in store.levels() {
        println!(
            "  Level {}: {} node(s)",
            level.level_number,
            level.nodes.len()
        );
        for node in &level.nodes {
            match &node.parent_id {
                Some(parent_id) => {
                    let parent_name = store
                        .get_node_by_id(parent_id)
                        .map(|parent| parent.position_name.as_str())
                        .unwrap_or("?");
                    println!("    {} <- {}", node.position_name, parent_name);
                }
                None => println!("    {} (root)", node.position_name),
            }
        }
    }

    println!("Nodes: {}", store.org_nodes().len());
}

fn init_tracing() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,orgweave=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}
