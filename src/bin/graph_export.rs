use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use star_schema::query::SqlBuilder;
use star_schema::{SchemaGraph, SelectRequest, StarSchemaConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-graph-export")]
#[command(about = "Inspect a star schema topology: tree, DOT graph, join plans and SQL")]
struct Cli {
    /// Topology file (.json or .toml)
    topology: PathBuf,

    /// Configuration file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detach this table before running the command
    #[arg(long)]
    detach: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the join tree
    Tree,
    /// Export the graph in GraphViz DOT format
    Dot {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the join plan for some columns as JSON
    Plan {
        /// `table.column`, `table.*` or table names
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Print the SELECT statement for some columns
    Sql {
        /// `table.column`, `table.*` or table names
        #[arg(required = true)]
        columns: Vec<String>,

        /// One clause per line
        #[arg(long)]
        pretty: bool,
    },
    /// Print the topology fingerprint
    Fingerprint,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let config = StarSchemaConfig::load_from(config_path.as_deref()).context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut graph = SchemaGraph::from_path(&cli.topology, &config.build)
        .with_context(|| format!("failed to build schema from {}", cli.topology.display()))?;

    if let Some(name) = &cli.detach {
        graph = graph.detach(name)?;
    }

    match cli.command {
        Command::Tree => print!("{}", graph),
        Command::Dot { output } => {
            let dot = graph.to_dot();
            match output {
                Some(path) => {
                    std::fs::write(&path, dot).with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Exported DOT to: {}", path.display());
                }
                None => print!("{}", dot),
            }
        }
        Command::Plan { columns } => {
            let plan = graph.plan_for(&SelectRequest::from_names(&columns))?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Sql { columns, pretty } => {
            let mut render = config.render;
            render.pretty |= pretty;
            let statement = graph.select_with(&SqlBuilder::new(render), &SelectRequest::from_names(&columns))?;
            println!("{}", statement);
        }
        Command::Fingerprint => println!("{}", graph.fingerprint()),
    }

    Ok(())
}
