use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use granoloader::graph::{GranoClient, GraphApi, MemoryGraph};
use granoloader::resolve::FileFetcher;
use granoloader::{load_file, Config, Mapping, RowMapper};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "granoloader", version)]
#[command(about = "Import data to grano using CSV files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// grano connection settings; each falls back to config file and environment.
#[derive(Args, Debug)]
struct Connection {
    /// Host name of the grano instance to be loaded
    #[arg(long)]
    host: Option<String>,

    /// Project slug to be loaded
    #[arg(short, long)]
    project: Option<String>,

    /// API key with write access to the project
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Log the calls that would be made instead of contacting the server
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load CSV data into a grano instance using a mapping specification
    Load {
        #[command(flatten)]
        connection: Connection,

        /// Continue loading upon errors
        #[arg(short, long)]
        force: bool,

        /// Number of rows mapped concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Rows buffered between the CSV reader and the workers
        #[arg(long)]
        queue_depth: Option<usize>,

        /// Mapping file (YAML)
        mapping: PathBuf,

        /// Data file (CSV with a header row)
        data: PathBuf,
    },
    /// Create or update schema definitions from YAML files
    Schema {
        #[command(flatten)]
        connection: Connection,

        /// Schema definition files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Command::Load {
            connection,
            force,
            workers,
            queue_depth,
            mapping,
            data,
        } => {
            let mut config = config;
            if force {
                config.load.force = true;
            }
            if let Some(workers) = workers {
                config.load.workers = workers;
            }
            if let Some(depth) = queue_depth {
                config.load.queue_depth = depth;
            }
            run_load(config, connection, &mapping, &data).await
        }
        Command::Schema { connection, files } => run_schema(config, connection, &files).await,
    }
}

/// Pick the graph backend: the grano server, or a recorder for dry runs.
fn connect(config: &mut Config, connection: Connection) -> Result<Arc<dyn GraphApi>> {
    if connection.host.is_some() {
        config.grano.host = connection.host;
    }
    if connection.project.is_some() {
        config.grano.project = connection.project;
    }
    config.validate()?;

    if connection.dry_run {
        log::info!("Dry run: no data is sent to grano");
        return Ok(Arc::new(MemoryGraph::new()));
    }

    let api_key = config.require_remote(connection.api_key)?;
    let host = config.grano.host.clone().unwrap_or_default();
    let project = config.grano.project.clone().unwrap_or_default();
    log::info!("Connecting to {} (project {})", host, project);
    let client = GranoClient::new(&host, &project, &api_key, config.timeout())?;
    Ok(Arc::new(client))
}

async fn run_load(
    mut config: Config,
    connection: Connection,
    mapping_path: &Path,
    data_path: &Path,
) -> Result<()> {
    log::info!("Starting granoloader v{}", env!("CARGO_PKG_VERSION"));

    // Schema problems stop the run before any row is read.
    let mapping = Mapping::load(mapping_path)
        .with_context(|| format!("Invalid mapping {}", mapping_path.display()))?;
    log::info!(
        "Mapping loaded: {} entities, {} relations",
        mapping.entities.len(),
        mapping.relations.len()
    );

    let graph = connect(&mut config, connection)?;
    let fetcher = FileFetcher::new(config.timeout())?;
    let mapper = Arc::new(RowMapper::new(Arc::new(mapping), graph, fetcher));
    let options = config.dispatch_options();

    let start = Instant::now();
    let report = load_file(mapper, data_path, &options).await?;
    let elapsed = start.elapsed();

    log::info!("=== Load Complete ===");
    log::info!("Rows read: {}", report.rows);
    log::info!("Rows loaded: {} (failed: {})", report.loaded, report.failed);
    log::info!("Objects saved: {}", report.objects);
    log::info!("Time: {:?}", elapsed);

    if report.aborted {
        anyhow::bail!(
            "Load aborted: {}",
            report.abort_reason.unwrap_or_else(|| "row failed".to_string())
        );
    }
    if report.failed > 0 {
        log::warn!("Some rows failed to load. Check logs above for details.");
    }
    Ok(())
}

async fn run_schema(mut config: Config, connection: Connection, files: &[PathBuf]) -> Result<()> {
    let graph = connect(&mut config, connection)?;

    for path in files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let doc: serde_json::Value = serde_yaml_ng::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let definitions = match doc {
            serde_json::Value::Array(items) => items,
            single => vec![single],
        };
        for definition in &definitions {
            graph
                .upsert_schema(definition)
                .await
                .with_context(|| format!("Failed to load schema from {}", path.display()))?;
        }
        log::info!("✓ {} ({} schema(s))", path.display(), definitions.len());
    }
    Ok(())
}
