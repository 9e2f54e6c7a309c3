use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use leann_core::config::MemoryConfig;
use leann_core::document::{Metadata, MetadataValue};
use leann_core::embedding::HashingEmbedder;
use leann_core::hnsw::DistanceMetric;
use leann_core::LeannSourceAdapter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIMENSION: usize = 384;

#[derive(Parser)]
#[command(name = "leann", about = "Local vector memory with hub caching and recompute")]
struct Args {
    /// Vector file; content is kept next to it in `<store>.content`
    #[arg(short, long, env = "LEANN_STORE", default_value = "memory.leann")]
    store: PathBuf,

    /// JSON config file (missing fields take defaults)
    #[arg(short, long, env = "LEANN_CONFIG")]
    config: Option<PathBuf>,

    /// Embedding dimension; overrides the config file (default 384)
    #[arg(long)]
    dimension: Option<usize>,

    /// Distance metric: cosine, euclidean, dot or manhattan
    #[arg(long)]
    metric: Option<String>,

    /// Per-call search budget in milliseconds (defaults to the config's)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Emit JSON log lines instead of human-readable ones
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index files (one entry per file) or inline text, then save the store
    Index {
        paths: Vec<PathBuf>,

        /// Inline text to index in addition to any files
        #[arg(short, long)]
        text: Option<String>,

        /// Metadata as key=value, repeatable
        #[arg(short, long)]
        meta: Vec<String>,
    },
    /// Search the store with a text query
    Search {
        query: String,

        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },
    /// Print index and cache statistics
    Stats,
    /// Delete vectors by ID and save the store
    Delete { ids: Vec<String> },
}

fn parse_meta(pairs: &[String]) -> anyhow::Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("metadata must be key=value, got {pair:?}");
        };
        let value = if let Ok(i) = value.parse::<i64>() {
            MetadataValue::Integer(i)
        } else if let Ok(f) = value.parse::<f64>() {
            MetadataValue::Float(f)
        } else if let Ok(b) = value.parse::<bool>() {
            MetadataValue::Boolean(b)
        } else {
            MetadataValue::String(value.to_string())
        };
        metadata.insert(key.to_string(), value);
    }
    Ok(metadata)
}

fn load_config(args: &Args) -> anyhow::Result<MemoryConfig> {
    let mut config = match &args.config {
        Some(path) => MemoryConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MemoryConfig::with_dimension(args.dimension.unwrap_or(DEFAULT_DIMENSION)),
    };
    if let Some(dimension) = args.dimension {
        config.dimension = dimension;
    }
    if let Some(metric) = &args.metric {
        config.hnsw.distance_metric = metric.parse::<DistanceMetric>()?;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("leann_core=info,leann=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = load_config(&args)?;
    let provider = Arc::new(HashingEmbedder::new(config.dimension)?);
    let adapter = LeannSourceAdapter::new(config, provider)?;
    if adapter.load(&args.store).await? {
        tracing::info!(store = ?args.store, vectors = adapter.count(), "store opened");
    }

    match &args.command {
        Command::Index { paths, text, meta } => {
            if paths.is_empty() && text.is_none() {
                bail!("nothing to index: pass file paths or --text");
            }
            let metadata = parse_meta(meta)?;
            let mut ids = Vec::new();
            if let Some(text) = text {
                ids.push(adapter.index(text, metadata.clone()).await?);
            }
            for path in paths {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let mut meta = metadata.clone();
                meta.insert("path".into(), path.display().to_string().into());
                ids.push(adapter.index(&content, meta).await?);
            }
            adapter.save(&args.store).await?;
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        Command::Search { query, top_k } => {
            let response = adapter
                .search_by_text(query, *top_k, args.timeout_ms.map(Duration::from_millis))
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&adapter.stats())?);
        }
        Command::Delete { ids } => {
            let removed = ids.iter().filter(|id| adapter.delete(id)).count();
            adapter.save(&args.store).await?;
            tracing::info!(requested = ids.len(), removed, "delete complete");
        }
    }
    Ok(())
}
