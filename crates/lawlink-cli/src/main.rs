//! LawLink CLI: resolve legal citations against a law catalog.

mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use lawlink_ai::{EmbeddingBackend, HashingEmbedder, HttpBackend, OnnxBackend};
use lawlink_core::{EngineConfig, LawEntry, normalize_reference};
use lawlink_resolve::LawLink;
use lawlink_store::{CatalogStore, DuckCatalog, load_json, read_catalog_parquet, write_catalog_parquet};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lawlink", version, about = "Resolve legal citations to law descriptions")]
struct Cli {
    /// TOML configuration file (thresholds, timeouts).
    #[arg(long, global = true, env = "LAWLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Law catalog: .json, .parquet, .csv, or .duckdb.
    #[arg(long, global = true, env = "LAWLINK_CATALOG")]
    catalog: Option<PathBuf>,

    /// Directory holding model.onnx and tokenizer.json for semantic matching.
    #[arg(long, global = true, env = "LAWLINK_MODEL_DIR", conflicts_with = "embed_url")]
    model_dir: Option<PathBuf>,

    /// Base URL of a text-embeddings server (POST /embed).
    #[arg(long, global = true, env = "LAWLINK_EMBED_URL")]
    embed_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve references through the exact, fuzzy, and semantic tiers.
    Resolve {
        #[arg(required = true)]
        refs: Vec<String>,

        /// Print `{reference: {description, match_type}}` JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the "Relevant Legal Context" section for a set of references.
    Context {
        #[arg(required = true)]
        refs: Vec<String>,

        /// Descriptions to include (defaults to the configured value).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Build the semantic index for the catalog and report its state.
    Warm,

    /// Catalog inspection and export.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Version, record count, and category breakdown.
    Stats,

    /// Show a single law.
    Show { key: String },

    /// Write the catalog to a Parquet file.
    Export {
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("lawlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let catalog = cli
        .catalog
        .as_deref()
        .context("no catalog given; pass --catalog or set LAWLINK_CATALOG")?;
    let store = Arc::new(open_catalog(catalog)?);

    match cli.command {
        Command::Catalog { action } => run_catalog(action, &store),
        Command::Resolve { refs, json } => {
            let engine = LawLink::new(store, select_backend(&cli.model_dir, &cli.embed_url)?, config);
            let batch = engine.law_info(&refs).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&batch)?);
            } else {
                display::print_resolutions(&batch)?;
            }
            Ok(())
        }
        Command::Context { refs, top_k } => {
            let engine = LawLink::new(store, select_backend(&cli.model_dir, &cli.embed_url)?, config);
            let text = engine.context_text(&refs, top_k).await;
            if text.is_empty() {
                eprintln!("No references resolved; no context.");
            } else {
                println!("{}", text.trim_start());
            }
            Ok(())
        }
        Command::Warm => {
            let engine = LawLink::new(store, select_backend(&cli.model_dir, &cli.embed_url)?, config);
            let start = Instant::now();
            let state = engine.warm().await;
            println!("{state:?} in {:.2}s", start.elapsed().as_secs_f64());
            Ok(())
        }
    }
}

fn run_catalog(action: CatalogAction, store: &CatalogStore) -> anyhow::Result<()> {
    let snapshot = store.snapshot();
    match action {
        CatalogAction::Stats => display::print_catalog_stats(&snapshot),
        CatalogAction::Show { key } => {
            let key = normalize_reference(&key);
            match snapshot.get(&key) {
                Some(record) => display::print_law_card(record),
                None => bail!("no law with key {key:?} in the catalog"),
            }
        }
        CatalogAction::Export { out } => {
            let rows = write_catalog_parquet(&snapshot, &out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {rows} laws to {}", out.display());
        }
    }
    Ok(())
}

/// Load catalog rows by file extension and publish them as version 1.
fn open_catalog(path: &Path) -> anyhow::Result<CatalogStore> {
    let start = Instant::now();
    let entries = read_entries(path).with_context(|| format!("loading catalog {}", path.display()))?;
    let (store, report) = CatalogStore::from_entries(entries);
    if report.malformed > 0 {
        warn!(malformed = report.malformed, "skipped malformed catalog rows");
    }
    info!(
        records = report.accepted,
        duplicates = report.duplicates,
        elapsed_ms = start.elapsed().as_millis() as u64,
        path = %path.display(),
        "catalog loaded"
    );
    Ok(store)
}

fn read_entries(path: &Path) -> anyhow::Result<Vec<LawEntry>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let entries = match ext.as_deref() {
        Some("json") => load_json(path)?,
        Some("parquet") => read_catalog_parquet(path)?,
        Some("csv") => {
            let db = DuckCatalog::open()?;
            db.load_csv(path)?;
            db.entries()?
        }
        Some("duckdb") | Some("db") => {
            let db = DuckCatalog::open_persistent(path)?;
            if !db.has_laws() {
                bail!("{} has no laws table", path.display());
            }
            db.entries()?
        }
        _ => bail!(
            "unsupported catalog format {}; expected .json, .parquet, .csv, or .duckdb",
            path.display()
        ),
    };
    Ok(entries)
}

/// ONNX model if given, else an embedding server, else the hashing embedder.
fn select_backend(
    model_dir: &Option<PathBuf>,
    embed_url: &Option<String>,
) -> anyhow::Result<Arc<dyn EmbeddingBackend>> {
    if let Some(dir) = model_dir {
        let backend = OnnxBackend::load(dir)
            .with_context(|| format!("loading embedding model from {}", dir.display()))?;
        return Ok(Arc::new(backend));
    }
    if let Some(url) = embed_url {
        info!(url = %url, "using remote embedding server");
        return Ok(Arc::new(HttpBackend::new(url.clone())));
    }
    info!("no embedding model configured; semantic tier uses the hashing embedder");
    Ok(Arc::new(HashingEmbedder::default()))
}
