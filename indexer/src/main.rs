use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docindex::store::Table;
use docindex::{compute_tf_idf, load_manifest, DocumentLoader, Store, Tokenizer};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and rank a TF-IDF inverted index over a page collection", long_about = None)]
struct Cli {
    /// Index database directory
    #[arg(long, global = true, env = "DOCINDEX_DB", default_value = "./DOCINDEX.db")]
    db: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every manifest entry not yet in the database, then rank
    Build {
        /// JSON object mapping document id to url
        #[arg(long, env = "DOCINDEX_MANIFEST", default_value = "./WEBPAGES_RAW/bookkeeping.json")]
        manifest: String,
        /// Directory containing the pages, addressed by document id
        #[arg(long, env = "DOCINDEX_PAGES", default_value = "./WEBPAGES_RAW")]
        pages: String,
    },
    /// Recompute IDF and posting weights only
    Rank,
    /// Print table sizes and the last ranking pass
    Stats,
}

#[derive(Serialize)]
struct Stats {
    documents: usize,
    terms: usize,
    postings: usize,
    needs_ranking: bool,
    ranking: Option<docindex::store::RankingMarker>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let store = Store::open(&cli.db)?;

    match cli.command {
        Commands::Build { manifest, pages } => build_index(store, &manifest, &pages),
        Commands::Rank => {
            let summary = compute_tf_idf(&store)?;
            store.flush()?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Stats => {
            let stats = Stats {
                documents: store.row_count(Table::Documents),
                terms: store.row_count(Table::Terms),
                postings: store.row_count(Table::Postings),
                needs_ranking: store.needs_ranking()?,
                ranking: store.ranking_marker()?,
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

fn build_index(store: Store, manifest: &str, pages: &str) -> Result<()> {
    let entries = load_manifest(manifest)?;
    tracing::info!(entries = entries.len(), manifest, "manifest loaded");

    let interrupt = Arc::new(AtomicBool::new(false));
    watch_interrupt(interrupt.clone())?;

    let loader = DocumentLoader::new(store, Arc::new(Tokenizer::new()), pages).with_interrupt(interrupt);
    let report = loader.run(&entries)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// First Ctrl-C stops ingestion after the current document; ranking still runs.
fn watch_interrupt(flag: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    std::thread::spawn(move || {
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing current document then ranking");
                flag.store(true, Ordering::SeqCst);
            }
        });
    });
    Ok(())
}
