use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use lodestone_core::pipeline::{Ingestor, JsonlConsumer};
use lodestone_core::snapshot::load_snapshot;
use lodestone_core::{InvertedIndex, Metrics, SemanticIndex, SemanticOptions};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Consume crawled documents into the lexical and semantic indexes")]
struct Args {
    /// Transport input: a JSONL file or a directory of JSONL files
    #[arg(long)]
    input: String,
    /// Snapshot file path (empty disables snapshots)
    #[arg(long, default_value = "data/index.snapshot.json")]
    snapshot: String,
    /// Seconds between snapshots (0 disables)
    #[arg(long, default_value_t = 60)]
    snapshot_every_secs: u64,
    /// Hydrate the indexes from an existing snapshot before consuming
    #[arg(long, default_value_t = false)]
    resume: bool,
    /// Embedding dimension
    #[arg(long, default_value_t = 128)]
    dimension: usize,
    /// Number of LSH hyperplanes
    #[arg(long, default_value_t = 24)]
    hyperplanes: usize,
    /// Seed for hyperplane sampling (0 derives one from the clock)
    #[arg(long, default_value_t = 0)]
    seed: i64,
    /// Metrics listen address
    #[arg(long, default_value = "127.0.0.1:9101")]
    metrics_addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let metrics = Arc::new(Metrics::new());
    let index = Arc::new(InvertedIndex::new());
    let semantic = Arc::new(SemanticIndex::new(SemanticOptions {
        dimension: args.dimension,
        hyperplane_count: args.hyperplanes,
        seed: args.seed,
    }));

    if args.resume && !args.snapshot.is_empty() {
        match load_snapshot(Path::new(&args.snapshot)) {
            Ok(docs) => {
                for doc in &docs {
                    index.add_document(doc.clone());
                    semantic.add_document(doc);
                }
                info!(path = %args.snapshot, documents = docs.len(), "snapshot loaded");
            }
            Err(err) => error!(path = %args.snapshot, %err, "snapshot load failed"),
        }
    }

    let listener = tokio::net::TcpListener::bind(&args.metrics_addr).await?;
    info!(addr = %args.metrics_addr, "metrics listening");
    let metrics_app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics.clone());
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, metrics_app).await {
            error!(%err, "metrics server failed");
        }
    });

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    info!(input = %args.input, snapshot = %args.snapshot, "indexer started");
    let ingest = {
        let shutdown = shutdown.clone();
        let index = index.clone();
        let semantic = semantic.clone();
        let metrics = metrics.clone();
        let input = args.input.clone();
        let snapshot = args.snapshot.clone();
        let every = Duration::from_secs(args.snapshot_every_secs);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut consumer = JsonlConsumer::open(&input)?;
            let mut ingestor =
                Ingestor::new(index, Some(semantic), metrics).with_snapshots(&snapshot, every);
            ingestor.run(&mut consumer, &shutdown)?;
            // One last write so a clean drain is never lost.
            if let Err(err) = ingestor.snapshot_now() {
                error!(%err, "final snapshot failed");
            }
            Ok(())
        })
    };

    ingest.await??;
    info!("indexer shutdown");
    Ok(())
}

async fn render_metrics(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.render()
}
