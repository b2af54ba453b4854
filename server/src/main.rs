use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use lodestone_core::pipeline::{DocumentConsumer, Ingestor, JsonlConsumer};
use lodestone_core::snapshot::load_snapshot;
use lodestone_core::{
    InvertedIndex, Metrics, RankerConfig, SearchService, SemanticIndex, SemanticOptions,
};
use lodestone_server::{build_app, AppState};

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Serve ranked search over the hydrated indexes")]
struct Args {
    /// Snapshot file to hydrate from at startup
    #[arg(long, default_value = "data/index.snapshot.json")]
    snapshot: String,
    /// Optional JSONL transport input ingested after the snapshot
    #[arg(long)]
    input: Option<String>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Embedding dimension
    #[arg(long, default_value_t = 128)]
    dimension: usize,
    /// Number of LSH hyperplanes
    #[arg(long, default_value_t = 24)]
    hyperplanes: usize,
    /// Seed for hyperplane sampling (0 derives one from the clock)
    #[arg(long, default_value_t = 0)]
    seed: i64,
    /// Weight applied to BM25 scores
    #[arg(long, default_value_t = 1.0)]
    lexical_weight: f64,
    /// Weight applied to semantic cosine scores
    #[arg(long, default_value_t = 0.65)]
    semantic_weight: f64,
    /// Default number of results per query
    #[arg(long, default_value_t = 10)]
    top_k: usize,
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
    let mut ingestor = Ingestor::new(index.clone(), Some(semantic.clone()), metrics.clone());

    let snapshot_path = Path::new(&args.snapshot);
    if snapshot_path.is_file() {
        match load_snapshot(snapshot_path) {
            Ok(docs) => {
                let count = docs.len();
                for doc in docs {
                    ingestor.apply(doc);
                }
                info!(path = %args.snapshot, documents = count, "snapshot loaded");
            }
            Err(err) => error!(path = %args.snapshot, %err, "snapshot load failed"),
        }
    }

    if let Some(input) = &args.input {
        let input = input.clone();
        let handle = tokio::task::spawn_blocking(move || -> Result<Ingestor> {
            let mut consumer = JsonlConsumer::open(&input)?;
            let shutdown = AtomicBool::new(false);
            ingestor.run(&mut consumer, &shutdown)?;
            consumer.close()?;
            Ok(ingestor)
        });
        ingestor = handle.await??;
        info!(documents = index.document_count(), "transport input ingested");
    }
    drop(ingestor);

    let service = Arc::new(SearchService::with_config(
        index,
        Some(semantic),
        RankerConfig {
            lexical_weight: args.lexical_weight,
            semantic_weight: args.semantic_weight,
            ..RankerConfig::default()
        },
    ));
    let app = build_app(AppState {
        search: service,
        metrics,
        default_top_k: args.top_k,
    });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
