use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Process metrics as an injected capability rather than process
/// globals: each component receives an `Arc<Metrics>` and the HTTP layer
/// renders whatever registry that instance owns.
pub struct Metrics {
    registry: Registry,
    pub documents_crawled: IntCounter,
    pub crawl_errors: IntCounter,
    pub index_updates: IntCounter,
    search_requests: IntCounterVec,
    search_latency: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let documents_crawled = IntCounter::new(
            "crawler_documents_total",
            "Total number of documents successfully crawled.",
        )
        .expect("valid counter opts");
        let crawl_errors = IntCounter::new(
            "crawler_errors_total",
            "Total number of crawl or parse errors.",
        )
        .expect("valid counter opts");
        let index_updates = IntCounter::new(
            "index_updates_total",
            "Number of documents ingested into the indexes.",
        )
        .expect("valid counter opts");
        let search_requests = IntCounterVec::new(
            Opts::new(
                "search_requests_total",
                "Total search requests processed by the API.",
            ),
            &["status"],
        )
        .expect("valid counter opts");
        let search_latency = Histogram::with_opts(HistogramOpts::new(
            "search_latency_seconds",
            "Latency distribution for search requests.",
        ))
        .expect("valid histogram opts");

        registry
            .register(Box::new(documents_crawled.clone()))
            .expect("register crawler_documents_total");
        registry
            .register(Box::new(crawl_errors.clone()))
            .expect("register crawler_errors_total");
        registry
            .register(Box::new(index_updates.clone()))
            .expect("register index_updates_total");
        registry
            .register(Box::new(search_requests.clone()))
            .expect("register search_requests_total");
        registry
            .register(Box::new(search_latency.clone()))
            .expect("register search_latency_seconds");

        Self {
            registry,
            documents_crawled,
            crawl_errors,
            index_updates,
            search_requests,
            search_latency,
        }
    }

    /// Records one search request with its status label and latency.
    pub fn observe_search(&self, status: &str, latency: Duration) {
        self.search_requests.with_label_values(&[status]).inc();
        self.search_latency.observe(latency.as_secs_f64());
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
