use anyhow::{anyhow, Result};
use clap::Parser;
use parking_lot::RwLock;
use reqwest::{header, Client, Url};
use scraper::{Html, Selector};
use sha1::{Digest, Sha1};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lodestone_core::pipeline::{DocumentSink, JsonlSink};
use lodestone_core::{Document, Metrics};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl the web onto the document transport, respecting robots.txt")]
struct Cli {
    /// Path to a file with seed URLs (one per line)
    #[arg(long)]
    seeds: String,
    /// Output JSONL transport file
    #[arg(long, default_value = "./data/crawl.jsonl")]
    output: String,
    /// Maximum number of documents to emit
    #[arg(long, default_value_t = 1_000)]
    max_docs: usize,
    /// Maximum pages to crawl per host
    #[arg(long, default_value_t = 10)]
    max_per_host: usize,
    /// Number of concurrent fetch workers
    #[arg(long, default_value_t = 16)]
    concurrency: usize,
    /// Politeness delay applied by each worker before fetching, in milliseconds
    #[arg(long, default_value_t = 50)]
    politeness_ms: u64,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent string used for robots.txt and page fetches
    #[arg(long, default_value = "lodestone-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// Only follow links that stay on the same host as the page
    #[arg(long, default_value_t = true)]
    same_host_only: bool,
}

#[derive(Debug, Clone, Default)]
struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay_ms: Option<u64>,
}

type RobotsCache = Arc<RwLock<HashMap<String, Robots>>>;

#[derive(Default)]
struct Seen {
    urls: HashSet<String>,
    per_host: HashMap<String, usize>,
}

struct FetchOutcome {
    base: Url,
    doc: Option<Document>,
    links: Vec<Url>,
    failed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    let mut frontier = load_seeds(&args.seeds)?;
    if frontier.is_empty() {
        return Err(anyhow!("no valid seeds"));
    }
    info!(
        seeds = frontier.len(),
        max_docs = args.max_docs,
        concurrency = args.concurrency,
        same_host_only = args.same_host_only,
        output = %args.output,
        "crawler starting"
    );

    let sink = JsonlSink::create(&args.output)?;
    let metrics = Arc::new(Metrics::new());
    let robots_cache: RobotsCache = Arc::new(RwLock::new(HashMap::new()));
    let mut seen = Seen::default();

    let mut emitted = 0usize;
    let mut inflight: Vec<tokio::task::JoinHandle<FetchOutcome>> = Vec::new();

    while emitted < args.max_docs && (!frontier.is_empty() || !inflight.is_empty()) {
        while inflight.len() < args.concurrency
            && !frontier.is_empty()
            && emitted + inflight.len() < args.max_docs
        {
            let url = frontier.pop_front().expect("non-empty frontier");
            if !admit(&mut seen, &url, args.max_per_host) {
                continue;
            }
            inflight.push(tokio::spawn(fetch_page(
                client.clone(),
                robots_cache.clone(),
                url,
                args.user_agent.clone(),
                args.politeness_ms,
            )));
        }

        if inflight.is_empty() {
            break;
        }

        let mut progressed = false;
        let mut i = 0;
        while i < inflight.len() {
            if !inflight[i].is_finished() {
                i += 1;
                continue;
            }
            progressed = true;
            let handle = inflight.swap_remove(i);
            let Ok(outcome) = handle.await else {
                metrics.crawl_errors.inc();
                continue;
            };
            if outcome.failed {
                metrics.crawl_errors.inc();
            }
            for link in outcome.links {
                if args.same_host_only && link.host_str() != outcome.base.host_str() {
                    continue;
                }
                frontier.push_back(link);
            }
            if let Some(doc) = outcome.doc {
                sink.consume(doc);
                metrics.documents_crawled.inc();
                emitted += 1;
                if emitted % 100 == 0 {
                    info!(emitted, visited = seen.urls.len(), frontier = frontier.len(), "progress");
                }
            }
        }
        if !progressed {
            sleep(Duration::from_millis(10)).await;
        }
    }

    sink.close();
    info!(
        emitted,
        errors = metrics.crawl_errors.get(),
        visited = seen.urls.len(),
        frontier = frontier.len(),
        output = %args.output,
        "crawl complete"
    );
    Ok(())
}

fn load_seeds(path: &str) -> Result<VecDeque<Url>> {
    let mut frontier = VecDeque::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parsed = Url::parse(trimmed).or_else(|_| Url::parse(&format!("https://{trimmed}")));
        match parsed {
            Ok(url) => frontier.push_back(url),
            Err(err) => warn!(seed = trimmed, %err, "skipping unparsable seed"),
        }
    }
    Ok(frontier)
}

/// Dedup plus per-host page cap. Called only from the dispatch task.
fn admit(seen: &mut Seen, url: &Url, max_per_host: usize) -> bool {
    let key = normalized(url);
    if seen.urls.contains(&key) {
        return false;
    }
    seen.urls.insert(key);
    if let Some(host) = url.host_str() {
        let count = seen.per_host.entry(host.to_string()).or_insert(0);
        if *count >= max_per_host {
            return false;
        }
        *count += 1;
    }
    true
}

async fn fetch_page(
    client: Client,
    robots: RobotsCache,
    url: Url,
    user_agent: String,
    politeness_ms: u64,
) -> FetchOutcome {
    let mut outcome = FetchOutcome {
        base: url.clone(),
        doc: None,
        links: Vec::new(),
        failed: false,
    };

    if politeness_ms > 0 {
        sleep(Duration::from_millis(politeness_ms)).await;
    }
    if !allowed(&client, &robots, &url, &user_agent).await {
        return outcome;
    }
    if let Some(delay) = crawl_delay(&robots, &url) {
        sleep(Duration::from_millis(delay)).await;
    }

    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = %url, %err, "fetch failed");
            outcome.failed = true;
            return outcome;
        }
    };
    if !response.status().is_success() {
        outcome.failed = true;
        return outcome;
    }
    if let Some(content_type) = response.headers().get(header::CONTENT_TYPE) {
        if let Ok(value) = content_type.to_str() {
            if !value.starts_with("text/html") {
                return outcome;
            }
        }
    }
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(url = %url, %err, "body read failed");
            outcome.failed = true;
            return outcome;
        }
    };
    if bytes.len() > 2 * 1024 * 1024 {
        return outcome;
    }
    let body = String::from_utf8_lossy(&bytes).to_string();

    let (doc, links) = parse_page(&url, &body);
    outcome.doc = Some(doc);
    outcome.links = links;
    outcome
}

/// Extracts title, visible text and hyperlinks; the document id is the
/// sha1 of the normalized URL so re-crawls upsert in place.
fn parse_page(url: &Url, body: &str) -> (Document, Vec<Url>) {
    let sel_title = Selector::parse("title").expect("valid selector");
    let sel_body = Selector::parse("body").expect("valid selector");
    let sel_anchor = Selector::parse("a").expect("valid selector");

    let page = Html::parse_document(body);
    let title = page
        .select(&sel_title)
        .next()
        .map(|node| node.text().collect::<String>())
        .unwrap_or_default()
        .trim()
        .to_string();
    let text = page
        .select(&sel_body)
        .next()
        .map(|node| node.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut links = Vec::new();
    for anchor in page.select(&sel_anchor) {
        if let Some(href) = anchor.value().attr("href") {
            if let Ok(resolved) = Url::parse(href).or_else(|_| url.join(href)) {
                if resolved.scheme().starts_with("http") {
                    links.push(resolved);
                }
            }
        }
    }

    let canonical = normalized(url);
    let mut hasher = Sha1::new();
    hasher.update(canonical.as_bytes());
    let id = format!("{:x}", hasher.finalize());

    let mut doc = Document::new(id, canonical, title, text);
    doc.fetched_at = Some(OffsetDateTime::now_utc());
    (doc, links)
}

fn normalized(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

async fn allowed(client: &Client, cache: &RobotsCache, url: &Url, user_agent: &str) -> bool {
    let Some(host) = url.host_str().map(str::to_string) else {
        return false;
    };
    let cached = { cache.read().get(&host).cloned() };
    let rules = match cached {
        Some(rules) => rules,
        None => {
            let robots_url = format!("{}://{host}/robots.txt", url.scheme());
            let text = match client
                .get(&robots_url)
                .header(header::USER_AGENT, user_agent)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    response.text().await.unwrap_or_default()
                }
                _ => String::new(),
            };
            let parsed = parse_robots(&text);
            cache.write().insert(host, parsed.clone());
            parsed
        }
    };
    path_allowed(url.path(), &rules)
}

fn crawl_delay(cache: &RobotsCache, url: &Url) -> Option<u64> {
    let host = url.host_str()?;
    cache.read().get(host).and_then(|rules| rules.crawl_delay_ms)
}

/// Minimal parser for the `*` user-agent group.
fn parse_robots(text: &str) -> Robots {
    let mut rules = Robots::default();
    let mut active = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "user-agent" => active = value == "*",
            "allow" if active => rules.allows.push(value.to_string()),
            "disallow" if active => rules.disallows.push(value.to_string()),
            "crawl-delay" if active => {
                if let Ok(seconds) = value.parse::<f64>() {
                    rules.crawl_delay_ms = Some((seconds * 1000.0) as u64);
                }
            }
            _ => {}
        }
    }
    rules
}

/// Longest-match precedence between Allow and Disallow rules.
fn path_allowed(path: &str, rules: &Robots) -> bool {
    let best_allow = rules
        .allows
        .iter()
        .filter(|rule| path.starts_with(rule.as_str()))
        .map(|rule| rule.len())
        .max();
    let best_disallow = rules
        .disallows
        .iter()
        .filter(|rule| *rule == "/" || path.starts_with(rule.as_str()))
        .map(|rule| rule.len())
        .max();
    match (best_allow, best_disallow) {
        (Some(allow), Some(disallow)) => allow >= disallow,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}
