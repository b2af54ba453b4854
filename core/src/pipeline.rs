//! Document transport and ingest.
//!
//! Two small capabilities tie the pieces together: a [`DocumentSink`]
//! consumes finished documents (the crawler's view of the world), and a
//! [`DocumentConsumer`] streams them back out until shutdown (the
//! ingestor's view). The transport between them is a JSONL file of
//! serialized documents; it is at-least-once, and duplicates are
//! absorbed by the indexes' id-keyed upsert.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{PipelineError, SnapshotError};
use crate::index::InvertedIndex;
use crate::semantic::SemanticIndex;
use crate::snapshot::write_snapshot;
use crate::telemetry::Metrics;

/// Encodes a document into its transport record.
pub fn encode_document(doc: &Document) -> Result<Vec<u8>, PipelineError> {
    Ok(serde_json::to_vec(doc)?)
}

/// Decodes a transport record back into a document.
pub fn decode_document(payload: &[u8]) -> Result<Document, PipelineError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Receives parsed documents for downstream indexing.
pub trait DocumentSink: Send + Sync {
    fn consume(&self, doc: Document);
    fn close(&self) {}
}

/// Streams documents to a handler until the input drains or the
/// shutdown flag is raised. Implementations check the flag between
/// documents, never mid-document.
pub trait DocumentConsumer {
    fn consume(
        &mut self,
        shutdown: &AtomicBool,
        handler: &mut dyn FnMut(Document),
    ) -> Result<(), PipelineError>;

    fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Sink that appends transport records to a JSONL file.
pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlSink {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }
}

impl DocumentSink for JsonlSink {
    fn consume(&self, doc: Document) {
        let payload = match encode_document(&doc) {
            Ok(payload) => payload,
            Err(err) => {
                error!(doc_id = %doc.id, %err, "encode document failed");
                return;
            }
        };
        let mut writer = self.writer.lock();
        let wrote = writer.write_all(&payload).is_ok() && writer.write_all(b"\n").is_ok();
        if !wrote {
            error!(doc_id = %doc.id, path = %self.path.display(), "transport write failed");
        }
    }

    fn close(&self) {
        if self.writer.lock().flush().is_err() {
            error!(path = %self.path.display(), "transport flush failed");
        }
    }
}

/// Consumer over a JSONL file, or a directory of `.jsonl`/`.json` files
/// walked in path order. Undecodable lines are logged and skipped; the
/// stream survives them.
pub struct JsonlConsumer {
    inputs: Vec<PathBuf>,
}

impl JsonlConsumer {
    pub fn open(input: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let input = input.as_ref();
        let mut inputs = Vec::new();
        if input.is_dir() {
            for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                let extension = path.extension().and_then(|ext| ext.to_str());
                if path.is_file() && matches!(extension, Some("jsonl") | Some("json")) {
                    inputs.push(path.to_path_buf());
                }
            }
            inputs.sort();
        } else {
            inputs.push(input.to_path_buf());
        }
        Ok(Self { inputs })
    }
}

impl DocumentConsumer for JsonlConsumer {
    fn consume(
        &mut self,
        shutdown: &AtomicBool,
        handler: &mut dyn FnMut(Document),
    ) -> Result<(), PipelineError> {
        for path in &self.inputs {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                if shutdown.load(Ordering::Relaxed) {
                    return Ok(());
                }
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match decode_document(line.as_bytes()) {
                    Ok(doc) => handler(doc),
                    Err(err) => {
                        warn!(path = %path.display(), %err, "skipping undecodable document record");
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-process channel transport; the sink half can be handed to a
/// crawler while the consumer half feeds an ingestor, without touching
/// disk. Used directly by tests.
pub fn channel() -> (ChannelSink, ChannelConsumer) {
    let (sender, receiver) = mpsc::channel();
    (
        ChannelSink {
            sender: Mutex::new(sender),
        },
        ChannelConsumer { receiver },
    )
}

pub struct ChannelSink {
    sender: Mutex<Sender<Document>>,
}

impl DocumentSink for ChannelSink {
    fn consume(&self, doc: Document) {
        // A disconnected consumer means shutdown; nothing to report.
        let _ = self.sender.lock().send(doc);
    }
}

pub struct ChannelConsumer {
    receiver: Receiver<Document>,
}

impl DocumentConsumer for ChannelConsumer {
    fn consume(
        &mut self,
        shutdown: &AtomicBool,
        handler: &mut dyn FnMut(Document),
    ) -> Result<(), PipelineError> {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }
            match self.receiver.recv_timeout(Duration::from_millis(50)) {
                Ok(doc) => handler(doc),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }
}

/// Applies documents to both indexes and writes snapshots on a cadence.
///
/// The lexical index is updated first, then the semantic index; the two
/// updates are not jointly atomic and the search side tolerates the
/// skew. The first applied document triggers the first snapshot;
/// afterwards a snapshot fires once `snapshot_every` has elapsed since
/// the last successful write. A failed write is logged and does not
/// advance the cadence.
pub struct Ingestor {
    index: Arc<InvertedIndex>,
    semantic: Option<Arc<SemanticIndex>>,
    metrics: Arc<Metrics>,
    snapshot_path: Option<PathBuf>,
    snapshot_every: Duration,
    last_snapshot: Option<Instant>,
}

impl Ingestor {
    pub fn new(
        index: Arc<InvertedIndex>,
        semantic: Option<Arc<SemanticIndex>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            index,
            semantic,
            metrics,
            snapshot_path: None,
            snapshot_every: Duration::ZERO,
            last_snapshot: None,
        }
    }

    /// Enables periodic snapshots. An empty path or zero interval leaves
    /// snapshotting disabled.
    pub fn with_snapshots(mut self, path: impl Into<PathBuf>, every: Duration) -> Self {
        let path = path.into();
        if !path.as_os_str().is_empty() && !every.is_zero() {
            self.snapshot_path = Some(path);
            self.snapshot_every = every;
        }
        self
    }

    /// Applies one document to both indexes.
    pub fn apply(&mut self, doc: Document) {
        match &self.semantic {
            Some(semantic) => {
                self.index.add_document(doc.clone());
                semantic.add_document(&doc);
            }
            None => self.index.add_document(doc),
        }
        self.metrics.index_updates.inc();
        self.maybe_snapshot();
    }

    /// Consumes documents until the stream drains or shutdown is
    /// signalled. Indexes stay consistent at whichever document
    /// boundary the signal arrived.
    pub fn run(
        &mut self,
        consumer: &mut dyn DocumentConsumer,
        shutdown: &AtomicBool,
    ) -> Result<(), PipelineError> {
        consumer.consume(shutdown, &mut |doc| self.apply(doc))
    }

    fn maybe_snapshot(&mut self) {
        let Some(path) = self.snapshot_path.clone() else {
            return;
        };
        let due = match self.last_snapshot {
            None => true,
            Some(last) => last.elapsed() >= self.snapshot_every,
        };
        if !due {
            return;
        }
        match write_snapshot(&self.index, &path) {
            Ok(()) => {
                info!(path = %path.display(), "snapshot written");
                self.last_snapshot = Some(Instant::now());
            }
            Err(err) => {
                error!(path = %path.display(), %err, "snapshot write failed");
            }
        }
    }

    /// Forces a snapshot now, if snapshotting is configured. Used for a
    /// final write on clean shutdown.
    pub fn snapshot_now(&mut self) -> Result<(), SnapshotError> {
        if let Some(path) = self.snapshot_path.clone() {
            write_snapshot(&self.index, &path)?;
            self.last_snapshot = Some(Instant::now());
        }
        Ok(())
    }
}

/// In-process direct sink: serializes concurrent producers onto one
/// ingestor.
pub struct IngestSink {
    ingestor: Mutex<Ingestor>,
}

impl IngestSink {
    pub fn new(ingestor: Ingestor) -> Self {
        Self {
            ingestor: Mutex::new(ingestor),
        }
    }
}

impl DocumentSink for IngestSink {
    fn consume(&self, doc: Document) {
        self.ingestor.lock().apply(doc);
    }
}
