//! Retrieval core for the lodestone search engine.
//!
//! The crate houses the three retrieval subsystems — the lexical
//! [`InvertedIndex`], the random-projection [`SemanticIndex`], and the
//! hybrid [`SearchService`] that fuses their scores — plus the snapshot
//! codec and the ingest pipeline that feeds documents into both indexes.
//!
//! Both indexes serve concurrent readers behind a single reader-writer
//! lock each; query-side accessors hand out copies so callers never hold
//! index state after a call returns.

pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod search;
pub mod semantic;
pub mod snapshot;
pub mod telemetry;
pub mod tokenizer;

pub use document::Document;
pub use error::{PipelineError, SnapshotError};
pub use index::{InvertedIndex, Posting};
pub use pipeline::{DocumentConsumer, DocumentSink, Ingestor};
pub use search::{RankerConfig, SearchHit, SearchService};
pub use semantic::{SemanticIndex, SemanticOptions, SemanticResult};
pub use telemetry::Metrics;
pub use tokenizer::tokenize;
