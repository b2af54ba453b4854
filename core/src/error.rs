use thiserror::Error;

/// Failures surfaced by the snapshot codec. Writers log and keep
/// ingesting; a failed load aborts hydration and is returned to the
/// caller.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures surfaced by the transport layer. A decode failure applies to
/// a single record and is skipped by consumers; I/O failures end the
/// stream.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport io: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport decode: {0}")]
    Decode(#[from] serde_json::Error),
}
