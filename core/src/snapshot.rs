//! Serialized view of the document corpus, sufficient to rebuild both
//! indexes on restart. Semantic hyperplanes are deliberately not
//! persisted; the loader's documents are re-embedded under whatever
//! planes the live index carries.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::document::Document;
use crate::error::SnapshotError;
use crate::index::InvertedIndex;

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub documents: Vec<SnapshotDocument>,
}

/// On-disk document entry; lower-case keys, indented JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub content: String,
}

impl From<Document> for SnapshotDocument {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            url: doc.url,
            title: doc.title,
            tokens: doc.tokens,
            content: doc.content,
        }
    }
}

impl From<SnapshotDocument> for Document {
    fn from(entry: SnapshotDocument) -> Self {
        Self {
            id: entry.id,
            url: entry.url,
            title: entry.title,
            content: entry.content,
            tokens: entry.tokens,
            fetched_at: None,
        }
    }
}

/// Writes the corpus to `path`, documents ordered by ascending id.
///
/// The copy is taken under the index read lock before any I/O starts;
/// serialization and flushing happen lock-free. The bytes land in a temp
/// file beside the destination and are renamed into place, so a
/// concurrent or post-crash reader sees either the old snapshot or the
/// new one, never a truncated file.
pub fn write_snapshot(index: &InvertedIndex, path: &Path) -> Result<(), SnapshotError> {
    let documents = index.documents();
    let snapshot = Snapshot {
        documents: documents.into_iter().map(SnapshotDocument::from).collect(),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut staging = NamedTempFile::new_in(&parent)?;
    serde_json::to_writer_pretty(&mut staging, &snapshot)?;
    staging.write_all(b"\n")?;
    staging.flush()?;
    staging
        .persist(path)
        .map_err(|persist| SnapshotError::Io(persist.error))?;
    Ok(())
}

/// Reads documents back from a snapshot file. Callers hydrate the
/// indexes by feeding each document through the ingest path.
pub fn load_snapshot(path: &Path) -> Result<Vec<Document>, SnapshotError> {
    let raw = fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&raw)?;
    Ok(snapshot.documents.into_iter().map(Document::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_index() -> InvertedIndex {
        let index = InvertedIndex::new();
        index.add_document(Document::new(
            "beta",
            "https://example.com/b",
            "Beta",
            "circuit breakers protect services",
        ));
        index.add_document(Document::new(
            "alpha",
            "https://example.com/a",
            "Alpha",
            "vector search with embeddings",
        ));
        index
    }

    #[test]
    fn write_then_load_round_trips_the_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.snapshot.json");

        let index = seeded_index();
        write_snapshot(&index, &path).unwrap();
        let loaded = load_snapshot(&path).unwrap();

        let ids: Vec<&str> = loaded.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        // Tokens were cached at indexing time and survive the trip.
        assert_eq!(loaded[0].tokens, vec!["vector", "search", "with", "embeddings"]);

        // Re-ingesting reproduces the original statistics.
        let rebuilt = InvertedIndex::new();
        for doc in loaded {
            rebuilt.add_document(doc);
        }
        assert_eq!(rebuilt.document_count(), index.document_count());
        assert_eq!(
            rebuilt.average_document_length(),
            index.average_document_length()
        );
        assert_eq!(rebuilt.postings("vector"), index.postings("vector"));
    }

    #[test]
    fn writer_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/index.snapshot.json");
        write_snapshot(&seeded_index(), &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn output_is_stable_across_writes() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.json");
        let second = dir.path().join("two.json");

        let index = seeded_index();
        write_snapshot(&index, &first).unwrap();
        write_snapshot(&index, &second).unwrap();
        assert_eq!(
            fs::read_to_string(&first).unwrap(),
            fs::read_to_string(&second).unwrap()
        );
    }

    #[test]
    fn load_rejects_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"documents": [{"id": "a""#).unwrap();
        assert!(matches!(
            load_snapshot(&path),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn load_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(load_snapshot(&path), Err(SnapshotError::Io(_))));
    }
}
