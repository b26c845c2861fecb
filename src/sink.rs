//! Persistence of finished visualizations.
//!
//! A sink stores one [`VisualizationDocument`] and one [`StatusRecord`] per
//! [`GraphKey`]. Both are committed as a unit: a reader that observes a `done`
//! status can always read the matching document. Concurrent runs on
//! different keys never touch the same entries, runs on the same key race and
//! the last commit wins.

use std::collections::HashMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::document::{StatusRecord, VisualizationDocument};
use crate::error::{SinkError, UsageError};
use crate::ingest::GraphKey;

pub trait DocumentSink {
    /// Current status for `key`, if any.
    fn status(&self, key: &GraphKey) -> Result<Option<StatusRecord>, SinkError>;

    /// Stored document for `key`. Only documents announced by a `done` status
    /// are returned.
    fn load(&self, key: &GraphKey) -> Result<Option<VisualizationDocument>, SinkError>;

    /// Replaces the status for `status.key` without touching the document.
    /// Used for non-`done` states and to restore a previous status.
    fn set_status(&mut self, status: &StatusRecord) -> Result<(), SinkError>;

    /// Drops the status for `key`, leaving any stored document unannounced.
    fn remove_status(&mut self, key: &GraphKey) -> Result<(), SinkError>;

    /// Stores the document and its status as one logical write. The previous
    /// status is withdrawn first, so a failed commit never leaves a `done`
    /// marker pointing at a different document.
    fn commit(
        &mut self,
        document: &VisualizationDocument,
        status: &StatusRecord,
    ) -> Result<(), SinkError>;

    /// Forgets everything stored under `key`, status first.
    fn clear(&mut self, key: &GraphKey) -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
struct Entry {
    status: Option<StatusRecord>,
    document: Option<VisualizationDocument>,
}

/// Keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: HashMap<GraphKey, Entry>,
    commits: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits so far.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl DocumentSink for MemorySink {
    fn status(&self, key: &GraphKey) -> Result<Option<StatusRecord>, SinkError> {
        Ok(self.entries.get(key).and_then(|e| e.status.clone()))
    }

    fn load(&self, key: &GraphKey) -> Result<Option<VisualizationDocument>, SinkError> {
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.status.as_ref().is_some_and(StatusRecord::is_done))
            .and_then(|e| e.document.clone()))
    }

    fn set_status(&mut self, status: &StatusRecord) -> Result<(), SinkError> {
        self.entries.entry(status.key.clone()).or_default().status = Some(status.clone());
        Ok(())
    }

    fn remove_status(&mut self, key: &GraphKey) -> Result<(), SinkError> {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.status = None;
        }
        Ok(())
    }

    fn commit(
        &mut self,
        document: &VisualizationDocument,
        status: &StatusRecord,
    ) -> Result<(), SinkError> {
        self.entries.insert(
            document.key.clone(),
            Entry {
                status: Some(status.clone()),
                document: Some(document.clone()),
            },
        );
        self.commits += 1;
        Ok(())
    }

    fn clear(&mut self, key: &GraphKey) -> Result<(), SinkError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Stores JSON files under a per-schema directory:
///
/// ```text
/// <root>/vis/<stem>.json
/// <root>/status/<stem>.json
/// ```
///
/// Files are written to a hidden sibling and renamed into place. The document
/// is renamed before the `done` status is written, so that status only ever
/// exists next to a complete document.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: Utf8PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Sink for one schema inside a shared store directory. Stored keys don't
    /// carry the schema, so only names that map to a directory unchanged are
    /// accepted; anything else could alias another schema's directory.
    pub fn for_schema(store: impl AsRef<Utf8Path>, schema: &str) -> Result<Self, UsageError> {
        if schema.is_empty() || sanitize(schema) != schema {
            return Err(UsageError::SchemaName(schema.to_string()));
        }
        Ok(Self::new(store.as_ref().join(schema)))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn document_path(&self, key: &GraphKey) -> Utf8PathBuf {
        self.root.join("vis").join(format!("{}.json", stem(key)))
    }

    fn status_path(&self, key: &GraphKey) -> Utf8PathBuf {
        self.root.join("status").join(format!("{}.json", stem(key)))
    }
}

impl DocumentSink for DirectorySink {
    fn status(&self, key: &GraphKey) -> Result<Option<StatusRecord>, SinkError> {
        let status: Option<StatusRecord> = read_json(&self.status_path(key))?;
        Ok(status.filter(|s| &s.key == key))
    }

    fn load(&self, key: &GraphKey) -> Result<Option<VisualizationDocument>, SinkError> {
        if !self.status(key)?.is_some_and(|s| s.is_done()) {
            return Ok(None);
        }

        let document: Option<VisualizationDocument> = read_json(&self.document_path(key))?;
        Ok(document.filter(|d| &d.key == key))
    }

    fn set_status(&mut self, status: &StatusRecord) -> Result<(), SinkError> {
        write_json(&self.status_path(&status.key), status)
    }

    fn remove_status(&mut self, key: &GraphKey) -> Result<(), SinkError> {
        remove_file(&self.status_path(key))
    }

    fn commit(
        &mut self,
        document: &VisualizationDocument,
        status: &StatusRecord,
    ) -> Result<(), SinkError> {
        remove_file(&self.status_path(&status.key))?;
        write_json(&self.document_path(&document.key), document)?;
        write_json(&self.status_path(&status.key), status)?;

        tracing::info!(path = %self.document_path(&document.key), "committed visualization");
        Ok(())
    }

    fn clear(&mut self, key: &GraphKey) -> Result<(), SinkError> {
        remove_file(&self.status_path(key))?;
        remove_file(&self.document_path(key))?;
        Ok(())
    }
}

fn stem(key: &GraphKey) -> String {
    sanitize(&format!(
        "{}_{}_{}_{}_{}",
        key.graph_name, key.community_attr, key.centrality_attr, key.max_rank, key.show_interaction
    ))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '-',
        })
        .collect()
}

fn io_error(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_owned(),
        source,
    }
}

fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, SinkError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path)(err)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| SinkError::Decode {
            path: path.to_owned(),
            source,
        })
}

fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), SinkError> {
    let data = serde_json::to_vec(value).map_err(SinkError::Encode)?;

    let dir = path.parent().unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let name = path.file_name().unwrap_or("document.json");
    let tmp = dir.join(format!(".{name}.tmp"));

    let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
    file.write_all(&data).map_err(io_error(&tmp))?;
    file.sync_all().map_err(io_error(&tmp))?;
    drop(file);

    fs::rename(&tmp, path).map_err(io_error(path))
}

fn remove_file(path: &Utf8Path) -> Result<(), SinkError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_error(path)(err)),
    }
}
