use camino::Utf8PathBuf;
use thiserror::Error;

/// Top level error returned by a pipeline run. Every variant is fatal, nothing
/// is retried and nothing is committed to the sink once one is raised.
#[derive(Debug, Error)]
pub enum VisError {
    #[error("Invalid request:\n{0}")]
    Usage(#[from] UsageError),

    #[error("Error while reading edges from the provider:\n{0}")]
    Provider(#[from] ProviderError),

    #[error("Edge data failed validation:\n{0}")]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("Error while writing to the sink:\n{0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("'{0}' must not be empty")]
    Empty(&'static str),

    #[error("max_rank must be a positive integer")]
    MaxRank,

    #[error("schema '{0}' can't be used as a directory name, use only [A-Za-z0-9_-]")]
    SchemaName(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Couldn't read edge rows.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed edge row on line {line}.\n{source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Edge source was already consumed")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum DataIntegrityError {
    #[error("Record {record}: missing field '{field}'")]
    MissingField { record: usize, field: &'static str },

    #[error("Record {record}: '{field}' must be a positive integer, got {value}")]
    InvalidRank {
        record: usize,
        field: &'static str,
        value: String,
    },

    #[error("Record {record}: '{field}' is not a usable community label, got {value}")]
    InvalidCommunity {
        record: usize,
        field: &'static str,
        value: String,
    },

    #[error("Record {record}: 'weight' must be a finite number, got {value}")]
    InvalidWeight { record: usize, value: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Couldn't access '{path}'.\n{source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't encode document.\n{0}")]
    Encode(#[source] serde_json::Error),

    #[error("Couldn't decode '{path}'.\n{source}")]
    Decode {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
