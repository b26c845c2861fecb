//! Edge ingestion.
//!
//! The data provider is an external collaborator: it turns a [`LinksQuery`]
//! into a lazy, finite and non-restartable stream of [`EdgeRow`]s. Rows are
//! kept loosely typed here, they are only validated once they reach the graph
//! builder, so that a bad rank surfaces as a data integrity error rather than
//! as a provider failure.

use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, UsageError};
use crate::query::{GraphKind, LinksQuery};

/// Identifier of a graph participant, e.g. a user handle or a hashtag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

/// Label grouping nodes into a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(pub String);

impl Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommunityId {
    fn from(value: &str) -> Self {
        CommunityId(value.to_string())
    }
}

/// A loosely typed column value. Relational exports are not consistent about
/// whether ranks and community labels come out as numbers or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Integer reading of the value, `None` if it has a fractional part or
    /// isn't numeric at all.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Scalar::Float(_) => None,
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Textual reading used for community labels. Integral floats are printed
    /// without the trailing `.0` so that `3` and `3.0` name the same community.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) if f.is_finite() && f.fract() == 0.0 => Some((*f as i64).to_string()),
            Scalar::Float(_) => None,
            Scalar::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

/// One qualifying directed link, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeRow {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub source_community: Option<Scalar>,
    #[serde(default)]
    pub target_community: Option<Scalar>,
    #[serde(default)]
    pub source_rank: Option<Scalar>,
    #[serde(default)]
    pub target_rank: Option<Scalar>,
    #[serde(default)]
    pub weight: Option<Scalar>,
}

impl EdgeRow {
    /// Shorthand for a fully populated row.
    pub fn new(
        (source, target): (&str, &str),
        (source_community, target_community): (impl Into<Scalar>, impl Into<Scalar>),
        (source_rank, target_rank): (impl Into<Scalar>, impl Into<Scalar>),
        weight: impl Into<Scalar>,
    ) -> Self {
        Self {
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            source_community: Some(source_community.into()),
            target_community: Some(target_community.into()),
            source_rank: Some(source_rank.into()),
            target_rank: Some(target_rank.into()),
            weight: Some(weight.into()),
        }
    }
}

/// Composite key under which a finished visualization is stored and polled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphKey {
    pub graph_name: String,
    pub community_attr: String,
    pub centrality_attr: String,
    pub max_rank: u32,
    pub show_interaction: bool,
}

/// A single graph generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    pub schema: String,
    pub graph_name: String,
    pub community_attr: String,
    pub centrality_attr: String,
    pub max_rank: u32,
    pub show_interaction: bool,
}

impl GraphRequest {
    pub fn new(
        schema: impl Into<String>,
        graph_name: impl Into<String>,
        community_attr: impl Into<String>,
        centrality_attr: impl Into<String>,
        max_rank: u32,
        show_interaction: bool,
    ) -> Result<Self, UsageError> {
        let request = Self {
            schema: schema.into(),
            graph_name: graph_name.into(),
            community_attr: community_attr.into(),
            centrality_attr: centrality_attr.into(),
            max_rank,
            show_interaction,
        };

        for (name, value) in [
            ("schema", &request.schema),
            ("graph_name", &request.graph_name),
            ("community", &request.community_attr),
            ("centrality", &request.centrality_attr),
        ] {
            if value.trim().is_empty() {
                return Err(UsageError::Empty(name));
            }
        }

        if request.max_rank == 0 {
            return Err(UsageError::MaxRank);
        }

        Ok(request)
    }

    pub fn kind(&self) -> GraphKind {
        GraphKind::from_graph_name(&self.graph_name)
    }

    pub fn key(&self) -> GraphKey {
        GraphKey {
            graph_name: self.graph_name.clone(),
            community_attr: self.community_attr.clone(),
            centrality_attr: self.centrality_attr.clone(),
            max_rank: self.max_rank,
            show_interaction: self.show_interaction,
        }
    }
}

/// Lazy stream of edge rows.
pub type EdgeRows<'a> = Box<dyn Iterator<Item = Result<EdgeRow, ProviderError>> + 'a>;

/// The data provider. Implementations must apply the query's rank and
/// community filter; the graph builder trusts that every row it receives
/// qualifies.
pub trait EdgeSource {
    /// Opens the row stream. A source can be drained once, asking again
    /// returns [`ProviderError::Exhausted`].
    fn edges<'a>(&'a mut self, query: &LinksQuery) -> Result<EdgeRows<'a>, ProviderError>;
}

/// Reads one JSON object per line, e.g. the output of `COPY (...) TO STDOUT`
/// piped through `row_to_json`. Blank lines are skipped.
pub struct JsonLinesSource<R> {
    reader: Option<R>,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl JsonLinesSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, ProviderError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> EdgeSource for JsonLinesSource<R> {
    fn edges<'a>(&'a mut self, query: &LinksQuery) -> Result<EdgeRows<'a>, ProviderError> {
        let reader = self.reader.take().ok_or(ProviderError::Exhausted)?;
        let filter = query.filter;

        let rows = reader
            .lines()
            .enumerate()
            .filter_map(move |(i, line)| {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => return Some(Err(ProviderError::Io(err))),
                };

                if line.trim().is_empty() {
                    return None;
                }

                match serde_json::from_str::<EdgeRow>(&line) {
                    Ok(row) => filter.admits(&row).then_some(Ok(row)),
                    Err(source) => Some(Err(ProviderError::Malformed { line: i + 1, source })),
                }
            });

        Ok(Box::new(rows))
    }
}

/// In-memory provider, mostly useful for tests and for embedding the pipeline
/// behind an already materialized result set.
#[derive(Debug, Default)]
pub struct MemorySource {
    rows: Option<Vec<EdgeRow>>,
}

impl MemorySource {
    pub fn new(rows: impl IntoIterator<Item = EdgeRow>) -> Self {
        Self {
            rows: Some(rows.into_iter().collect()),
        }
    }
}

impl EdgeSource for MemorySource {
    fn edges<'a>(&'a mut self, query: &LinksQuery) -> Result<EdgeRows<'a>, ProviderError> {
        let rows = self.rows.take().ok_or(ProviderError::Exhausted)?;
        let filter = query.filter;

        Ok(Box::new(
            rows.into_iter()
                .filter(move |row| filter.admits(row))
                .map(Ok),
        ))
    }
}
