#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod color;
pub mod document;
mod error;
pub mod graph;
pub mod ingest;
pub mod layout;
pub mod pipeline;
pub mod query;
pub mod sink;
mod utils;

pub use crate::color::{Color, ColorAssignment};
pub use crate::document::{JobStatus, StatusRecord, VisualizationDocument};
pub use crate::error::*;
pub use crate::graph::{SizeScale, VisGraph};
pub use crate::ingest::{
    CommunityId, EdgeRow, EdgeSource, GraphKey, GraphRequest, JsonLinesSource, MemorySource,
    NodeId,
};
pub use crate::layout::LayoutConfig;
pub use crate::pipeline::{Outcome, Pipeline};
pub use crate::query::GraphKind;
pub use crate::sink::{DirectorySink, DocumentSink, MemorySink};
pub use crate::utils::as_overhead;
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;

/// Seed used for colors and layout when none is given.
pub const DEFAULT_SEED: u64 = 1;
