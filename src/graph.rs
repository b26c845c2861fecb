//! The graph builder.
//!
//! Folds validated edge records into a single node per id and one edge per
//! record. Node attributes follow a **first-seen-wins** policy: the record that
//! introduces a node fixes its rank, size and community, and later records
//! that disagree are counted and logged but never applied. A node may show up
//! as a low-rank target long before it shows up as a high-rank source, so the
//! result depends on provider order only through which record comes first.

use std::collections::{HashMap, HashSet};

use petgraph::Graph;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::color::{Color, ColorAssignment};
use crate::error::{DataIntegrityError, VisError};
use crate::ingest::{CommunityId, EdgeRow, NodeId, Scalar};

/// Position within a community under the centrality metric, 1 is the most
/// central node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(u32);

impl Rank {
    pub fn new(rank: u32) -> Option<Self> {
        (rank >= 1).then_some(Rank(rank))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Display scaling from rank to node size. Ranks up to `cutoff` map linearly
/// to `largest - rank * step`, anything past it gets `floor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeScale {
    pub largest: u32,
    pub step: u32,
    pub cutoff: u32,
    pub floor: u32,
}

impl Default for SizeScale {
    fn default() -> Self {
        Self {
            largest: 65,
            step: 5,
            cutoff: 10,
            floor: 5,
        }
    }
}

impl SizeScale {
    pub fn size(&self, rank: Rank) -> u32 {
        if rank.get() > self.cutoff {
            self.floor
        } else {
            self.largest
                .saturating_sub(rank.get().saturating_mul(self.step))
        }
    }
}

/// An [`EdgeRow`] that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub source: NodeId,
    pub target: NodeId,
    pub source_community: CommunityId,
    pub target_community: CommunityId,
    pub source_rank: Rank,
    pub target_rank: Rank,
    pub weight: f64,
}

impl EdgeRecord {
    /// Validates a raw row. `record` is the 1-based ordinal used in errors.
    pub fn from_row(record: usize, row: EdgeRow) -> Result<Self, DataIntegrityError> {
        let missing = |field: &'static str| DataIntegrityError::MissingField { record, field };

        let node = |id: Option<String>, field| match id {
            Some(id) if !id.is_empty() => Ok(NodeId(id)),
            _ => Err(missing(field)),
        };

        let community = |value: Option<Scalar>, field| -> Result<CommunityId, DataIntegrityError> {
            let value = value.ok_or_else(|| missing(field))?;
            value
                .as_label()
                .map(CommunityId)
                .ok_or_else(|| DataIntegrityError::InvalidCommunity {
                    record,
                    field,
                    value: value.to_string(),
                })
        };

        let rank = |value: Option<Scalar>, field| -> Result<Rank, DataIntegrityError> {
            let value = value.ok_or_else(|| missing(field))?;
            value
                .as_integer()
                .and_then(|rank| u32::try_from(rank).ok())
                .and_then(Rank::new)
                .ok_or_else(|| DataIntegrityError::InvalidRank {
                    record,
                    field,
                    value: value.to_string(),
                })
        };

        let weight = row.weight.ok_or_else(|| missing("weight"))?;
        let weight = weight
            .as_number()
            .filter(|w| w.is_finite())
            .ok_or_else(|| DataIntegrityError::InvalidWeight {
                record,
                value: weight.to_string(),
            })?;

        Ok(Self {
            source: node(row.source, "source")?,
            target: node(row.target, "target")?,
            source_community: community(row.source_community, "source_community")?,
            target_community: community(row.target_community, "target_community")?,
            source_rank: rank(row.source_rank, "source_rank")?,
            target_rank: rank(row.target_rank, "target_rank")?,
            weight,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub size: u32,
    pub community: CommunityId,
    pub rank: Rank,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub weight: f64,
    /// Color of the source node's community.
    pub color: Color,
}

/// The built graph. Nodes keep their insertion order, which is the order the
/// provider first mentioned them in, and parallel edges are kept apart.
#[derive(Debug, Default)]
pub struct VisGraph {
    pub(crate) graph: Graph<Node, Edge>,
    index: HashMap<NodeId, NodeIndex>,
}

impl VisGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.index_of(id).map(|i| &self.graph[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.graph
            .node_indices()
            .map(move |i| (i, &self.graph[i]))
    }

    /// Edges in record order as `(source, target, edge)`.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &Edge)> {
        self.graph.edge_references().map(move |e| {
            (
                &self.graph[e.source()].id,
                &self.graph[e.target()].id,
                e.weight(),
            )
        })
    }

    /// Neighbor lists regardless of edge direction, indexed by node index.
    /// Each list is ordered by the first edge that links the two nodes and
    /// holds no duplicates.
    pub fn adjacency(&self) -> Vec<Vec<NodeIndex>> {
        let mut lists = vec![Vec::new(); self.graph.node_count()];
        let mut seen = HashSet::new();

        for edge in self.graph.edge_references() {
            let (a, b) = (edge.source(), edge.target());
            if seen.insert((a, b)) {
                lists[a.index()].push(b);
            }
            if a != b && seen.insert((b, a)) {
                lists[b.index()].push(a);
            }
        }

        lists
    }

    fn insert(&mut self, node: Node) -> NodeIndex {
        let id = node.id.clone();
        let i = self.graph.add_node(node);
        self.index.insert(id, i);
        i
    }

    fn link(&mut self, a: NodeIndex, b: NodeIndex, edge: Edge) -> EdgeIndex {
        self.graph.add_edge(a, b, edge)
    }
}

/// Incremental builder, owns the run's [`ColorAssignment`] until it is
/// handed back by [`GraphBuilder::finish`].
pub struct GraphBuilder {
    scale: SizeScale,
    colors: ColorAssignment,
    graph: VisGraph,
    records: usize,
    conflicts: usize,
}

impl GraphBuilder {
    pub fn new(scale: SizeScale, colors: ColorAssignment) -> Self {
        Self {
            scale,
            colors,
            graph: VisGraph::default(),
            records: 0,
            conflicts: 0,
        }
    }

    /// Validates the next row and folds it into the graph.
    pub fn push(&mut self, row: EdgeRow) -> Result<(), DataIntegrityError> {
        self.records += 1;
        let record = EdgeRecord::from_row(self.records, row)?;
        self.add(record);
        Ok(())
    }

    pub fn add(&mut self, record: EdgeRecord) {
        let EdgeRecord {
            source,
            target,
            source_community,
            target_community,
            source_rank,
            target_rank,
            weight,
        } = record;

        let edge_color = self.colors.resolve(&source_community);
        let a = self.node(source, source_community, source_rank);
        let b = self.node(target, target_community, target_rank);

        self.graph.link(
            a,
            b,
            Edge {
                weight,
                color: edge_color,
            },
        );
    }

    pub fn finish(self) -> (VisGraph, ColorAssignment) {
        tracing::info!(
            records = self.records,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            communities = self.colors.len(),
            conflicts = self.conflicts,
            "built graph"
        );

        (self.graph, self.colors)
    }

    fn node(&mut self, id: NodeId, community: CommunityId, rank: Rank) -> NodeIndex {
        if let Some(index) = self.graph.index_of(&id) {
            let existing = &self.graph.graph[index];
            if existing.rank != rank || existing.community != community {
                tracing::debug!(
                    node = %existing.id,
                    kept_rank = existing.rank.get(),
                    kept_community = %existing.community,
                    ignored_rank = rank.get(),
                    ignored_community = %community,
                    "conflicting node attributes, keeping the first seen"
                );
                self.conflicts += 1;
            }
            return index;
        }

        // Only nodes that are actually created claim a community color.
        self.graph.insert(Node {
            size: self.scale.size(rank),
            color: self.colors.resolve(&community),
            id,
            community,
            rank,
        })
    }
}

/// Drains a row stream into a graph. Stops at the first provider or
/// validation error.
pub fn build<I>(
    rows: I,
    scale: SizeScale,
    colors: ColorAssignment,
) -> Result<(VisGraph, ColorAssignment), VisError>
where
    I: IntoIterator<Item = Result<EdgeRow, crate::error::ProviderError>>,
{
    let mut builder = GraphBuilder::new(scale, colors);
    for row in rows {
        builder.push(row?)?;
    }
    Ok(builder.finish())
}
